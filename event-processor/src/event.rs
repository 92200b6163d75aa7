use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single event pulled from a partition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceivedEvent {
    pub body: Vec<u8>,
    pub offset: i64,
    pub sequence_number: i64,
    pub enqueued_time: DateTime<Utc>,
    /// Application-set properties.
    pub properties: HashMap<String, serde_json::Value>,
    /// Broker-set properties (partition key, enqueue metadata, ...).
    pub system_properties: HashMap<String, serde_json::Value>,
}

impl ReceivedEvent {
    pub fn new(
        body: Vec<u8>,
        offset: i64,
        sequence_number: i64,
        enqueued_time: DateTime<Utc>,
    ) -> Self {
        Self {
            body,
            offset,
            sequence_number,
            enqueued_time,
            properties: HashMap::new(),
            system_properties: HashMap::new(),
        }
    }
}

/// Where a newly opened partition reader starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartPosition {
    Earliest,
    Latest,
    FromOffset(i64),
    FromSequenceNumber(i64),
    FromEnqueuedTime(DateTime<Utc>),
}
