use serde::{Deserialize, Serialize};

/// The durable record of a partition assignment attempt, keyed by
/// `(event_hub_name, consumer_group_name, partition_id)`.
///
/// Each processor that wins a claim writes this record with a fresh eTag;
/// a write carrying a stale eTag must fail without mutating the record.
/// Records are never deleted: a crashed processor is detected by the age
/// of `last_modified_time_ms` alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionOwnership {
    pub event_hub_name: String,
    pub consumer_group_name: String,
    pub partition_id: String,
    /// Stable id of the claiming processor instance.
    pub owner_id: String,
    /// Priority integer; this core always writes 0.
    pub owner_level: i64,
    /// Last checkpointed offset, carried forward across claims.
    pub offset: Option<i64>,
    /// Last checkpointed sequence number, carried forward across claims.
    pub sequence_number: Option<i64>,
    /// Epoch millis of the last successful write; bumped by the store.
    pub last_modified_time_ms: i64,
    /// Opaque version token; `None` on a first-claim request.
    pub etag: Option<String>,
}

/// A persisted progress marker for one partition in one consumer group.
///
/// Written only by the current owner of the partition; read on every claim
/// to choose the starting position. The store does not enforce ordering;
/// readers must tolerate stale positions by simply resuming from whatever
/// is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub event_hub_name: String,
    pub consumer_group_name: String,
    pub owner_id: String,
    pub partition_id: String,
    pub offset: i64,
    pub sequence_number: i64,
    /// Expected current eTag for a conditional write; `None` writes
    /// unconditionally (the owner trusts its own lease).
    pub etag: Option<String>,
}
