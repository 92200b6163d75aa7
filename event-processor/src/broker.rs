use std::time::Duration;

use async_trait::async_trait;

use crate::error::BrokerError;
use crate::event::{ReceivedEvent, StartPosition};

/// Connection to one event hub, capable of opening per-partition readers.
///
/// The transport behind this trait (connection management, auth, wire
/// protocol) is out of scope for the processor; it only ever holds a
/// reference.
#[async_trait]
pub trait BrokerSession: Send + Sync {
    async fn partition_ids(&self) -> Result<Vec<String>, BrokerError>;

    async fn open_reader(
        &self,
        consumer_group_name: &str,
        partition_id: &str,
        start_position: StartPosition,
        owner_level: i64,
    ) -> Result<Box<dyn PartitionReader>, BrokerError>;
}

/// A reader positioned on one partition.
///
/// `receive_batch` waits at most `max_wait` and may return an empty batch.
/// Cancellation of an in-flight receive is the pump's job (it races the
/// receive against its cancellation token), so readers only need the
/// bounded wait.
#[async_trait]
pub trait PartitionReader: Send {
    async fn receive_batch(
        &mut self,
        max_count: usize,
        max_wait: Duration,
    ) -> Result<Vec<ReceivedEvent>, BrokerError>;

    /// Release the reader. Must be called on every pump exit path.
    async fn close(&mut self);
}
