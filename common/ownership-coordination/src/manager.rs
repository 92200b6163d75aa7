use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Checkpoint, PartitionOwnership};

/// Store contract for partition ownership and checkpoints.
///
/// The store is the sole source of truth for who owns what; all consistency
/// rests on its compare-and-set eTag discipline. Implementations back this
/// with whatever durable medium they like; the crate ships
/// [`InMemoryPartitionManager`](crate::InMemoryPartitionManager) for tests
/// and quickstarts.
#[async_trait]
pub trait PartitionManager: Send + Sync {
    /// List every ownership record ever written for the pair. May be empty.
    async fn list_ownership(
        &self,
        event_hub_name: &str,
        consumer_group_name: &str,
    ) -> Result<Vec<PartitionOwnership>>;

    /// Attempt a batch of conditional claims and return the committed
    /// subset.
    ///
    /// An element is accepted only if its eTag matches the stored record,
    /// or the record does not exist and the request carries no eTag.
    /// Acceptance atomically stamps `last_modified_time_ms` and a fresh
    /// eTag; elements that lose the race are dropped from the result
    /// rather than reported as errors.
    async fn claim_ownership(
        &self,
        requests: Vec<PartitionOwnership>,
    ) -> Result<Vec<PartitionOwnership>>;

    /// Persist a checkpoint and return the new eTag.
    ///
    /// A checkpoint carrying an eTag is conditional and fails with
    /// [`Error::Conflict`](crate::Error::Conflict) when stale; a checkpoint
    /// without one writes unconditionally.
    async fn update_checkpoint(&self, checkpoint: Checkpoint) -> Result<String>;
}
