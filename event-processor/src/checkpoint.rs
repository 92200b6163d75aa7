use std::sync::Arc;

use ownership_coordination::{Checkpoint, PartitionManager, Result};
use tracing::debug;

use crate::context::PartitionContext;
use crate::metrics_const::CHECKPOINTS_COUNTER;

/// Gateway through which user code records progress for one partition.
///
/// Forwards a fully-populated [`Checkpoint`] to the store on every call:
/// no caching, no coalescing; the user decides the cadence. Store failures
/// propagate unchanged.
#[derive(Clone)]
pub struct CheckpointManager {
    context: PartitionContext,
    partition_manager: Arc<dyn PartitionManager>,
    owner_id: String,
}

impl CheckpointManager {
    pub fn new(
        context: PartitionContext,
        partition_manager: Arc<dyn PartitionManager>,
        owner_id: impl Into<String>,
    ) -> Self {
        Self {
            context,
            partition_manager,
            owner_id: owner_id.into(),
        }
    }

    pub fn partition_context(&self) -> &PartitionContext {
        &self.context
    }

    /// Persist the given position and return the store's new eTag.
    pub async fn update_checkpoint(&self, offset: i64, sequence_number: i64) -> Result<String> {
        let checkpoint = Checkpoint {
            event_hub_name: self.context.event_hub_name.clone(),
            consumer_group_name: self.context.consumer_group_name.clone(),
            owner_id: self.owner_id.clone(),
            partition_id: self.context.partition_id.clone(),
            offset,
            sequence_number,
            etag: None,
        };
        let etag = self.partition_manager.update_checkpoint(checkpoint).await?;
        metrics::counter!(CHECKPOINTS_COUNTER).increment(1);
        debug!(
            partition_id = %self.context.partition_id,
            offset,
            sequence_number,
            "checkpoint persisted"
        );
        Ok(etag)
    }
}
