/// Immutable identity of one partition assignment. Handed to user code by
/// value; cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionContext {
    pub event_hub_name: String,
    pub consumer_group_name: String,
    pub partition_id: String,
}

impl PartitionContext {
    pub fn new(
        event_hub_name: impl Into<String>,
        consumer_group_name: impl Into<String>,
        partition_id: impl Into<String>,
    ) -> Self {
        Self {
            event_hub_name: event_hub_name.into(),
            consumer_group_name: consumer_group_name.into(),
            partition_id: partition_id.into(),
        }
    }
}
