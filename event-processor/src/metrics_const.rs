/// Counter for ownership claims attempted by the control loop
pub const CLAIMS_ATTEMPTED_COUNTER: &str = "event_processor_claims_attempted_total";

/// Counter for claims lost to another processor or failed at the store
pub const CLAIMS_FAILED_COUNTER: &str = "event_processor_claims_failed_total";

/// Counter for partition pumps started
pub const PUMPS_STARTED_COUNTER: &str = "event_processor_pumps_started_total";

/// Counter for partition pumps stopped, broken down by close reason
pub const PUMPS_STOPPED_COUNTER: &str = "event_processor_pumps_stopped_total";

/// Counter for batches dispatched to user handlers, including empty batches
pub const BATCHES_DISPATCHED_COUNTER: &str = "event_processor_batches_dispatched_total";

/// Counter for events dispatched to user handlers
pub const EVENTS_DISPATCHED_COUNTER: &str = "event_processor_events_dispatched_total";

/// Counter for checkpoints persisted through the checkpoint manager
pub const CHECKPOINTS_COUNTER: &str = "event_processor_checkpoints_total";

/// Counter for user handler failures, broken down by handler stage
pub const HANDLER_ERRORS_COUNTER: &str = "event_processor_handler_errors_total";

/// Gauge for the number of partitions this processor is currently pumping
pub const OWNED_PARTITIONS_GAUGE: &str = "event_processor_owned_partitions";
