use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use event_processor::test_utils::{MockBrokerSession, RecordingFactory};
use event_processor::{EventProcessor, EventProcessorOptions};
use ownership_coordination::InMemoryPartitionManager;

pub const WAIT_TIMEOUT: Duration = Duration::from_secs(10);
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Fast control loop, long ownership expiry: no lease churn during a test.
pub fn test_options() -> EventProcessorOptions {
    EventProcessorOptions {
        max_batch_size: 10,
        max_wait: Duration::from_millis(5),
        loop_interval: Duration::from_millis(10),
        inactive_time_limit: Duration::from_secs(60),
        ..EventProcessorOptions::default()
    }
}

/// Fast expiry for scenarios that exercise abandoned-ownership takeover.
pub fn short_expiry_options() -> EventProcessorOptions {
    EventProcessorOptions {
        inactive_time_limit: Duration::from_millis(100),
        ..test_options()
    }
}

pub fn processor(
    session: &Arc<MockBrokerSession>,
    factory: &Arc<RecordingFactory>,
    store: &Arc<InMemoryPartitionManager>,
    options: EventProcessorOptions,
) -> EventProcessor {
    EventProcessor::new(
        "orders",
        "$default",
        session.clone(),
        factory.clone(),
        store.clone(),
        options,
    )
}

pub async fn wait_for_condition<F, Fut>(timeout: Duration, interval: Duration, f: F)
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if f().await {
            return;
        }
        tokio::time::sleep(interval).await;
    }
    panic!("condition not met within {timeout:?}");
}
