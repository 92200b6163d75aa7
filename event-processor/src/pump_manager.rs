use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::broker::BrokerSession;
use crate::context::PartitionContext;
use crate::event::StartPosition;
use crate::handler::{CloseReason, PartitionProcessor};
use crate::metrics_const::{OWNED_PARTITIONS_GAUGE, PUMPS_STARTED_COUNTER};
use crate::pump::{PartitionPump, PumpRegistry, PumpSettings};

/// Supervisor for the live pumps of one processor.
///
/// Holds at most one pump per partition id. Create/remove go through one
/// async mutex, so the map is only ever mutated by one caller at a time;
/// a pump that dies on its own removes its own entry (guarded by a per-pump
/// id so a late removal cannot evict a replacement).
pub struct PumpManager {
    pumps: PumpRegistry,
    settings: PumpSettings,
}

impl PumpManager {
    pub fn new(max_batch_size: usize, max_wait: Duration) -> Self {
        Self {
            pumps: Arc::new(Mutex::new(HashMap::new())),
            settings: PumpSettings {
                max_batch_size,
                max_wait,
            },
        }
    }

    /// Start a pump for the partition. An existing pump for the same
    /// partition is stopped with `Shutdown` and fully closed before the
    /// replacement starts.
    pub async fn create_pump(
        &self,
        session: Arc<dyn BrokerSession>,
        context: PartitionContext,
        start_position: StartPosition,
        handler: Box<dyn PartitionProcessor>,
    ) {
        let partition_id = context.partition_id.clone();

        let previous = self.pumps.lock().await.remove(&partition_id);
        if let Some(previous) = previous {
            info!(partition_id = %partition_id, "stopping existing pump before replacement");
            previous.stop(CloseReason::Shutdown).await;
        }

        // Start and register under one lock: a pump that dies instantly
        // blocks on the registry for its self-removal until the entry it
        // must remove exists.
        let count = {
            let mut pumps = self.pumps.lock().await;
            let pump = PartitionPump::start(
                session,
                context,
                start_position,
                handler,
                self.settings,
                Arc::clone(&self.pumps),
            );
            pumps.insert(partition_id.clone(), pump);
            pumps.len()
        };
        metrics::counter!(PUMPS_STARTED_COUNTER).increment(1);
        metrics::gauge!(OWNED_PARTITIONS_GAUGE).set(count as f64);
        debug!(partition_id = %partition_id, pump_count = count, "partition pump created");
    }

    /// Stop and remove the partition's pump; a no-op when none exists.
    pub async fn remove_pump(&self, partition_id: &str, reason: CloseReason) {
        let pump = self.pumps.lock().await.remove(partition_id);
        let Some(pump) = pump else {
            debug!(partition_id = %partition_id, "no pump to remove");
            return;
        };
        pump.stop(reason).await;
        let count = self.pumps.lock().await.len();
        metrics::gauge!(OWNED_PARTITIONS_GAUGE).set(count as f64);
    }

    /// Stop every pump in parallel; returns once all are closed.
    pub async fn remove_all_pumps(&self, reason: CloseReason) {
        let drained: Vec<PartitionPump> = {
            let mut pumps = self.pumps.lock().await;
            pumps.drain().map(|(_, pump)| pump).collect()
        };
        if drained.is_empty() {
            return;
        }
        info!(
            pump_count = drained.len(),
            reason = reason.as_str(),
            "stopping all partition pumps"
        );

        let mut tasks = JoinSet::new();
        for pump in drained {
            tasks.spawn(async move { pump.stop(reason).await });
        }
        while tasks.join_next().await.is_some() {}
        metrics::gauge!(OWNED_PARTITIONS_GAUGE).set(0.0);
    }

    pub async fn pump_count(&self) -> usize {
        self.pumps.lock().await.len()
    }

    pub async fn has_pump(&self, partition_id: &str) -> bool {
        self.pumps.lock().await.contains_key(partition_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{wait_until, MockBrokerSession, RecordingProcessor, RecordingState};

    const WAIT: Duration = Duration::from_secs(5);

    fn manager() -> PumpManager {
        PumpManager::new(10, Duration::from_millis(5))
    }

    fn context(partition_id: &str) -> PartitionContext {
        PartitionContext::new("orders", "$default", partition_id)
    }

    #[tokio::test]
    async fn keeps_at_most_one_pump_per_partition() {
        let session = MockBrokerSession::new(&["0"]);
        let manager = manager();

        let first = RecordingState::new();
        manager
            .create_pump(
                session.clone(),
                context("0"),
                StartPosition::Earliest,
                Box::new(RecordingProcessor::new(first.clone())),
            )
            .await;

        let second = RecordingState::new();
        manager
            .create_pump(
                session.clone(),
                context("0"),
                StartPosition::Earliest,
                Box::new(RecordingProcessor::new(second.clone())),
            )
            .await;

        // The first pump was fully closed before the second started.
        assert_eq!(first.close_reasons(), vec![CloseReason::Shutdown]);
        assert_eq!(manager.pump_count().await, 1);

        manager.remove_all_pumps(CloseReason::Shutdown).await;
        assert_eq!(second.close_reasons(), vec![CloseReason::Shutdown]);
    }

    #[tokio::test]
    async fn remove_all_pumps_closes_everything() {
        let session = MockBrokerSession::new(&["0", "1", "2"]);
        let manager = manager();
        let mut states = Vec::new();

        for partition_id in ["0", "1", "2"] {
            let state = RecordingState::new();
            states.push(state.clone());
            manager
                .create_pump(
                    session.clone(),
                    context(partition_id),
                    StartPosition::Earliest,
                    Box::new(RecordingProcessor::new(state)),
                )
                .await;
        }
        assert_eq!(manager.pump_count().await, 3);

        manager.remove_all_pumps(CloseReason::Shutdown).await;
        assert_eq!(manager.pump_count().await, 0);
        for state in &states {
            assert_eq!(state.close_reasons(), vec![CloseReason::Shutdown]);
        }
    }

    #[tokio::test]
    async fn removing_an_absent_pump_is_a_noop() {
        let manager = manager();
        manager.remove_pump("9", CloseReason::Shutdown).await;
        assert_eq!(manager.pump_count().await, 0);
    }

    #[tokio::test]
    async fn dead_pump_removes_its_own_entry() {
        let session = MockBrokerSession::new(&["0"]);
        session.script_partition(
            "0",
            vec![crate::test_utils::ReaderStep::Error(
                crate::error::BrokerError::fatal("unauthorized"),
            )],
        );
        let manager = manager();
        let state = RecordingState::new();
        manager
            .create_pump(
                session,
                context("0"),
                StartPosition::Earliest,
                Box::new(RecordingProcessor::new(state.clone())),
            )
            .await;

        wait_until(WAIT, || !state.close_reasons().is_empty()).await;
        let pumps = Arc::clone(&manager.pumps);
        wait_until(WAIT, move || {
            pumps.try_lock().map(|p| p.is_empty()).unwrap_or(false)
        })
        .await;
        assert_eq!(state.close_reasons(), vec![CloseReason::EventHubException]);
    }
}
