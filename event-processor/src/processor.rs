use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use ownership_coordination::{util, PartitionLoadBalancer, PartitionManager, PartitionOwnership};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::broker::BrokerSession;
use crate::checkpoint::CheckpointManager;
use crate::config::EventProcessorOptions;
use crate::context::PartitionContext;
use crate::event::StartPosition;
use crate::handler::{CloseReason, PartitionProcessorFactory};
use crate::metrics_const::{CLAIMS_ATTEMPTED_COUNTER, CLAIMS_FAILED_COUNTER};
use crate::pump::OWNER_LEVEL;
use crate::pump_manager::PumpManager;

/// One processor instance in the fleet.
///
/// Runs a background control loop that, once per tick, reads the full
/// ownership snapshot, asks the load balancer for at most one partition to
/// claim, writes the claim back with the previous record's eTag (so the
/// store detects lost races), and on success starts a pump for the
/// partition. A fault anywhere in a tick is logged and retried next tick;
/// nothing a store, broker, or user handler does can take the loop down.
pub struct EventProcessor {
    inner: Arc<Inner>,
    state: Mutex<Option<RunState>>,
}

struct Inner {
    id: String,
    event_hub_name: String,
    consumer_group_name: String,
    session: Arc<dyn BrokerSession>,
    factory: Arc<dyn PartitionProcessorFactory>,
    partition_manager: Arc<dyn PartitionManager>,
    options: EventProcessorOptions,
    pump_manager: PumpManager,
    load_balancer: PartitionLoadBalancer,
}

struct RunState {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl EventProcessor {
    pub fn new(
        event_hub_name: impl Into<String>,
        consumer_group_name: impl Into<String>,
        session: Arc<dyn BrokerSession>,
        factory: Arc<dyn PartitionProcessorFactory>,
        partition_manager: Arc<dyn PartitionManager>,
        options: EventProcessorOptions,
    ) -> Self {
        let id = Uuid::new_v4().to_string();
        let pump_manager = PumpManager::new(options.max_batch_size, options.max_wait);
        let load_balancer = PartitionLoadBalancer::new(id.clone(), options.inactive_time_limit);
        Self {
            inner: Arc::new(Inner {
                id,
                event_hub_name: event_hub_name.into(),
                consumer_group_name: consumer_group_name.into(),
                session,
                factory,
                partition_manager,
                options,
                pump_manager,
                load_balancer,
            }),
            state: Mutex::new(None),
        }
    }

    /// This instance's identity in the ownership store. Fresh on every
    /// construction.
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub async fn owned_partition_count(&self) -> usize {
        self.inner.pump_manager.pump_count().await
    }

    pub async fn owns_partition(&self, partition_id: &str) -> bool {
        self.inner.pump_manager.has_pump(partition_id).await
    }

    pub async fn is_running(&self) -> bool {
        self.state
            .lock()
            .await
            .as_ref()
            .map(|s| !s.handle.is_finished())
            .unwrap_or(false)
    }

    /// Launch the control loop. Calling `start` on a running processor is
    /// a no-op.
    pub async fn start(&self) {
        let mut state = self.state.lock().await;
        if let Some(existing) = state.as_ref() {
            if !existing.handle.is_finished() {
                info!(processor_id = %self.inner.id, "event processor already running");
                return;
            }
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_control_loop(Arc::clone(&self.inner), cancel.clone()));
        *state = Some(RunState { cancel, handle });
        info!(
            processor_id = %self.inner.id,
            event_hub_name = %self.inner.event_hub_name,
            consumer_group_name = %self.inner.consumer_group_name,
            "event processor started"
        );
    }

    /// Cancel the control loop, close every pump with `Shutdown`, and wait
    /// for the loop task. Calling `stop` on a stopped processor is a
    /// no-op; shutdown faults are logged, never rethrown.
    pub async fn stop(&self) {
        let Some(run_state) = self.state.lock().await.take() else {
            debug!(processor_id = %self.inner.id, "event processor is not running");
            return;
        };

        run_state.cancel.cancel();
        self.inner
            .pump_manager
            .remove_all_pumps(CloseReason::Shutdown)
            .await;
        if let Err(e) = run_state.handle.await {
            warn!(
                processor_id = %self.inner.id,
                error = %e,
                "control loop task panicked during stop"
            );
        }
        info!(processor_id = %self.inner.id, "event processor stopped");
    }
}

async fn run_control_loop(inner: Arc<Inner>, cancel: CancellationToken) {
    debug!(processor_id = %inner.id, "control loop running");
    loop {
        if cancel.is_cancelled() {
            break;
        }
        if let Err(e) = tick(&inner, &cancel).await {
            warn!(
                processor_id = %inner.id,
                error = %e,
                "control loop tick failed, retrying next tick"
            );
        }
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(inner.options.loop_interval) => {}
        }
    }
    debug!(processor_id = %inner.id, "control loop exited");
}

async fn tick(inner: &Inner, cancel: &CancellationToken) -> anyhow::Result<()> {
    let ownership = inner
        .partition_manager
        .list_ownership(&inner.event_hub_name, &inner.consumer_group_name)
        .await
        .context("listing ownership")?;
    let ownership_map: HashMap<String, PartitionOwnership> = ownership
        .into_iter()
        .map(|o| (o.partition_id.clone(), o))
        .collect();

    let partition_ids = inner
        .session
        .partition_ids()
        .await
        .context("fetching partition ids")?;
    if cancel.is_cancelled() {
        return Ok(());
    }
    if partition_ids.is_empty() {
        debug!(processor_id = %inner.id, "event hub reports no partitions");
        return Ok(());
    }

    match inner.load_balancer.load_balance(&ownership_map, &partition_ids) {
        Some(target) => claim_partition(inner, &ownership_map, target).await,
        None => debug!(processor_id = %inner.id, "holding fair share, nothing to claim"),
    }
    Ok(())
}

/// Attempt one claim and, on success, start the partition's pump. A lost
/// race or store fault is logged and dropped; the next tick re-evaluates.
async fn claim_partition(
    inner: &Inner,
    ownership_map: &HashMap<String, PartitionOwnership>,
    target: String,
) {
    metrics::counter!(CLAIMS_ATTEMPTED_COUNTER).increment(1);

    // Carry the previous record's position and eTag so a claim built from
    // a stale snapshot fails at the store instead of clobbering.
    let previous = ownership_map.get(&target);
    let request = PartitionOwnership {
        event_hub_name: inner.event_hub_name.clone(),
        consumer_group_name: inner.consumer_group_name.clone(),
        partition_id: target.clone(),
        owner_id: inner.id.clone(),
        owner_level: OWNER_LEVEL,
        offset: previous.and_then(|p| p.offset),
        sequence_number: previous.and_then(|p| p.sequence_number),
        last_modified_time_ms: util::now_millis(),
        etag: previous.and_then(|p| p.etag.clone()),
    };

    let claimed = match inner.partition_manager.claim_ownership(vec![request]).await {
        Ok(mut committed) if !committed.is_empty() => committed.remove(0),
        Ok(_) => {
            metrics::counter!(CLAIMS_FAILED_COUNTER).increment(1);
            info!(
                processor_id = %inner.id,
                partition_id = %target,
                "another processor won the claim"
            );
            return;
        }
        Err(e) => {
            metrics::counter!(CLAIMS_FAILED_COUNTER).increment(1);
            warn!(
                processor_id = %inner.id,
                partition_id = %target,
                error = %e,
                "claim failed at the store"
            );
            return;
        }
    };

    let start_position = claimed
        .sequence_number
        .map(StartPosition::FromSequenceNumber)
        .unwrap_or(inner.options.initial_event_position);

    let context = PartitionContext::new(
        &inner.event_hub_name,
        &inner.consumer_group_name,
        &target,
    );
    let checkpoint_manager = CheckpointManager::new(
        context.clone(),
        Arc::clone(&inner.partition_manager),
        inner.id.clone(),
    );
    let handler = inner.factory.create(context.clone(), checkpoint_manager);

    info!(
        processor_id = %inner.id,
        partition_id = %target,
        start_position = ?start_position,
        "claimed partition"
    );
    inner
        .pump_manager
        .create_pump(Arc::clone(&inner.session), context, start_position, handler)
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MockBrokerSession, RecordingFactory};
    use ownership_coordination::InMemoryPartitionManager;
    use std::time::Duration;

    fn test_options() -> EventProcessorOptions {
        EventProcessorOptions {
            max_batch_size: 10,
            max_wait: Duration::from_millis(5),
            loop_interval: Duration::from_millis(10),
            inactive_time_limit: Duration::from_millis(100),
            ..EventProcessorOptions::default()
        }
    }

    #[tokio::test]
    async fn start_and_stop_are_idempotent() {
        let processor = EventProcessor::new(
            "orders",
            "$default",
            MockBrokerSession::new(&[]),
            RecordingFactory::new(),
            Arc::new(InMemoryPartitionManager::new()),
            test_options(),
        );

        assert!(!processor.is_running().await);
        processor.start().await;
        processor.start().await;
        assert!(processor.is_running().await);

        processor.stop().await;
        processor.stop().await;
        assert!(!processor.is_running().await);
    }

    #[tokio::test]
    async fn fresh_instances_get_fresh_identities() {
        let session = MockBrokerSession::new(&[]);
        let store: Arc<InMemoryPartitionManager> = Arc::new(InMemoryPartitionManager::new());
        let a = EventProcessor::new(
            "orders",
            "$default",
            session.clone(),
            RecordingFactory::new(),
            store.clone(),
            test_options(),
        );
        let b = EventProcessor::new(
            "orders",
            "$default",
            session,
            RecordingFactory::new(),
            store,
            test_options(),
        );
        assert_ne!(a.id(), b.id());
    }
}
