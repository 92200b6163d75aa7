//! Per-partition pump: a dedicated task that pulls event batches from one
//! broker reader and dispatches them to the user handler.
//!
//! Lifecycle: created → initializing (user `initialize`, errors swallowed)
//! → running (receive loop) → stopping (reader released, user `close`) →
//! closed. A pump leaves the running state when its supervisor calls
//! [`PartitionPump::stop`], or on its own when the reader reports a
//! non-retryable error or a lost ownership.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::broker::{BrokerSession, PartitionReader};
use crate::context::PartitionContext;
use crate::error::BrokerErrorKind;
use crate::event::StartPosition;
use crate::handler::{CloseReason, PartitionProcessor};
use crate::metrics_const::{
    BATCHES_DISPATCHED_COUNTER, EVENTS_DISPATCHED_COUNTER, HANDLER_ERRORS_COUNTER,
    OWNED_PARTITIONS_GAUGE, PUMPS_STOPPED_COUNTER,
};

/// This core never expresses exclusive-consumer priority.
pub(crate) const OWNER_LEVEL: i64 = 0;

/// Live pumps indexed by partition id; shared between the pump manager and
/// the pump tasks (each task removes its own entry when it dies on its
/// own).
pub(crate) type PumpRegistry = Arc<Mutex<HashMap<String, PartitionPump>>>;

#[derive(Clone, Copy)]
pub(crate) struct PumpSettings {
    pub max_batch_size: usize,
    pub max_wait: Duration,
}

pub struct PartitionPump {
    pub(crate) partition_id: String,
    pump_id: Uuid,
    cancel: CancellationToken,
    is_receiving: Arc<AtomicBool>,
    requested_reason: Arc<Mutex<Option<CloseReason>>>,
    handle: Option<JoinHandle<()>>,
}

impl PartitionPump {
    /// Spawn the pump task and return its handle object.
    pub(crate) fn start(
        session: Arc<dyn BrokerSession>,
        context: PartitionContext,
        start_position: StartPosition,
        handler: Box<dyn PartitionProcessor>,
        settings: PumpSettings,
        registry: PumpRegistry,
    ) -> Self {
        let partition_id = context.partition_id.clone();
        let pump_id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let is_receiving = Arc::new(AtomicBool::new(true));
        let requested_reason = Arc::new(Mutex::new(None));

        let handle = tokio::spawn({
            let partition_id = partition_id.clone();
            let cancel = cancel.clone();
            let is_receiving = Arc::clone(&is_receiving);
            let requested_reason = Arc::clone(&requested_reason);
            async move {
                let reason = run_pump(
                    session,
                    context,
                    start_position,
                    handler,
                    settings,
                    cancel,
                    is_receiving,
                    requested_reason,
                )
                .await;

                // Remove our own registry entry unless a replacement pump
                // has already taken the slot.
                let remaining = {
                    let mut pumps = registry.lock().await;
                    let ours = pumps
                        .get(&partition_id)
                        .map(|p| p.pump_id == pump_id)
                        .unwrap_or(false);
                    if ours {
                        pumps.remove(&partition_id);
                    }
                    pumps.len()
                };
                metrics::gauge!(OWNED_PARTITIONS_GAUGE).set(remaining as f64);
                metrics::counter!(PUMPS_STOPPED_COUNTER, "reason" => reason.as_str()).increment(1);
                info!(
                    partition_id = %partition_id,
                    reason = reason.as_str(),
                    "partition pump closed"
                );
            }
        });

        Self {
            partition_id,
            pump_id,
            cancel,
            is_receiving,
            requested_reason,
            handle: Some(handle),
        }
    }

    /// Stop the pump and wait until it is closed.
    ///
    /// Safe against a pump that already stopped itself: the requested
    /// reason only applies if the task has not picked an internal one, and
    /// awaiting a finished task returns immediately. The user `close`
    /// callback runs exactly once either way.
    pub(crate) async fn stop(mut self, reason: CloseReason) {
        {
            let mut requested = self.requested_reason.lock().await;
            if requested.is_none() {
                *requested = Some(reason);
            }
        }
        self.is_receiving.store(false, Ordering::SeqCst);
        self.cancel.cancel();

        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(
                    partition_id = %self.partition_id,
                    error = %e,
                    "partition pump task panicked during stop"
                );
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_pump(
    session: Arc<dyn BrokerSession>,
    context: PartitionContext,
    start_position: StartPosition,
    mut handler: Box<dyn PartitionProcessor>,
    settings: PumpSettings,
    cancel: CancellationToken,
    is_receiving: Arc<AtomicBool>,
    requested_reason: Arc<Mutex<Option<CloseReason>>>,
) -> CloseReason {
    let partition_id = context.partition_id.clone();
    debug!(partition_id = %partition_id, "partition pump initializing");

    if let Err(e) = handler.initialize().await {
        metrics::counter!(HANDLER_ERRORS_COUNTER, "stage" => "initialize").increment(1);
        warn!(
            partition_id = %partition_id,
            error = %e,
            "handler initialize failed, pump continues"
        );
    }

    let opened = tokio::select! {
        _ = cancel.cancelled() => None,
        result = session.open_reader(
            &context.consumer_group_name,
            &partition_id,
            start_position,
            OWNER_LEVEL,
        ) => Some(result),
    };

    let mut reader = match opened {
        None => {
            let reason = resolve_reason(&requested_reason, None).await;
            close_handler(&mut handler, &partition_id, reason).await;
            return reason;
        }
        Some(Ok(reader)) => reader,
        Some(Err(err)) => {
            warn!(partition_id = %partition_id, error = %err, "failed to open partition reader");
            forward_error(&mut handler, &partition_id, err.into()).await;
            let reason = CloseReason::EventHubException;
            close_handler(&mut handler, &partition_id, reason).await;
            return reason;
        }
    };

    info!(
        partition_id = %partition_id,
        start_position = ?start_position,
        "partition pump running"
    );

    let mut internal_reason = None;
    while is_receiving.load(Ordering::SeqCst) {
        let outcome = tokio::select! {
            _ = cancel.cancelled() => break,
            outcome = reader.receive_batch(settings.max_batch_size, settings.max_wait) => outcome,
        };

        // A stop that landed during the await: exit without dispatching.
        if !is_receiving.load(Ordering::SeqCst) {
            break;
        }

        match outcome {
            Ok(events) => {
                metrics::counter!(BATCHES_DISPATCHED_COUNTER).increment(1);
                if !events.is_empty() {
                    metrics::counter!(EVENTS_DISPATCHED_COUNTER).increment(events.len() as u64);
                }
                // Empty batches are dispatched too: max_wait elapsing is
                // the user's hook for time-based work.
                if let Err(err) = handler.process_events(events).await {
                    metrics::counter!(HANDLER_ERRORS_COUNTER, "stage" => "process_events")
                        .increment(1);
                    forward_error(&mut handler, &partition_id, err).await;
                }
            }
            Err(err) => {
                let kind = err.kind;
                warn!(partition_id = %partition_id, error = %err, "receive failed");
                forward_error(&mut handler, &partition_id, err.into()).await;
                match kind {
                    BrokerErrorKind::Transient => continue,
                    BrokerErrorKind::ReceiverDisconnected => {
                        internal_reason = Some(CloseReason::OwnershipLost);
                        break;
                    }
                    BrokerErrorKind::Fatal => {
                        internal_reason = Some(CloseReason::EventHubException);
                        break;
                    }
                }
            }
        }
    }

    // Release the reader on every exit path, then tell the handler why.
    reader.close().await;
    let reason = resolve_reason(&requested_reason, internal_reason).await;
    close_handler(&mut handler, &partition_id, reason).await;
    reason
}

async fn resolve_reason(
    requested: &Mutex<Option<CloseReason>>,
    internal: Option<CloseReason>,
) -> CloseReason {
    match internal {
        Some(reason) => reason,
        None => requested.lock().await.unwrap_or(CloseReason::Shutdown),
    }
}

async fn forward_error(
    handler: &mut Box<dyn PartitionProcessor>,
    partition_id: &str,
    error: anyhow::Error,
) {
    if let Err(nested) = handler.process_error(error).await {
        metrics::counter!(HANDLER_ERRORS_COUNTER, "stage" => "process_error").increment(1);
        warn!(
            partition_id = %partition_id,
            error = %nested,
            "process_error handler itself failed"
        );
    }
}

async fn close_handler(
    handler: &mut Box<dyn PartitionProcessor>,
    partition_id: &str,
    reason: CloseReason,
) {
    if let Err(e) = handler.close(reason).await {
        metrics::counter!(HANDLER_ERRORS_COUNTER, "stage" => "close").increment(1);
        warn!(
            partition_id = %partition_id,
            reason = reason.as_str(),
            error = %e,
            "handler close failed"
        );
    }
}
