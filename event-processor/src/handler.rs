use anyhow::Result;
use async_trait::async_trait;

use crate::checkpoint::CheckpointManager;
use crate::context::PartitionContext;
use crate::event::ReceivedEvent;

/// Why a partition pump was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The processor (or its supervisor) asked the pump to stop.
    Shutdown,
    /// The broker disconnected the reader; another processor took the
    /// partition.
    OwnershipLost,
    /// The reader hit a non-retryable broker error.
    EventHubException,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::Shutdown => "shutdown",
            CloseReason::OwnershipLost => "ownership_lost",
            CloseReason::EventHubException => "event_hub_exception",
        }
    }
}

/// User-supplied handler for one partition assignment.
///
/// The pump invokes the methods sequentially, never concurrently:
/// `initialize` completes before the first `process_events`, and `close`
/// runs exactly once after the last dispatch and after the broker reader
/// has been released. Errors returned from any method are swallowed by the
/// pump (logged; `process_events` errors are routed to `process_error`
/// first); a misbehaving handler never tears down the processor.
#[async_trait]
pub trait PartitionProcessor: Send {
    /// Called once before the first batch. Default: no-op.
    async fn initialize(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called for every received batch, including empty ones (an empty
    /// batch means `max_wait` elapsed, a hook for time-based work).
    async fn process_events(&mut self, events: Vec<ReceivedEvent>) -> Result<()>;

    /// Called with receive errors and with errors returned by
    /// `process_events`.
    async fn process_error(&mut self, error: anyhow::Error) -> Result<()>;

    /// Called once when the pump shuts down. Default: no-op.
    async fn close(&mut self, _reason: CloseReason) -> Result<()> {
        Ok(())
    }
}

/// Builds one [`PartitionProcessor`] per claimed partition.
///
/// Implemented for any `Fn(PartitionContext, CheckpointManager)` closure,
/// so the common case is just a closure returning a boxed handler.
pub trait PartitionProcessorFactory: Send + Sync {
    fn create(
        &self,
        context: PartitionContext,
        checkpoint_manager: CheckpointManager,
    ) -> Box<dyn PartitionProcessor>;
}

impl<F> PartitionProcessorFactory for F
where
    F: Fn(PartitionContext, CheckpointManager) -> Box<dyn PartitionProcessor> + Send + Sync,
{
    fn create(
        &self,
        context: PartitionContext,
        checkpoint_manager: CheckpointManager,
    ) -> Box<dyn PartitionProcessor> {
        self(context, checkpoint_manager)
    }
}
