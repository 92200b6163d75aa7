//! Mock collaborators for unit and integration tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;

use crate::broker::{BrokerSession, PartitionReader};
use crate::error::BrokerError;
use crate::event::{ReceivedEvent, StartPosition};
use crate::handler::{CloseReason, PartitionProcessor, PartitionProcessorFactory};
use crate::{CheckpointManager, PartitionContext};

/// One scripted reader outcome.
pub enum ReaderStep {
    Batch(Vec<ReceivedEvent>),
    Error(BrokerError),
}

impl ReaderStep {
    /// A batch of events with the given sequence numbers (offset = 100 ×
    /// sequence number).
    pub fn batch(sequence_numbers: &[i64]) -> Self {
        ReaderStep::Batch(
            sequence_numbers
                .iter()
                .map(|&seq| ReceivedEvent::new(format!("event-{seq}").into_bytes(), seq * 100, seq, Utc::now()))
                .collect(),
        )
    }
}

/// Mock broker: fixed partition-id set, per-partition reader scripts, and a
/// record of every `StartPosition` a reader was opened with.
pub struct MockBrokerSession {
    partition_ids: Vec<String>,
    scripts: Mutex<HashMap<String, VecDeque<ReaderStep>>>,
    opened: Mutex<Vec<(String, StartPosition)>>,
    closed_flags: Mutex<HashMap<String, Arc<AtomicBool>>>,
}

impl MockBrokerSession {
    pub fn new(partition_ids: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            partition_ids: partition_ids.iter().map(|s| s.to_string()).collect(),
            scripts: Mutex::new(HashMap::new()),
            opened: Mutex::new(Vec::new()),
            closed_flags: Mutex::new(HashMap::new()),
        })
    }

    /// Script the outcomes of the next reader opened on the partition.
    /// After the script runs dry the reader waits out `max_wait` and
    /// returns empty batches.
    pub fn script_partition(&self, partition_id: &str, steps: Vec<ReaderStep>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(partition_id.to_string(), steps.into());
    }

    /// Every start position the partition's readers were opened with.
    pub fn opened_positions(&self, partition_id: &str) -> Vec<StartPosition> {
        self.opened
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == partition_id)
            .map(|(_, position)| *position)
            .collect()
    }

    /// Whether the most recently opened reader on the partition has been
    /// closed.
    pub fn reader_closed(&self, partition_id: &str) -> bool {
        self.closed_flags
            .lock()
            .unwrap()
            .get(partition_id)
            .map(|flag| flag.load(Ordering::SeqCst))
            .unwrap_or(false)
    }
}

#[async_trait]
impl BrokerSession for MockBrokerSession {
    async fn partition_ids(&self) -> Result<Vec<String>, BrokerError> {
        Ok(self.partition_ids.clone())
    }

    async fn open_reader(
        &self,
        _consumer_group_name: &str,
        partition_id: &str,
        start_position: StartPosition,
        _owner_level: i64,
    ) -> Result<Box<dyn PartitionReader>, BrokerError> {
        self.opened
            .lock()
            .unwrap()
            .push((partition_id.to_string(), start_position));
        let steps = self
            .scripts
            .lock()
            .unwrap()
            .remove(partition_id)
            .unwrap_or_default();
        let closed = Arc::new(AtomicBool::new(false));
        self.closed_flags
            .lock()
            .unwrap()
            .insert(partition_id.to_string(), Arc::clone(&closed));
        Ok(Box::new(ScriptedReader { steps, closed }))
    }
}

pub struct ScriptedReader {
    steps: VecDeque<ReaderStep>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl PartitionReader for ScriptedReader {
    async fn receive_batch(
        &mut self,
        _max_count: usize,
        max_wait: Duration,
    ) -> Result<Vec<ReceivedEvent>, BrokerError> {
        match self.steps.pop_front() {
            Some(ReaderStep::Batch(events)) => Ok(events),
            Some(ReaderStep::Error(err)) => Err(err),
            None => {
                tokio::time::sleep(max_wait).await;
                Ok(Vec::new())
            }
        }
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Everything a [`RecordingProcessor`] observed, for assertions.
#[derive(Default)]
pub struct RecordingState {
    pub initialized: AtomicBool,
    /// Whether `initialize` had completed when the first batch arrived.
    pub init_before_events: AtomicBool,
    pub batch_count: AtomicUsize,
    pub empty_batch_count: AtomicUsize,
    pub sequence_numbers: Mutex<Vec<i64>>,
    pub error_count: AtomicUsize,
    pub close_reasons: Mutex<Vec<CloseReason>>,
}

impl RecordingState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sequences(&self) -> Vec<i64> {
        self.sequence_numbers.lock().unwrap().clone()
    }

    pub fn close_reasons(&self) -> Vec<CloseReason> {
        self.close_reasons.lock().unwrap().clone()
    }
}

/// Handler that records every callback; optionally fails every
/// `process_events` call.
pub struct RecordingProcessor {
    state: Arc<RecordingState>,
    fail_process_events: bool,
}

impl RecordingProcessor {
    pub fn new(state: Arc<RecordingState>) -> Self {
        Self {
            state,
            fail_process_events: false,
        }
    }

    pub fn failing(state: Arc<RecordingState>) -> Self {
        Self {
            state,
            fail_process_events: true,
        }
    }
}

#[async_trait]
impl PartitionProcessor for RecordingProcessor {
    async fn initialize(&mut self) -> Result<()> {
        self.state.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn process_events(&mut self, events: Vec<ReceivedEvent>) -> Result<()> {
        if self.state.batch_count.load(Ordering::SeqCst) == 0 {
            self.state.init_before_events.store(
                self.state.initialized.load(Ordering::SeqCst),
                Ordering::SeqCst,
            );
        }
        self.state.batch_count.fetch_add(1, Ordering::SeqCst);
        if events.is_empty() {
            self.state.empty_batch_count.fetch_add(1, Ordering::SeqCst);
        }
        self.state
            .sequence_numbers
            .lock()
            .unwrap()
            .extend(events.iter().map(|e| e.sequence_number));
        if self.fail_process_events {
            anyhow::bail!("recording processor configured to fail");
        }
        Ok(())
    }

    async fn process_error(&mut self, _error: anyhow::Error) -> Result<()> {
        self.state.error_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&mut self, reason: CloseReason) -> Result<()> {
        self.state.close_reasons.lock().unwrap().push(reason);
        Ok(())
    }
}

/// Factory that hands out [`RecordingProcessor`]s and keeps every created
/// state around, newest last, keyed by partition id.
pub struct RecordingFactory {
    states: Mutex<HashMap<String, Vec<Arc<RecordingState>>>>,
    fail_process_events: bool,
}

impl RecordingFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            states: Mutex::new(HashMap::new()),
            fail_process_events: false,
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            states: Mutex::new(HashMap::new()),
            fail_process_events: true,
        })
    }

    /// The state of the most recently created handler for the partition.
    pub fn latest(&self, partition_id: &str) -> Option<Arc<RecordingState>> {
        self.states
            .lock()
            .unwrap()
            .get(partition_id)
            .and_then(|states| states.last().cloned())
    }

    pub fn created_count(&self, partition_id: &str) -> usize {
        self.states
            .lock()
            .unwrap()
            .get(partition_id)
            .map(|states| states.len())
            .unwrap_or(0)
    }

    pub fn partitions_seen(&self) -> Vec<String> {
        self.states.lock().unwrap().keys().cloned().collect()
    }
}

impl PartitionProcessorFactory for RecordingFactory {
    fn create(
        &self,
        context: PartitionContext,
        _checkpoint_manager: CheckpointManager,
    ) -> Box<dyn PartitionProcessor> {
        let state = RecordingState::new();
        self.states
            .lock()
            .unwrap()
            .entry(context.partition_id)
            .or_default()
            .push(Arc::clone(&state));
        if self.fail_process_events {
            Box::new(RecordingProcessor::failing(state))
        } else {
            Box::new(RecordingProcessor::new(state))
        }
    }
}

/// Poll a synchronous condition until it holds or the timeout elapses.
pub async fn wait_until(timeout: Duration, condition: impl Fn() -> bool) {
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met within {timeout:?}");
}
