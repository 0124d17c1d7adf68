//! Batch accumulator
//!
//! Collects homogeneous work items and hands them to a [`BatchProcessor`]
//! when either `batch_size` items are queued or `flush_interval` has elapsed
//! since the first item of the batch arrived, whichever happens first.
//!
//! Queueing and snapshot-and-clear share one mutex, so every item belongs to
//! exactly one flushed batch. The processor always runs outside that lock.

use async_trait::async_trait;
use cortex_core::{BatchConfig, CortexError, CortexResult};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::task::JoinHandle;
use uuid::Uuid;

// ============================================================================
// TYPES
// ============================================================================

/// What caused a batch to be flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FlushTrigger {
    Size,
    Time,
    Manual,
}

impl fmt::Display for FlushTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FlushTrigger::Size => "size",
            FlushTrigger::Time => "time",
            FlushTrigger::Manual => "manual",
        };
        f.write_str(name)
    }
}

/// A flushed batch, in queue order.
#[derive(Debug, Clone)]
pub struct Batch<T> {
    pub id: String,
    pub items: Vec<T>,
    pub trigger: FlushTrigger,
}

/// Where an item landed when it was queued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchTicket {
    pub batch_id: String,
    /// Zero-based position of the item within its batch.
    pub position: usize,
}

/// Result of one flush.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchFlush {
    pub batch_id: String,
    pub size: usize,
    pub trigger: FlushTrigger,
    /// Processor error, if the batch failed as a whole.
    pub error: Option<CortexError>,
}

impl BatchFlush {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Receives flushed batches.
///
/// An `Err` fails the whole batch. Failed batches are logged and counted;
/// they are neither retried nor re-queued.
#[async_trait]
pub trait BatchProcessor<T>: Send + Sync {
    async fn process(&self, batch: Batch<T>) -> CortexResult<()>;
}

/// Accumulator counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchStats {
    pub size_flushes: u64,
    pub time_flushes: u64,
    pub manual_flushes: u64,
    pub items_processed: u64,
    pub failed_batches: u64,
    pub pending: usize,
}

impl BatchStats {
    pub fn total_flushes(&self) -> u64 {
        self.size_flushes + self.time_flushes + self.manual_flushes
    }
}

// ============================================================================
// ACCUMULATOR
// ============================================================================

struct QueueState<T> {
    items: Vec<T>,
    timer: Option<JoinHandle<()>>,
    /// Bumped on every flush; a timer only fires for the generation it was armed in.
    generation: u64,
    batch_id: String,
}

#[derive(Default)]
struct Counters {
    size_flushes: AtomicU64,
    time_flushes: AtomicU64,
    manual_flushes: AtomicU64,
    items_processed: AtomicU64,
    failed_batches: AtomicU64,
}

struct Inner<T> {
    name: String,
    config: BatchConfig,
    processor: Arc<dyn BatchProcessor<T>>,
    state: Mutex<QueueState<T>>,
    counters: Counters,
}

/// Size- or time-triggered batch accumulator for one operation type.
///
/// Cloning is cheap and yields a handle to the same queue.
pub struct BatchAccumulator<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for BatchAccumulator<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for BatchAccumulator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchAccumulator")
            .field("name", &self.inner.name)
            .field("config", &self.inner.config)
            .field("pending", &self.inner.lock().items.len())
            .finish()
    }
}

fn new_batch_id() -> String {
    Uuid::now_v7().to_string()
}

impl<T: Send + 'static> BatchAccumulator<T> {
    /// Create an accumulator. A `batch_size` of zero is treated as one.
    pub fn new(
        name: impl Into<String>,
        config: BatchConfig,
        processor: Arc<dyn BatchProcessor<T>>,
    ) -> Self {
        let config = BatchConfig::new(config.batch_size.max(1), config.flush_interval);
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                config,
                processor,
                state: Mutex::new(QueueState {
                    items: Vec::new(),
                    timer: None,
                    generation: 0,
                    batch_id: new_batch_id(),
                }),
                counters: Counters::default(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn config(&self) -> BatchConfig {
        self.inner.config
    }

    /// Queue an item.
    ///
    /// When the item fills the batch, the batch is flushed and this call
    /// awaits its processing. Otherwise a flush timer is armed if none is
    /// pending.
    pub async fn add(&self, item: T) -> BatchTicket {
        let (ticket, ready) = {
            let mut state = self.inner.lock();
            state.items.push(item);
            let ticket = BatchTicket {
                batch_id: state.batch_id.clone(),
                position: state.items.len() - 1,
            };

            if state.items.len() >= self.inner.config.batch_size {
                (ticket, Some(take_batch(&mut state, FlushTrigger::Size)))
            } else {
                if state.timer.is_none() {
                    state.timer = Some(self.arm_timer(state.generation));
                }
                (ticket, None)
            }
        };

        if let Some(batch) = ready {
            self.inner.run(batch).await;
        }
        ticket
    }

    /// Flush whatever is queued now. Returns `None` if the queue was empty.
    pub async fn flush(&self) -> Option<BatchFlush> {
        let batch = {
            let mut state = self.inner.lock();
            if state.items.is_empty() {
                return None;
            }
            take_batch(&mut state, FlushTrigger::Manual)
        };
        Some(self.inner.run(batch).await)
    }

    /// Number of items waiting for the next flush.
    pub fn pending(&self) -> usize {
        self.inner.lock().items.len()
    }

    /// Id the next flushed batch will carry.
    pub fn current_batch_id(&self) -> String {
        self.inner.lock().batch_id.clone()
    }

    pub fn stats(&self) -> BatchStats {
        let c = &self.inner.counters;
        BatchStats {
            size_flushes: c.size_flushes.load(Ordering::Relaxed),
            time_flushes: c.time_flushes.load(Ordering::Relaxed),
            manual_flushes: c.manual_flushes.load(Ordering::Relaxed),
            items_processed: c.items_processed.load(Ordering::Relaxed),
            failed_batches: c.failed_batches.load(Ordering::Relaxed),
            pending: self.pending(),
        }
    }

    fn arm_timer(&self, generation: u64) -> JoinHandle<()> {
        let owner: Weak<Inner<T>> = Arc::downgrade(&self.inner);
        let interval = self.inner.config.flush_interval;
        tokio::spawn(async move {
            tokio::time::sleep(interval).await;
            let Some(inner) = owner.upgrade() else {
                return;
            };
            let batch = {
                let mut state = inner.lock();
                if state.generation != generation || state.items.is_empty() {
                    return;
                }
                take_batch(&mut state, FlushTrigger::Time)
            };
            inner.run(batch).await;
        })
    }
}

/// Snapshot and clear the queue, disarm the timer, and open a new batch.
fn take_batch<T>(state: &mut QueueState<T>, trigger: FlushTrigger) -> Batch<T> {
    if let Some(timer) = state.timer.take() {
        // A time-triggered flush runs on the timer task itself
        if trigger != FlushTrigger::Time {
            timer.abort();
        }
    }
    state.generation += 1;
    let id = std::mem::replace(&mut state.batch_id, new_batch_id());
    Batch {
        id,
        items: std::mem::take(&mut state.items),
        trigger,
    }
}

impl<T> Inner<T> {
    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn run(&self, batch: Batch<T>) -> BatchFlush {
        let batch_id = batch.id.clone();
        let size = batch.items.len();
        let trigger = batch.trigger;

        let counter = match trigger {
            FlushTrigger::Size => &self.counters.size_flushes,
            FlushTrigger::Time => &self.counters.time_flushes,
            FlushTrigger::Manual => &self.counters.manual_flushes,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            accumulator = %self.name,
            batch_id = %batch_id,
            size,
            trigger = %trigger,
            "Flushing batch"
        );

        let error = match self.processor.process(batch).await {
            Ok(()) => {
                self.counters
                    .items_processed
                    .fetch_add(size as u64, Ordering::Relaxed);
                None
            }
            Err(e) => {
                self.counters.failed_batches.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    accumulator = %self.name,
                    batch_id = %batch_id,
                    size,
                    error = %e,
                    "Batch processing failed"
                );
                Some(e)
            }
        };

        BatchFlush {
            batch_id,
            size,
            trigger,
            error,
        }
    }
}
