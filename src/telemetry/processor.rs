//! # Telemetry Processor
//!
//! Bounded worklist queue drained by one dedicated worker thread that runs
//! every registered stage in order.
//!
//! This module handles:
//! - Non-blocking publishing with drop counting on overflow
//! - Copy-on-write stage registration (readers never lock)
//! - Stage error and panic isolation
//! - Cooperative shutdown through a `watch` channel

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::context::TelemetryContext;
use super::event::TelemetryEvent;
use super::stage::TelemetryStage;

/// Default queue capacity
pub const DEFAULT_QUEUE_CAPACITY: usize = 20_000;

/// Largest accepted queue capacity
pub const MAX_QUEUE_CAPACITY: usize = 10_000_000;

/// A drop warning is logged on the first drop and then every this many drops
const DROP_WARN_EVERY: u64 = 1_000;

type StageList = Vec<Arc<dyn TelemetryStage>>;

/// Pipeline counters, updated lock-free from any task.
#[derive(Debug, Default)]
pub struct ProcessorStats {
    /// Events that went through every stage
    pub processed: AtomicU64,
    /// Events rejected because the queue was full or closed
    pub dropped: AtomicU64,
    /// Stage failures (errors and panics)
    pub errors: AtomicU64,
}

impl ProcessorStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`ProcessorStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub processed: u64,
    pub dropped: u64,
    pub errors: u64,
}

/// Cloneable handle for putting events on the processor queue.
#[derive(Debug, Clone)]
pub struct EventPublisher {
    tx: mpsc::Sender<TelemetryEvent>,
    stats: Arc<ProcessorStats>,
}

impl EventPublisher {
    /// Enqueue an event without waiting.
    ///
    /// Returns `false` if the event was dropped because the queue is full or
    /// the processor has gone away.
    pub fn publish(&self, event: TelemetryEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                let dropped = self.stats.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped == 1 || dropped % DROP_WARN_EVERY == 0 {
                    warn!(
                        "Telemetry queue full, dropped event on {} ({} dropped so far)",
                        event.channel(),
                        dropped
                    );
                }
                false
            }
            Err(TrySendError::Closed(event)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                debug!("Telemetry queue closed, dropped event on {}", event.channel());
                false
            }
        }
    }

    /// Number of events waiting in the queue.
    pub fn pending(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    /// Counters of the processor this publisher feeds.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

/// Ordered stage pipeline fed by a bounded queue.
///
/// # Examples
///
/// ```
/// use telemetry_logger::telemetry::{Payload, TelemetryEvent, TelemetryProcessor, TelemetrySource};
///
/// let processor = TelemetryProcessor::new(2);
/// for i in 0..3 {
///     let event = TelemetryEvent::new(i, TelemetrySource::Transport, "a", Payload::Integer(i)).unwrap();
///     processor.publish(event);
/// }
/// assert_eq!(processor.pending(), 2);
/// assert_eq!(processor.stats().dropped, 1);
///
/// assert_eq!(processor.drain_pending(), 2);
/// assert_eq!(processor.stats().processed, 2);
/// ```
pub struct TelemetryProcessor {
    publisher: EventPublisher,
    receiver: Mutex<Option<mpsc::Receiver<TelemetryEvent>>>,
    stages: Arc<ArcSwap<StageList>>,
    stats: Arc<ProcessorStats>,
    shutdown: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for TelemetryProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryProcessor")
            .field("stages", &self.stage_count())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl TelemetryProcessor {
    /// Create a processor whose queue holds at most `capacity` events,
    /// clamped to `1..=MAX_QUEUE_CAPACITY`.
    pub fn new(capacity: usize) -> Self {
        let stats = Arc::new(ProcessorStats::default());
        let (tx, rx) = mpsc::channel(capacity.clamp(1, MAX_QUEUE_CAPACITY));
        let (shutdown, _) = watch::channel(false);
        Self {
            publisher: EventPublisher {
                tx,
                stats: Arc::clone(&stats),
            },
            receiver: Mutex::new(Some(rx)),
            stages: Arc::new(ArcSwap::from_pointee(Vec::new())),
            stats,
            shutdown,
            worker: Mutex::new(None),
        }
    }

    pub fn publisher(&self) -> EventPublisher {
        self.publisher.clone()
    }

    /// See [`EventPublisher::publish`].
    pub fn publish(&self, event: TelemetryEvent) -> bool {
        self.publisher.publish(event)
    }

    /// Append a stage to the end of the pipeline.
    pub fn register_stage(&self, stage: Arc<dyn TelemetryStage>) {
        debug!("Registering stage {}", stage.name());
        self.stages.rcu(|current| {
            let mut next: StageList = current.as_ref().clone();
            next.push(Arc::clone(&stage));
            next
        });
    }

    pub fn stage_count(&self) -> usize {
        self.stages.load().len()
    }

    /// Spawn the worker on the blocking pool. Must be called from within a
    /// Tokio runtime.
    ///
    /// Calling it again after the worker has been spawned does nothing.
    pub fn start(&self) {
        let Some(rx) = self.receiver.lock().take() else {
            warn!("Telemetry processor already started");
            return;
        };

        let stages = Arc::clone(&self.stages);
        let stats = Arc::clone(&self.stats);
        let shutdown = self.shutdown.subscribe();
        let handle = tokio::task::spawn_blocking(move || run_worker(rx, stages, stats, shutdown));
        *self.worker.lock() = Some(handle);
        info!("Telemetry processor started with {} stages", self.stage_count());
    }

    /// Signal the worker to exit. Idempotent.
    pub fn stop(&self) {
        if !self.shutdown.send_replace(true) {
            debug!("Telemetry processor stop requested");
        }
    }

    /// Wait for the worker task to finish after [`stop`](Self::stop).
    pub async fn join(&self) {
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Telemetry processor worker failed: {}", e);
            }
        }
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn pending(&self) -> usize {
        self.publisher.pending()
    }

    /// Process queued events on the calling thread until the queue is empty.
    ///
    /// Events that stages publish while draining are processed too. Only
    /// works before [`start`](Self::start); afterwards the worker owns the
    /// queue and this returns 0.
    pub fn drain_pending(&self) -> usize {
        let mut guard = self.receiver.lock();
        let Some(rx) = guard.as_mut() else {
            return 0;
        };

        let mut count = 0;
        while let Ok(event) = rx.try_recv() {
            process_event(&self.stages, &self.stats, event);
            count += 1;
        }
        count
    }
}

impl Drop for TelemetryProcessor {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

/// Runs on a blocking-pool thread so slow stages (file I/O, fsync) never
/// occupy a runtime worker. Waiting for the next event stays async.
fn run_worker(
    mut rx: mpsc::Receiver<TelemetryEvent>,
    stages: Arc<ArcSwap<StageList>>,
    stats: Arc<ProcessorStats>,
    mut shutdown: watch::Receiver<bool>,
) {
    let runtime = Handle::current();
    while let Some(event) = runtime.block_on(next_event(&mut rx, &mut shutdown)) {
        process_event(&stages, &stats, event);
    }
    info!("Telemetry processor stopped");
}

/// Next queued event, or `None` once shutdown is requested.
async fn next_event(
    rx: &mut mpsc::Receiver<TelemetryEvent>,
    shutdown: &mut watch::Receiver<bool>,
) -> Option<TelemetryEvent> {
    loop {
        if *shutdown.borrow() {
            return None;
        }
        tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() {
                    return None;
                }
            }
            next = rx.recv() => return next,
        }
    }
}

fn process_event(stages: &ArcSwap<StageList>, stats: &ProcessorStats, event: TelemetryEvent) {
    let mut ctx = TelemetryContext::new(event);
    let snapshot = stages.load();

    for stage in snapshot.iter() {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| stage.apply(&mut ctx)));
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                stats.errors.fetch_add(1, Ordering::Relaxed);
                warn!("Stage {} failed on {}: {}", stage.name(), ctx.channel(), e);
            }
            Err(panic) => {
                stats.errors.fetch_add(1, Ordering::Relaxed);
                error!(
                    "Stage {} panicked on {}: {}",
                    stage.name(),
                    ctx.channel(),
                    panic_message(panic.as_ref())
                );
            }
        }
    }

    stats.processed.fetch_add(1, Ordering::Relaxed);
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "unknown panic"
    }
}
