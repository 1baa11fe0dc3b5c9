//! # Health Publisher
//!
//! Publishes collector liveness and pipeline counters to the live bus on a
//! fixed interval.

use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use super::LiveBus;
use crate::telemetry::{EventPublisher, Payload};

/// Health entry names under the configured table
pub const CONNECTED: &str = "connected";
pub const HEARTBEAT: &str = "heartbeat";
pub const LOG_QUEUE_DEPTH: &str = "logQueueDepth";
pub const MESSAGES_PROCESSED: &str = "messagesProcessed";
pub const DROPPED_EVENTS: &str = "droppedEvents";
pub const DISK_FREE_MB: &str = "diskFreeMB";

/// Periodic health reporter.
pub struct HealthPublisher {
    bus: Arc<dyn LiveBus>,
    table: String,
    interval: Duration,
    pipeline: EventPublisher,
    disk_path: PathBuf,
    heartbeat: AtomicI64,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for HealthPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthPublisher")
            .field("table", &self.table)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

impl HealthPublisher {
    /// `disk_path` is the directory whose free space is reported, normally
    /// the log directory.
    pub fn new(
        bus: Arc<dyn LiveBus>,
        table: impl Into<String>,
        interval: Duration,
        pipeline: EventPublisher,
        disk_path: impl Into<PathBuf>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            bus,
            table: table.into(),
            interval,
            pipeline,
            disk_path: disk_path.into(),
            heartbeat: AtomicI64::new(0),
            shutdown,
            task: Mutex::new(None),
        }
    }

    fn path(&self, entry: &str) -> String {
        format!("{}/{}", self.table, entry)
    }

    fn set(&self, entry: &str, value: Payload) {
        let path = self.path(entry);
        if let Err(e) = self.bus.publish(&path, &value) {
            debug!("Failed to publish {}: {}", path, e);
        }
    }

    /// Publish every health entry once.
    pub fn publish_once(&self) {
        let heartbeat = self.heartbeat.fetch_add(1, Ordering::Relaxed) + 1;
        let stats = self.pipeline.stats();

        self.set(CONNECTED, Payload::Boolean(true));
        self.set(HEARTBEAT, Payload::Integer(heartbeat));
        self.set(LOG_QUEUE_DEPTH, Payload::Integer(self.pipeline.pending() as i64));
        self.set(MESSAGES_PROCESSED, Payload::Integer(stats.processed as i64));
        self.set(DROPPED_EVENTS, Payload::Integer(stats.dropped as i64));

        match fs4::available_space(&self.disk_path) {
            Ok(bytes) => self.set(DISK_FREE_MB, Payload::Double(bytes as f64 / 1e6)),
            Err(e) => debug!("Cannot read free space of {}: {}", self.disk_path.display(), e),
        }
    }

    pub fn heartbeat(&self) -> i64 {
        self.heartbeat.load(Ordering::Relaxed)
    }

    /// Spawn the publishing task. Must be called from within a Tokio runtime.
    pub fn start(self: &Arc<Self>) {
        let mut task = self.task.lock();
        if task.is_some() {
            return;
        }

        let publisher = Arc::clone(self);
        let mut shutdown = self.shutdown.subscribe();
        *task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(publisher.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                if *shutdown.borrow() {
                    break;
                }
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = interval.tick() => publisher.publish_once(),
                }
            }
            publisher.set(CONNECTED, Payload::Boolean(false));
            debug!("Health publisher stopped");
        }));
        info!(
            "Publishing health to {}/ every {:?}",
            self.table, self.interval
        );
    }

    /// Idempotent.
    pub fn stop(&self) {
        self.shutdown.send_replace(true);
    }

    pub async fn join(&self) {
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Health publisher task failed: {}", e);
            }
        }
    }
}
