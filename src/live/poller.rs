//! # Live Bus Poller
//!
//! Reads configured bus paths on a fixed interval and feeds their values
//! into the pipeline as [`TelemetrySource::LiveBus`] events.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use super::LiveBus;
use crate::clock::Clock;
use crate::telemetry::{EventPublisher, Payload, TelemetryEvent, TelemetrySource};

pub struct LiveBusPoller {
    bus: Arc<dyn LiveBus>,
    paths: Vec<String>,
    interval: Duration,
    pipeline: EventPublisher,
    clock: Arc<dyn Clock>,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for LiveBusPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveBusPoller")
            .field("paths", &self.paths)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

impl LiveBusPoller {
    pub fn new(
        bus: Arc<dyn LiveBus>,
        paths: Vec<String>,
        interval: Duration,
        pipeline: EventPublisher,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            bus,
            paths,
            interval,
            pipeline,
            clock,
            shutdown,
            task: Mutex::new(None),
        }
    }

    /// Read every path once and publish the values found.
    ///
    /// Paths with no value, and undecoded CSV text, are skipped. Returns the
    /// number of events published.
    pub fn poll_once(&self) -> usize {
        let timestamp = self.clock.monotonic_micros();
        let mut published = 0;
        for path in &self.paths {
            let Some(value) = self.bus.get(path) else {
                continue;
            };
            if matches!(value, Payload::Csv(_)) {
                continue;
            }
            match TelemetryEvent::new(timestamp, TelemetrySource::LiveBus, path.as_str(), value) {
                Ok(event) => {
                    if self.pipeline.publish(event) {
                        published += 1;
                    }
                }
                Err(e) => debug!("Skipping bus path {:?}: {}", path, e),
            }
        }
        published
    }

    /// Spawn the polling task. Must be called from within a Tokio runtime.
    pub fn start(self: &Arc<Self>) {
        let mut task = self.task.lock();
        if task.is_some() || self.paths.is_empty() {
            return;
        }

        let poller = Arc::clone(self);
        let mut shutdown = self.shutdown.subscribe();
        *task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(poller.interval);
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
                    _ = interval.tick() => {
                        poller.poll_once();
                    }
                }
            }
            debug!("Live bus poller stopped");
        }));
        info!("Polling {} live bus paths every {:?}", self.paths.len(), self.interval);
    }

    /// Idempotent.
    pub fn stop(&self) {
        self.shutdown.send_replace(true);
    }

    pub async fn join(&self) {
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Live bus poller task failed: {}", e);
            }
        }
    }
}
