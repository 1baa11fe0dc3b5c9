//! # Collector
//!
//! Wires the receiver, the stage pipeline, the log manager and the optional
//! live-bus components together and owns their start/stop order.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::datalog::{JsonlWriterFactory, LogManager, WriterFactory};
use crate::error::Result;
use crate::live::{HealthPublisher, LiveBus, LiveBusPoller};
use crate::stages::{BatteryStage, CsvDecodeStage, LiveForwardStage, PersistStage};
use crate::telemetry::TelemetryProcessor;
use crate::transport::UdpReceiver;

/// Point-in-time counters for status reporting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectorStatus {
    pub received: u64,
    pub processed: u64,
    pub dropped: u64,
    pub errors: u64,
    pub pending: usize,
    pub log_file: Option<PathBuf>,
}

pub struct Collector {
    processor: Arc<TelemetryProcessor>,
    log: Arc<LogManager>,
    receiver: Arc<UdpReceiver>,
    health: Option<Arc<HealthPublisher>>,
    poller: Option<Arc<LiveBusPoller>>,
}

impl Collector {
    /// Build a collector writing JSON Lines files with the system clock.
    ///
    /// `bus` is only used when `config.live_bus.enabled` is set.
    pub fn new(config: &Config, bus: Option<Arc<dyn LiveBus>>) -> Self {
        Self::with_parts(
            config,
            bus,
            Arc::new(SystemClock::new()),
            Arc::new(JsonlWriterFactory),
        )
    }

    pub fn with_parts(
        config: &Config,
        bus: Option<Arc<dyn LiveBus>>,
        clock: Arc<dyn Clock>,
        factory: Arc<dyn WriterFactory>,
    ) -> Self {
        let processor = Arc::new(TelemetryProcessor::new(config.pipeline.queue_capacity));
        let log = Arc::new(LogManager::new(&config.log, factory, Arc::clone(&clock)));
        let receiver = Arc::new(UdpReceiver::new(
            &config.transport,
            processor.publisher(),
            Arc::clone(&clock),
        ));
        let bus = bus.filter(|_| config.live_bus.enabled);

        processor.register_stage(Arc::new(CsvDecodeStage::new(
            &config.csv,
            processor.publisher(),
        )));
        if config.battery.enabled {
            processor.register_stage(Arc::new(BatteryStage::new(
                &config.battery,
                Arc::clone(&clock),
                processor.publisher(),
            )));
        }
        if let Some(bus) = &bus {
            processor.register_stage(Arc::new(LiveForwardStage::new(
                Arc::clone(bus),
                config.live_bus.forward_prefixes.clone(),
            )));
        }
        processor.register_stage(Arc::new(PersistStage::new(Arc::clone(&log))));

        let health = bus.as_ref().map(|bus| {
            Arc::new(HealthPublisher::new(
                Arc::clone(bus),
                config.live_bus.health_table.clone(),
                Duration::from_millis(config.live_bus.health_interval_ms),
                processor.publisher(),
                log.log_dir(),
            ))
        });
        let poller = bus.as_ref().map(|bus| {
            Arc::new(LiveBusPoller::new(
                Arc::clone(bus),
                config.live_bus.poll_paths.clone(),
                Duration::from_millis(config.live_bus.poll_interval_ms),
                processor.publisher(),
                Arc::clone(&clock),
            ))
        });

        Self {
            processor,
            log,
            receiver,
            health,
            poller,
        }
    }

    /// Start every component, consumers before producers.
    ///
    /// Must be called from within a Tokio runtime. Returns the bound
    /// transport address.
    pub async fn start(&self) -> Result<SocketAddr> {
        self.processor.start();
        self.log.start();
        let addr = match self.receiver.start().await {
            Ok(addr) => addr,
            Err(e) => {
                self.shutdown_consumers().await;
                return Err(e);
            }
        };
        if let Some(poller) = &self.poller {
            poller.start();
        }
        if let Some(health) = &self.health {
            health.start();
        }
        info!("Collector started on {}", addr);
        Ok(addr)
    }

    /// Stop producers first, then the pipeline, then close the log.
    pub async fn stop(&self) {
        self.receiver.stop();
        if let Some(poller) = &self.poller {
            poller.stop();
        }
        self.receiver.join().await;
        if let Some(poller) = &self.poller {
            poller.join().await;
        }
        if let Some(health) = &self.health {
            health.stop();
            health.join().await;
        }
        self.shutdown_consumers().await;
        info!("Collector stopped");
    }

    async fn shutdown_consumers(&self) {
        self.processor.stop();
        self.processor.join().await;
        self.log.stop();
        self.log.join().await;
    }

    pub fn status(&self) -> CollectorStatus {
        let stats = self.processor.stats();
        CollectorStatus {
            received: self.receiver.messages_received(),
            processed: stats.processed,
            dropped: stats.dropped,
            errors: stats.errors,
            pending: self.processor.pending(),
            log_file: self.log.current_path(),
        }
    }

    pub fn stage_count(&self) -> usize {
        self.processor.stage_count()
    }
}
