//! # Telemetry Logger
//!
//! Listens for CSV telemetry datagrams and writes them to rotating structured
//! log files until Ctrl+C.
//!
//! # Examples
//!
//! ```bash
//! cargo run --release -- --config config/default.toml
//! ```
//!
//! Expected output:
//! ```text
//! INFO telemetry_logger: Telemetry Logger v0.1.0 starting...
//! INFO telemetry_logger::transport: Listening for telemetry on udp://0.0.0.0:5900
//! INFO telemetry_logger: received=1200 processed=2400 dropped=0 errors=0 pending=0
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::time::{interval, Duration};
use tracing::{info, warn};

use telemetry_logger::config::Config;
use telemetry_logger::live::{LiveBus, MemoryBus};
use telemetry_logger::Collector;

/// Seconds between status log messages
const STATUS_INTERVAL_SECS: u64 = 10;

#[derive(Debug, Parser)]
#[command(version, about = "Receive UDP telemetry and persist it to structured logs")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config/default.toml")]
    config: PathBuf,
}

fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        warn!("Config file {} not found, using defaults", path.display());
        return Ok(Config::default());
    }
    Config::load(path).with_context(|| format!("loading {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let (writer, _guard) = tracing_appender::non_blocking(std::io::stderr());
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(writer)
        .init();

    info!("Telemetry Logger v{} starting...", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();
    let config = load_config(&args.config)?;

    // No network bus client ships with the logger; an in-process bus keeps the
    // health and forward paths live for embedding applications.
    let bus: Option<Arc<dyn LiveBus>> = config
        .live_bus
        .enabled
        .then(|| Arc::new(MemoryBus::new()) as Arc<dyn LiveBus>);

    let collector = Collector::new(&config, bus);
    let addr = collector.start().await.context("starting collector")?;
    info!("Receiving on {}, logging to {}", addr, config.log.log_dir);
    info!("Press Ctrl+C to exit");

    let mut status_interval = interval(Duration::from_secs(STATUS_INTERVAL_SECS));
    status_interval.tick().await;

    loop {
        tokio::select! {
            _ = status_interval.tick() => {
                let status = collector.status();
                info!(
                    "received={} processed={} dropped={} errors={} pending={}",
                    status.received, status.processed, status.dropped, status.errors, status.pending
                );
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    collector.stop().await;
    let status = collector.status();
    info!(
        "Total packets received: {}, events processed: {}",
        status.received, status.processed
    );
    Ok(())
}
