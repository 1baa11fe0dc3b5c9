//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every section and every field is optional; missing values fall back to the
//! defaults below, so an empty file is a valid configuration.

use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::{Result, TelemetryError};
use crate::telemetry::processor::MAX_QUEUE_CAPACITY;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub csv: CsvConfig,
    #[serde(default)]
    pub battery: BatteryConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub live_bus: LiveBusConfig,
}

/// UDP transport configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TransportConfig {
    /// Port to listen on. `0` binds an ephemeral port (tests only).
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Receive buffer size; larger datagrams are truncated
    #[serde(default = "default_max_packet_size")]
    pub max_packet_size: usize,
}

/// Stage pipeline configuration
#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

/// CSV decode configuration
#[derive(Debug, Deserialize, Clone)]
pub struct CsvConfig {
    /// Use the timestamp carried in the packet instead of the receive time
    #[serde(default = "default_use_payload_timestamp")]
    pub use_payload_timestamp: bool,

    /// When the packet timestamp is unparseable, use the receive time instead of 0
    #[serde(default)]
    pub fallback_to_receive_time: bool,
}

/// Battery power/energy stage configuration
#[derive(Debug, Deserialize, Clone)]
pub struct BatteryConfig {
    #[serde(default = "default_battery_enabled")]
    pub enabled: bool,

    #[serde(default = "default_voltage_channel")]
    pub voltage_channel: String,

    #[serde(default = "default_current_channel")]
    pub current_channel: String,

    #[serde(default = "default_change_threshold_volts")]
    pub change_threshold_volts: f64,

    #[serde(default = "default_compute_interval_ms")]
    pub compute_interval_ms: u64,
}

/// Structured log file configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,

    #[serde(default = "default_file_extension")]
    pub file_extension: String,

    #[serde(default = "default_max_file_age_ms")]
    pub max_file_age_ms: u64,

    #[serde(default = "default_flush_entry_threshold")]
    pub flush_entry_threshold: u64,

    #[serde(default = "default_flush_time_threshold_ms")]
    pub flush_time_threshold_ms: u64,
}

/// Live telemetry bus configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LiveBusConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Channels starting with any of these prefixes are forwarded to the bus
    #[serde(default)]
    pub forward_prefixes: Vec<String>,

    #[serde(default = "default_health_table")]
    pub health_table: String,

    #[serde(default = "default_health_interval_ms")]
    pub health_interval_ms: u64,

    /// Bus paths polled and fed into the pipeline as events
    #[serde(default)]
    pub poll_paths: Vec<String>,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

// Default value functions
fn default_listen_port() -> u16 { 5900 }
fn default_max_packet_size() -> usize { 1500 }

fn default_queue_capacity() -> usize { 20_000 }

fn default_use_payload_timestamp() -> bool { true }

fn default_battery_enabled() -> bool { true }
fn default_voltage_channel() -> String { "RIO/Voltage".to_string() }
fn default_current_channel() -> String { "RIO/Current".to_string() }
fn default_change_threshold_volts() -> f64 { 0.5 }
fn default_compute_interval_ms() -> u64 { 1000 }

fn default_log_dir() -> String { "/mnt/usb_logs".to_string() }
fn default_file_prefix() -> String { "udp_".to_string() }
fn default_file_extension() -> String { "jsonl".to_string() }
fn default_max_file_age_ms() -> u64 { 5 * 60 * 1000 }
fn default_flush_entry_threshold() -> u64 { 200 }
fn default_flush_time_threshold_ms() -> u64 { 500 }

fn default_health_table() -> String { "pi".to_string() }
fn default_health_interval_ms() -> u64 { 1000 }
fn default_poll_interval_ms() -> u64 { 20 }

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            listen_port: default_listen_port(),
            max_packet_size: default_max_packet_size(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { queue_capacity: default_queue_capacity() }
    }
}

impl Default for CsvConfig {
    fn default() -> Self {
        Self {
            use_payload_timestamp: default_use_payload_timestamp(),
            fallback_to_receive_time: false,
        }
    }
}

impl Default for BatteryConfig {
    fn default() -> Self {
        Self {
            enabled: default_battery_enabled(),
            voltage_channel: default_voltage_channel(),
            current_channel: default_current_channel(),
            change_threshold_volts: default_change_threshold_volts(),
            compute_interval_ms: default_compute_interval_ms(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            file_prefix: default_file_prefix(),
            file_extension: default_file_extension(),
            max_file_age_ms: default_max_file_age_ms(),
            flush_entry_threshold: default_flush_entry_threshold(),
            flush_time_threshold_ms: default_flush_time_threshold_ms(),
        }
    }
}

impl Default for LiveBusConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            forward_prefixes: Vec::new(),
            health_table: default_health_table(),
            health_interval_ms: default_health_interval_ms(),
            poll_paths: Vec::new(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

fn invalid(message: impl Into<String>) -> TelemetryError {
    TelemetryError::Validation(message.into())
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use telemetry_logger::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::Validation`] naming the first value that is
    /// out of its allowed range.
    pub fn validate(&self) -> Result<()> {
        if self.transport.listen_port == 0 {
            return Err(invalid("listen_port must be between 1 and 65535"));
        }

        // IPv4 UDP payload limit is 65507 bytes
        if self.transport.max_packet_size < 256 || self.transport.max_packet_size > 65507 {
            return Err(invalid("max_packet_size must be between 256 and 65507"));
        }

        if self.pipeline.queue_capacity == 0 {
            return Err(invalid("queue_capacity must be greater than 0"));
        }
        if self.pipeline.queue_capacity > MAX_QUEUE_CAPACITY {
            return Err(invalid(format!(
                "queue_capacity must be at most {}",
                MAX_QUEUE_CAPACITY
            )));
        }

        if self.battery.enabled {
            if self.battery.voltage_channel.is_empty() || self.battery.current_channel.is_empty() {
                return Err(invalid("battery voltage_channel and current_channel cannot be empty"));
            }
            if !(self.battery.change_threshold_volts >= 0.0) {
                return Err(invalid("change_threshold_volts must be 0.0 or greater"));
            }
            if self.battery.compute_interval_ms == 0 {
                return Err(invalid("compute_interval_ms must be greater than 0"));
            }
        }

        if self.log.log_dir.is_empty() {
            return Err(invalid("log_dir cannot be empty"));
        }

        if self.log.file_extension.is_empty() || self.log.file_extension.contains('/') {
            return Err(invalid("file_extension must be a non-empty name without '/'"));
        }

        if self.log.file_prefix.contains('/') {
            return Err(invalid("file_prefix cannot contain '/'"));
        }

        if self.log.max_file_age_ms == 0 {
            return Err(invalid("max_file_age_ms must be greater than 0"));
        }

        if self.log.flush_entry_threshold == 0 {
            return Err(invalid("flush_entry_threshold must be greater than 0"));
        }

        if self.log.flush_time_threshold_ms == 0 {
            return Err(invalid("flush_time_threshold_ms must be greater than 0"));
        }

        if self.live_bus.enabled {
            if self.live_bus.health_table.is_empty() {
                return Err(invalid("health_table cannot be empty when live_bus is enabled"));
            }
            if self.live_bus.health_interval_ms == 0 || self.live_bus.health_interval_ms > 60000 {
                return Err(invalid("health_interval_ms must be between 1 and 60000"));
            }
            if !self.live_bus.poll_paths.is_empty() && self.live_bus.poll_interval_ms == 0 {
                return Err(invalid("poll_interval_ms must be greater than 0"));
            }
        }

        Ok(())
    }
}
