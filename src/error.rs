//! # Error Types
//!
//! Custom error types for the telemetry logger using `thiserror`.

use thiserror::Error;

/// Main error type for the telemetry logger
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Configuration file could not be parsed
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Configuration parsed but a value is out of range
    #[error("Invalid configuration: {0}")]
    Validation(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport socket could not be bound
    #[error("Failed to bind transport on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// Event violates a model invariant (e.g. empty channel)
    #[error("Invalid telemetry event: {0}")]
    InvalidEvent(String),

    /// CSV packet could not be decoded
    #[error("CSV decode error: {0}")]
    Decode(String),

    /// Struct payload could not be packed or unpacked
    #[error("Struct codec error: {0}")]
    StructCodec(String),

    /// Structured log writer failure
    #[error("Log writer error: {0}")]
    Writer(String),

    /// JSON serialization errors
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Live telemetry bus failure
    #[error("Live bus error: {0}")]
    LiveBus(String),
}

/// Result type alias for the telemetry logger
pub type Result<T> = std::result::Result<T, TelemetryError>;
