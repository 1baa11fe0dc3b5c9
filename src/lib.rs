//! # Telemetry Logger Library
//!
//! Receive CSV telemetry over UDP, decode it into typed events and persist
//! them to rotating structured log files.
//!
//! Events flow from the [`transport`] receiver through the [`telemetry`]
//! processor, which runs the [`stages`] in order. Typed events end up in the
//! [`datalog`] manager and, optionally, on the [`live`] bus.

pub mod app;
pub mod clock;
pub mod config;
pub mod csv;
pub mod datalog;
pub mod error;
pub mod live;
pub mod stages;
pub mod structs;
pub mod telemetry;
pub mod transport;

pub use app::{Collector, CollectorStatus};
pub use error::{Result, TelemetryError};
