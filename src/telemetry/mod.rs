//! # Telemetry Module
//!
//! Event model and the stage pipeline that carries events from the transport
//! to persistence.
//!
//! This module handles:
//! - Typed telemetry events and payloads
//! - Per-pass processing context
//! - The bounded-queue processor and its stage interface

pub mod context;
pub mod event;
pub mod processor;
pub mod stage;

pub use context::TelemetryContext;
pub use event::{Payload, PayloadKind, TelemetryEvent, TelemetrySource};
pub use processor::{EventPublisher, StatsSnapshot, TelemetryProcessor};
pub use stage::TelemetryStage;
