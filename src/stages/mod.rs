//! # Pipeline Stages
//!
//! The concrete [`TelemetryStage`](crate::telemetry::TelemetryStage)
//! implementations, registered by the collector in this order:
//!
//! 1. [`CsvDecodeStage`] turns raw packets into typed events
//! 2. [`BatteryStage`] derives power and energy channels
//! 3. [`LiveForwardStage`] mirrors selected channels to the live bus
//! 4. [`PersistStage`] writes typed events to the structured log

pub mod battery;
pub mod decode;
pub mod forward;
pub mod persist;

pub use battery::BatteryStage;
pub use decode::CsvDecodeStage;
pub use forward::LiveForwardStage;
pub use persist::PersistStage;
