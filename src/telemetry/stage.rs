//! # Pipeline Stage Interface

use crate::error::Result;

use super::context::TelemetryContext;

/// One step of the processing pipeline.
///
/// Stages run in registration order on the processor's worker task. A stage
/// that wants to emit new events holds an
/// [`EventPublisher`](super::processor::EventPublisher) and publishes them;
/// they are processed later as separate events.
#[cfg_attr(test, mockall::automock)]
pub trait TelemetryStage: Send + Sync {
    /// Short name used in log messages.
    fn name(&self) -> &'static str;

    fn apply(&self, ctx: &mut TelemetryContext) -> Result<()>;
}
