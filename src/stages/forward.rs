//! # Live Forward Stage
//!
//! Mirrors decoded events whose channel matches a configured prefix onto the
//! live telemetry bus.

use std::sync::Arc;

use crate::error::Result;
use crate::live::LiveBus;
use crate::telemetry::{Payload, TelemetryContext, TelemetryStage};

pub struct LiveForwardStage {
    bus: Arc<dyn LiveBus>,
    prefixes: Vec<String>,
}

impl LiveForwardStage {
    /// An empty prefix list forwards nothing.
    pub fn new(bus: Arc<dyn LiveBus>, prefixes: Vec<String>) -> Self {
        Self { bus, prefixes }
    }

    pub fn matches(&self, channel: &str) -> bool {
        self.prefixes.iter().any(|prefix| channel.starts_with(prefix.as_str()))
    }
}

impl TelemetryStage for LiveForwardStage {
    fn name(&self) -> &'static str {
        "live-forward"
    }

    fn apply(&self, ctx: &mut TelemetryContext) -> Result<()> {
        if matches!(ctx.payload(), Payload::Csv(_)) || !self.matches(ctx.channel()) {
            return Ok(());
        }
        self.bus.publish(ctx.channel(), ctx.payload())
    }
}
