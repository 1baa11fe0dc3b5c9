//! # Persistence Stage
//!
//! Type-directed dispatch of every decoded event to the [`LogManager`].

use std::sync::Arc;

use crate::datalog::LogManager;
use crate::error::Result;
use crate::telemetry::{Payload, TelemetryContext, TelemetryStage};

pub struct PersistStage {
    log: Arc<LogManager>,
}

impl PersistStage {
    pub fn new(log: Arc<LogManager>) -> Self {
        Self { log }
    }
}

impl TelemetryStage for PersistStage {
    fn name(&self) -> &'static str {
        "persist"
    }

    fn apply(&self, ctx: &mut TelemetryContext) -> Result<()> {
        let channel = ctx.channel();
        let ts = ctx.timestamp_micros();
        match ctx.payload() {
            // Undecoded input is never persisted
            Payload::Csv(_) => {}
            Payload::String(value) => self.log.log_string(channel, value, ts),
            Payload::Double(value) => self.log.log_double(channel, *value, ts),
            Payload::Integer(value) => self.log.log_integer(channel, *value, ts),
            Payload::Boolean(value) => self.log.log_boolean(channel, *value, ts),
            Payload::Struct(value) => self.log.log_struct(channel, value, ts),
            Payload::StructArray(values) => self.log.log_struct_array(channel, values, ts),
            Payload::BooleanArray(values) => self.log.log_boolean_array(channel, values, ts),
            Payload::IntegerArray(values) => self.log.log_integer_array(channel, values, ts),
            Payload::DoubleArray(values) => self.log.log_double_array(channel, values, ts),
            Payload::FloatArray(values) => self.log.log_float_array(channel, values, ts),
            Payload::RawBytes(bytes) => self.log.log_raw(channel, bytes, ts),
        }
        Ok(())
    }
}
