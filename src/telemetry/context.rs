//! # Telemetry Context
//!
//! Per-pass wrapper around one event. Stages share the attribute map to pass
//! intermediate results down the pipeline.

use std::borrow::Cow;
use std::collections::HashMap;

use serde_json::Value;

use super::event::{Payload, PayloadKind, TelemetryEvent};

/// One event plus the attributes stages attach while processing it.
#[derive(Debug, Clone)]
pub struct TelemetryContext {
    event: TelemetryEvent,
    attributes: HashMap<String, Value>,
}

impl TelemetryContext {
    pub fn new(event: TelemetryEvent) -> Self {
        Self {
            event,
            attributes: HashMap::new(),
        }
    }

    pub fn event(&self) -> &TelemetryEvent {
        &self.event
    }

    pub fn timestamp_micros(&self) -> i64 {
        self.event.timestamp_micros()
    }

    pub fn channel(&self) -> &str {
        self.event.channel()
    }

    pub fn payload_kind(&self) -> PayloadKind {
        self.event.payload_kind()
    }

    pub fn payload(&self) -> &Payload {
        self.event.payload()
    }

    /// Text view of the payload.
    ///
    /// CSV and string payloads are borrowed as-is, raw bytes are decoded
    /// lossily, every other kind yields `None`.
    pub fn payload_as_str(&self) -> Option<Cow<'_, str>> {
        match self.event.payload() {
            Payload::Csv(text) | Payload::String(text) => Some(Cow::Borrowed(text.as_str())),
            Payload::RawBytes(bytes) => Some(String::from_utf8_lossy(bytes)),
            _ => None,
        }
    }

    pub fn put_attribute(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(key.into(), value.into());
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn attributes(&self) -> &HashMap<String, Value> {
        &self.attributes
    }
}
