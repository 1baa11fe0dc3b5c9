//! # Telemetry Event
//!
//! The immutable unit of work that flows through the pipeline.

use bytes::Bytes;

use crate::error::{Result, TelemetryError};
use crate::structs::{StructSchema, StructValue, StructValues};

/// Where an event entered the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TelemetrySource {
    /// Datagram transport (UDP)
    Transport,
    /// Live telemetry bus
    LiveBus,
    /// Computed by a pipeline stage from other events
    Derived,
}

/// Tag for each [`Payload`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadKind {
    Csv,
    String,
    Double,
    Integer,
    Boolean,
    Struct,
    StructArray,
    BooleanArray,
    IntegerArray,
    DoubleArray,
    FloatArray,
    RawBytes,
}

/// Event payload. The variant is the payload kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Undecoded CSV packet text
    Csv(String),
    String(String),
    Double(f64),
    Integer(i64),
    Boolean(bool),
    Struct(StructValue),
    StructArray(StructValues),
    BooleanArray(Vec<bool>),
    IntegerArray(Vec<i64>),
    DoubleArray(Vec<f64>),
    FloatArray(Vec<f32>),
    RawBytes(Bytes),
}

impl Payload {
    pub fn kind(&self) -> PayloadKind {
        match self {
            Payload::Csv(_) => PayloadKind::Csv,
            Payload::String(_) => PayloadKind::String,
            Payload::Double(_) => PayloadKind::Double,
            Payload::Integer(_) => PayloadKind::Integer,
            Payload::Boolean(_) => PayloadKind::Boolean,
            Payload::Struct(_) => PayloadKind::Struct,
            Payload::StructArray(_) => PayloadKind::StructArray,
            Payload::BooleanArray(_) => PayloadKind::BooleanArray,
            Payload::IntegerArray(_) => PayloadKind::IntegerArray,
            Payload::DoubleArray(_) => PayloadKind::DoubleArray,
            Payload::FloatArray(_) => PayloadKind::FloatArray,
            Payload::RawBytes(_) => PayloadKind::RawBytes,
        }
    }

    /// Numeric view of a `Double` or `Integer` payload.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Payload::Double(v) => Some(*v),
            Payload::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }
}

/// One timestamped telemetry sample.
///
/// # Examples
///
/// ```
/// use telemetry_logger::telemetry::{Payload, PayloadKind, TelemetryEvent, TelemetrySource};
///
/// let event = TelemetryEvent::new(
///     1_000,
///     TelemetrySource::Transport,
///     "RIO/Voltage",
///     Payload::Double(12.4),
/// ).unwrap();
/// assert_eq!(event.payload_kind(), PayloadKind::Double);
/// assert!(event.struct_schema().is_none());
///
/// assert!(TelemetryEvent::new(0, TelemetrySource::Transport, "", Payload::Boolean(true)).is_err());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryEvent {
    timestamp_micros: i64,
    source: TelemetrySource,
    channel: String,
    payload: Payload,
}

impl TelemetryEvent {
    /// Create an event.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::InvalidEvent`] if `channel` is empty.
    pub fn new(
        timestamp_micros: i64,
        source: TelemetrySource,
        channel: impl Into<String>,
        payload: Payload,
    ) -> Result<Self> {
        let channel = channel.into();
        if channel.is_empty() {
            return Err(TelemetryError::InvalidEvent(
                "channel must not be empty".to_string(),
            ));
        }
        Ok(Self {
            timestamp_micros,
            source,
            channel,
            payload,
        })
    }

    pub fn timestamp_micros(&self) -> i64 {
        self.timestamp_micros
    }

    pub fn source(&self) -> TelemetrySource {
        self.source
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn payload_kind(&self) -> PayloadKind {
        self.payload.kind()
    }

    /// Element schema for struct payloads, `None` otherwise.
    pub fn struct_schema(&self) -> Option<&'static StructSchema> {
        match &self.payload {
            Payload::Struct(value) => Some(value.schema()),
            Payload::StructArray(values) => Some(values.schema()),
            _ => None,
        }
    }

    pub fn into_payload(self) -> Payload {
        self.payload
    }
}
