//! # Structured Log Writer Interface
//!
//! The seam between the log lifecycle manager and a concrete on-disk format.
//! A writer registers named, typed entries and appends timestamped values to
//! them; handles are only valid for the file they were issued in.

use std::path::Path;

use serde::{Serialize, Serializer};

use crate::error::Result;

/// Entry type tags understood by every writer.
pub mod type_tag {
    pub const DOUBLE: &str = "double";
    pub const INT64: &str = "int64";
    pub const BOOLEAN: &str = "boolean";
    pub const STRING: &str = "string";
    pub const BOOLEAN_ARRAY: &str = "boolean[]";
    pub const INT64_ARRAY: &str = "int64[]";
    pub const DOUBLE_ARRAY: &str = "double[]";
    pub const FLOAT_ARRAY: &str = "float[]";
    pub const RAW: &str = "raw";
    /// Type of `/.schema/struct:<Type>` entries
    pub const STRUCT_SCHEMA: &str = "structschema";
}

/// Entry name prefix for published struct schemas
pub const SCHEMA_ENTRY_PREFIX: &str = "/.schema/";

/// Writer-assigned identifier of one entry in the current file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct EntryHandle(pub u32);

/// A value appended to an entry. Struct values and schemas arrive packed as
/// [`EntryValue::Raw`].
///
/// Serializes as the bare value. NaN and the infinities, which JSON has no
/// number for, become the strings `"NaN"`, `"inf"` and `"-inf"`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EntryValue {
    Boolean(bool),
    Integer(i64),
    Double(#[serde(serialize_with = "serialize_f64")] f64),
    String(String),
    BooleanArray(Vec<bool>),
    IntegerArray(Vec<i64>),
    DoubleArray(#[serde(serialize_with = "serialize_f64_seq")] Vec<f64>),
    FloatArray(#[serde(serialize_with = "serialize_f32_seq")] Vec<f32>),
    Raw(Vec<u8>),
}

fn non_finite_name(value: f64) -> Option<&'static str> {
    if value.is_nan() {
        Some("NaN")
    } else if value == f64::INFINITY {
        Some("inf")
    } else if value == f64::NEG_INFINITY {
        Some("-inf")
    } else {
        None
    }
}

fn serialize_f64<S: Serializer>(
    value: &f64,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match non_finite_name(*value) {
        Some(name) => serializer.serialize_str(name),
        None => serializer.serialize_f64(*value),
    }
}

fn serialize_f32<S: Serializer>(
    value: &f32,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match non_finite_name(f64::from(*value)) {
        Some(name) => serializer.serialize_str(name),
        None => serializer.serialize_f32(*value),
    }
}

struct Wire64(f64);

impl Serialize for Wire64 {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serialize_f64(&self.0, serializer)
    }
}

struct Wire32(f32);

impl Serialize for Wire32 {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serialize_f32(&self.0, serializer)
    }
}

fn serialize_f64_seq<S: Serializer>(
    values: &[f64],
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_seq(values.iter().map(|v| Wire64(*v)))
}

fn serialize_f32_seq<S: Serializer>(
    values: &[f32],
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_seq(values.iter().map(|v| Wire32(*v)))
}

/// An open structured log file.
#[cfg_attr(test, mockall::automock)]
pub trait LogWriter: Send {
    /// Register an entry and return its handle.
    fn start_entry(
        &mut self,
        name: &str,
        type_tag: &str,
        metadata: &str,
        timestamp_micros: i64,
    ) -> Result<EntryHandle>;

    fn append(&mut self, handle: EntryHandle, value: &EntryValue, timestamp_micros: i64)
        -> Result<()>;

    /// Push buffered records to durable storage.
    fn flush(&mut self) -> Result<()>;

    /// Flush and release the file. Further calls are no-ops or errors.
    fn close(&mut self) -> Result<()>;
}

/// Opens a [`LogWriter`] for a new file.
#[cfg_attr(test, mockall::automock)]
pub trait WriterFactory: Send + Sync {
    fn create(&self, path: &Path) -> Result<Box<dyn LogWriter>>;
}
