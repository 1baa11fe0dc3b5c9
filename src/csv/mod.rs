//! # CSV Telemetry Format
//!
//! Parsing for the `timestamp,signalId,type,value[,units]` packet format sent
//! by the robot controller.
//!
//! This module handles:
//! - Field splitting (max 5 fields, units may contain commas)
//! - `;`-delimited array values
//! - Timestamp conversion (integer microseconds or fractional seconds)
//! - Type dispatch to typed payloads, including `Pose2d` structs

pub mod arrays;
pub mod decoder;

pub use decoder::{CsvDecoder, CsvRecord};
