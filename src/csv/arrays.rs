//! # Array and Scalar Field Parsers
//!
//! Helpers for the value and timestamp fields of a CSV telemetry packet.
//! Array elements are separated by `;` and trimmed; an empty field is an
//! empty array.

use std::str::FromStr;

use crate::error::{Result, TelemetryError};

/// Array element delimiter
pub const ARRAY_DELIMITER: char = ';';

/// Parse a boolean field.
///
/// Accepts `true`/`false` in any case and `1`/`0`.
///
/// Other words such as `yes` or `on` are rejected rather than read as
/// `false`, so a misspelled flag drops the packet instead of logging a
/// wrong value.
///
/// # Errors
///
/// Returns [`TelemetryError::Decode`] for anything else.
pub fn parse_bool(field: &str) -> Result<bool> {
    let field = field.trim();
    if field.eq_ignore_ascii_case("true") || field == "1" {
        Ok(true)
    } else if field.eq_ignore_ascii_case("false") || field == "0" {
        Ok(false)
    } else {
        Err(TelemetryError::Decode(format!("invalid boolean: {:?}", field)))
    }
}

pub fn parse_bool_array(field: &str) -> Result<Vec<bool>> {
    split_elements(field).map(parse_bool).collect()
}

pub fn parse_int_array(field: &str) -> Result<Vec<i64>> {
    parse_numeric_array(field, "integer")
}

pub fn parse_double_array(field: &str) -> Result<Vec<f64>> {
    parse_numeric_array(field, "double")
}

pub fn parse_float_array(field: &str) -> Result<Vec<f32>> {
    parse_numeric_array(field, "float")
}

/// Parse one numeric field, naming `kind` in the error.
pub fn parse_number<T: FromStr>(field: &str, kind: &str) -> Result<T> {
    let field = field.trim();
    field
        .parse()
        .map_err(|_| TelemetryError::Decode(format!("invalid {}: {:?}", kind, field)))
}

/// Parse a packet timestamp into microseconds.
///
/// Integers are taken as microseconds. A value containing `.` is taken as
/// fractional seconds. Returns `None` for anything unparseable.
///
/// ```
/// use telemetry_logger::csv::arrays::parse_timestamp_micros;
///
/// assert_eq!(parse_timestamp_micros("1832903929"), Some(1_832_903_929));
/// assert_eq!(parse_timestamp_micros("12.5"), Some(12_500_000));
/// assert_eq!(parse_timestamp_micros("soon"), None);
/// ```
pub fn parse_timestamp_micros(field: &str) -> Option<i64> {
    let field = field.trim();
    if field.is_empty() {
        return None;
    }
    if field.contains('.') {
        let seconds: f64 = field.parse().ok()?;
        if !seconds.is_finite() {
            return None;
        }
        return Some((seconds * 1_000_000.0) as i64);
    }
    field.parse().ok()
}

fn split_elements(field: &str) -> impl Iterator<Item = &str> {
    let field = field.trim();
    // "".split(';') yields one empty element; treat an empty field as no elements
    field
        .split(ARRAY_DELIMITER)
        .filter(move |_| !field.is_empty())
        .map(str::trim)
}

fn parse_numeric_array<T: FromStr>(field: &str, kind: &str) -> Result<Vec<T>> {
    split_elements(field)
        .map(|element| parse_number(element, kind))
        .collect()
}
