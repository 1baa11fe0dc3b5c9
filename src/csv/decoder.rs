//! # CSV Packet Decoder
//!
//! Converts one `timestamp,signalId,type,value[,units]` packet into a typed
//! [`TelemetryEvent`].

use tracing::warn;

use super::arrays::{
    parse_bool, parse_bool_array, parse_double_array, parse_float_array, parse_int_array,
    parse_number, parse_timestamp_micros,
};
use crate::config::CsvConfig;
use crate::error::{Result, TelemetryError};
use crate::structs::{Pose2d, StructValue};
use crate::telemetry::{Payload, TelemetryEvent, TelemetrySource};

/// Maximum number of comma-separated fields; the last one (units) keeps any
/// further commas.
pub const MAX_FIELDS: usize = 5;

/// Minimum number of fields in a valid packet
pub const MIN_FIELDS: usize = 4;

/// The fields of one packet, trimmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsvRecord<'a> {
    pub timestamp: &'a str,
    pub signal_id: &'a str,
    pub type_name: &'a str,
    pub value: &'a str,
    /// Empty when the packet has no units field
    pub units: &'a str,
}

impl<'a> CsvRecord<'a> {
    /// Split a packet into its fields.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::Decode`] if there are fewer than four fields.
    pub fn parse(line: &'a str) -> Result<Self> {
        let fields: Vec<&str> = line.splitn(MAX_FIELDS, ',').map(str::trim).collect();
        if fields.len() < MIN_FIELDS {
            return Err(TelemetryError::Decode(format!(
                "expected at least {} fields, got {}: {:?}",
                MIN_FIELDS,
                fields.len(),
                line
            )));
        }
        Ok(Self {
            timestamp: fields[0],
            signal_id: fields[1],
            type_name: fields[2],
            value: fields[3],
            units: fields.get(4).copied().unwrap_or(""),
        })
    }

    /// Log channel: the signal id, with ` (units)` appended when units are present.
    pub fn channel(&self) -> String {
        if self.units.is_empty() {
            self.signal_id.to_string()
        } else {
            format!("{} ({})", self.signal_id, self.units)
        }
    }
}

/// Stateless CSV-to-event converter.
///
/// # Examples
///
/// ```
/// use telemetry_logger::csv::CsvDecoder;
/// use telemetry_logger::telemetry::{Payload, TelemetrySource};
///
/// let decoder = CsvDecoder::default();
/// let event = decoder
///     .decode("1832883890,/RoboRio/IsBrownOut,bool,false,bool", 0, TelemetrySource::Transport)
///     .unwrap();
/// assert_eq!(event.channel(), "/RoboRio/IsBrownOut (bool)");
/// assert_eq!(event.payload(), &Payload::Boolean(false));
/// assert_eq!(event.timestamp_micros(), 1_832_883_890);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct CsvDecoder {
    use_payload_timestamp: bool,
    fallback_to_receive_time: bool,
}

impl Default for CsvDecoder {
    fn default() -> Self {
        Self::new(&CsvConfig::default())
    }
}

impl CsvDecoder {
    pub fn new(config: &CsvConfig) -> Self {
        Self {
            use_payload_timestamp: config.use_payload_timestamp,
            fallback_to_receive_time: config.fallback_to_receive_time,
        }
    }

    /// Decode one packet.
    ///
    /// `receive_micros` is the time the packet arrived; it is used when the
    /// payload timestamp is disabled or (if configured) unparseable.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::Decode`] for a short packet or a malformed
    /// value, and [`TelemetryError::InvalidEvent`] for an empty channel.
    pub fn decode(
        &self,
        line: &str,
        receive_micros: i64,
        source: TelemetrySource,
    ) -> Result<TelemetryEvent> {
        let record = CsvRecord::parse(line)?;
        let timestamp = self.resolve_timestamp(record.timestamp, receive_micros);
        let payload = decode_value(record.type_name, record.signal_id, record.value)?;
        TelemetryEvent::new(timestamp, source, record.channel(), payload)
    }

    fn resolve_timestamp(&self, field: &str, receive_micros: i64) -> i64 {
        if !self.use_payload_timestamp {
            return receive_micros;
        }
        match parse_timestamp_micros(field) {
            Some(ts) => ts,
            None if self.fallback_to_receive_time => receive_micros,
            None => {
                warn!("Failed to parse CSV timestamp: {:?}", field);
                0
            }
        }
    }
}

/// Convert the value field according to the (case-insensitive) type name.
///
/// Unknown type names fall back to a string payload.
pub fn decode_value(type_name: &str, signal_id: &str, value: &str) -> Result<Payload> {
    let payload = match type_name.to_ascii_lowercase().as_str() {
        "double" | "float" => Payload::Double(parse_number(value, "double")?),
        "int" | "integer" | "long" => Payload::Integer(parse_number(value, "integer")?),
        "bool" | "boolean" => Payload::Boolean(parse_bool(value)?),
        "string" => Payload::String(value.to_string()),
        "bool_array" => Payload::BooleanArray(parse_bool_array(value)?),
        "int_array" => Payload::IntegerArray(parse_int_array(value)?),
        "double_array" if signal_id.to_ascii_lowercase().contains("pose2d") => {
            Payload::Struct(StructValue::Pose2d(parse_pose2d(value)?))
        }
        "double_array" => Payload::DoubleArray(parse_double_array(value)?),
        "float_array" => Payload::FloatArray(parse_float_array(value)?),
        _ => {
            warn!(
                "Unknown CSV type {:?} for {}, storing as string",
                type_name, signal_id
            );
            Payload::String(value.to_string())
        }
    };
    Ok(payload)
}

/// `x;y;rotation_radians`, exactly three numbers.
fn parse_pose2d(value: &str) -> Result<Pose2d> {
    let numbers = parse_double_array(value)?;
    match numbers.as_slice() {
        [x, y, rotation] => Ok(Pose2d::new(*x, *y, *rotation)),
        _ => Err(TelemetryError::Decode(format!(
            "Pose2d needs exactly 3 values [x;y;rotation], got {}",
            numbers.len()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::PayloadKind;

    fn decode(line: &str) -> Result<TelemetryEvent> {
        CsvDecoder::default().decode(line, 777, TelemetrySource::Transport)
    }

    #[test]
    fn test_pose2d_packet_becomes_struct() {
        let event = decode(
            "1832903929,/Chassis/Pose2d,double_array,13.9732;3.99347;0.000575243,X, Y, Rotation",
        )
        .unwrap();

        assert_eq!(event.channel(), "/Chassis/Pose2d (X, Y, Rotation)");
        assert_eq!(event.payload_kind(), PayloadKind::Struct);
        assert_eq!(event.timestamp_micros(), 1_832_903_929);
        match event.payload() {
            Payload::Struct(StructValue::Pose2d(pose)) => {
                assert!((pose.x() - 13.9732).abs() < 1e-9);
                assert!((pose.y() - 3.99347).abs() < 1e-9);
                assert!((pose.rotation.radians() - 0.000575243).abs() < 1e-9);
            }
            other => panic!("Expected Pose2d struct, got: {:?}", other),
        }
    }

    #[test]
    fn test_boolean_packet_with_units() {
        let event = decode("1832883890,/RoboRio/IsBrownOut,bool,false,bool").unwrap();
        assert_eq!(event.channel(), "/RoboRio/IsBrownOut (bool)");
        assert_eq!(event.payload(), &Payload::Boolean(false));
    }

    #[test]
    fn test_bool_array_with_empty_units_keeps_channel() {
        let event = decode("184816,DS:joystick0/buttons,bool_array,0;1;0;1;0;0;0;0;0;0,").unwrap();
        assert_eq!(event.channel(), "DS:joystick0/buttons");
        assert_eq!(
            event.payload(),
            &Payload::BooleanArray(vec![
                false, true, false, true, false, false, false, false, false, false
            ])
        );
        assert_eq!(event.timestamp_micros(), 184_816);
    }

    #[test]
    fn test_type_names_are_case_insensitive() {
        let cases = [
            ("1,a,DOUBLE,1.5", Payload::Double(1.5)),
            ("1,a,Float,2", Payload::Double(2.0)),
            ("1,a,Long,-4", Payload::Integer(-4)),
            ("1,a,int,7", Payload::Integer(7)),
            ("1,a,Boolean,TRUE", Payload::Boolean(true)),
            ("1,a,string,hello world", Payload::String("hello world".into())),
            ("1,a,INT_ARRAY,1;2;3", Payload::IntegerArray(vec![1, 2, 3])),
            ("1,a,double_array,1.0;2.0;3.0", Payload::DoubleArray(vec![1.0, 2.0, 3.0])),
            ("1,a,float_array,1.0;2.0", Payload::FloatArray(vec![1.0, 2.0])),
        ];
        for (line, expected) in cases {
            assert_eq!(decode(line).unwrap().payload(), &expected, "{}", line);
        }
    }

    #[test]
    fn test_unknown_type_falls_back_to_string() {
        let event = decode("1,X,quaternion,1;0;0;0").unwrap();
        assert_eq!(event.payload(), &Payload::String("1;0;0;0".into()));
    }

    #[test]
    fn test_units_keep_embedded_commas() {
        let record = CsvRecord::parse("5,Arm/Angle,double,1.0,deg, measured, raw").unwrap();
        assert_eq!(record.units, "deg, measured, raw");
        assert_eq!(record.channel(), "Arm/Angle (deg, measured, raw)");
    }

    #[test]
    fn test_malformed_packets_are_errors() {
        assert!(matches!(decode("bad,data"), Err(TelemetryError::Decode(_))));
        assert!(matches!(decode(""), Err(TelemetryError::Decode(_))));
        assert!(matches!(
            decode("1,X,double,not-a-number"),
            Err(TelemetryError::Decode(_))
        ));
        assert!(matches!(decode("1,X,int,1.5"), Err(TelemetryError::Decode(_))));
        assert!(matches!(decode("1,,double,1.0"), Err(TelemetryError::InvalidEvent(_))));
    }

    #[test]
    fn test_pose2d_needs_exactly_three_values() {
        assert!(decode("1,Robot/pose2d,double_array,1.0;2.0").is_err());
        assert!(decode("1,Robot/POSE2D,double_array,1.0;2.0;3.0;4.0").is_err());
    }

    #[test]
    fn test_fractional_timestamp_is_seconds() {
        let event = decode("12.5,a,double,1").unwrap();
        assert_eq!(event.timestamp_micros(), 12_500_000);
    }

    #[test]
    fn test_unparseable_timestamp() {
        assert_eq!(decode("later,a,double,1").unwrap().timestamp_micros(), 0);

        let decoder = CsvDecoder::new(&CsvConfig {
            use_payload_timestamp: true,
            fallback_to_receive_time: true,
        });
        let event = decoder
            .decode("later,a,double,1", 777, TelemetrySource::Transport)
            .unwrap();
        assert_eq!(event.timestamp_micros(), 777);
    }

    #[test]
    fn test_receive_time_when_payload_timestamp_disabled() {
        let decoder = CsvDecoder::new(&CsvConfig {
            use_payload_timestamp: false,
            fallback_to_receive_time: false,
        });
        let event = decoder
            .decode("1832883890,a,double,1", 42, TelemetrySource::LiveBus)
            .unwrap();
        assert_eq!(event.timestamp_micros(), 42);
        assert_eq!(event.source(), TelemetrySource::LiveBus);
    }

    #[test]
    fn test_decoding_is_deterministic() {
        let line = "99,Drive/Speed,double,3.25,m/s";
        assert_eq!(decode(line).unwrap(), decode(line).unwrap());
    }
}
