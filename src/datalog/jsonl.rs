//! # JSON Lines Log Writer
//!
//! Writes one JSON object per line:
//!
//! ```text
//! {"record":"header","format":"telemetry-jsonl","version":1}
//! {"record":"start","entry":1,"name":"RIO/Voltage","type":"double","metadata":"","ts":1000}
//! {"record":"data","entry":1,"ts":1000,"value":12.4}
//! ```
//!
//! Struct values and schemas are `raw` byte arrays. Non-finite doubles and
//! floats are written as the strings `"NaN"`, `"inf"` and `"-inf"`.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use super::writer::{EntryHandle, EntryValue, LogWriter, WriterFactory};
use crate::error::{Result, TelemetryError};

/// Format name written in the header record
pub const FORMAT_NAME: &str = "telemetry-jsonl";

/// Format version written in the header record
pub const FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
#[serde(tag = "record", rename_all = "lowercase")]
enum Record<'a> {
    Header {
        format: &'a str,
        version: u32,
    },
    Start {
        entry: EntryHandle,
        name: &'a str,
        #[serde(rename = "type")]
        type_tag: &'a str,
        metadata: &'a str,
        ts: i64,
    },
    Data {
        entry: EntryHandle,
        ts: i64,
        value: &'a EntryValue,
    },
}

/// [`LogWriter`] producing a JSON Lines file.
pub struct JsonlWriter {
    path: PathBuf,
    out: Option<BufWriter<File>>,
    next_entry: u32,
}

impl std::fmt::Debug for JsonlWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonlWriter")
            .field("path", &self.path)
            .field("open", &self.out.is_some())
            .finish_non_exhaustive()
    }
}

impl JsonlWriter {
    /// Create (or append to) the file at `path` and write the header record.
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut writer = Self {
            path: path.to_path_buf(),
            out: Some(BufWriter::new(file)),
            next_entry: 1,
        };
        writer.write_record(&Record::Header {
            format: FORMAT_NAME,
            version: FORMAT_VERSION,
        })?;
        debug!("Created JSONL log {}", path.display());
        Ok(writer)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_record(&mut self, record: &Record<'_>) -> Result<()> {
        let out = self.out.as_mut().ok_or_else(|| {
            TelemetryError::Writer(format!("{} is closed", self.path.display()))
        })?;
        serde_json::to_writer(&mut *out, record)?;
        out.write_all(b"\n")?;
        Ok(())
    }
}

impl LogWriter for JsonlWriter {
    fn start_entry(
        &mut self,
        name: &str,
        type_tag: &str,
        metadata: &str,
        timestamp_micros: i64,
    ) -> Result<EntryHandle> {
        let entry = EntryHandle(self.next_entry);
        self.write_record(&Record::Start {
            entry,
            name,
            type_tag,
            metadata,
            ts: timestamp_micros,
        })?;
        self.next_entry += 1;
        Ok(entry)
    }

    fn append(
        &mut self,
        handle: EntryHandle,
        value: &EntryValue,
        timestamp_micros: i64,
    ) -> Result<()> {
        self.write_record(&Record::Data {
            entry: handle,
            ts: timestamp_micros,
            value,
        })
    }

    fn flush(&mut self) -> Result<()> {
        if let Some(out) = self.out.as_mut() {
            out.flush()?;
            out.get_ref().sync_data()?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.flush()?;
        if self.out.take().is_some() {
            debug!("Closed JSONL log {}", self.path.display());
        }
        Ok(())
    }
}

impl Drop for JsonlWriter {
    fn drop(&mut self) {
        if let Some(out) = self.out.as_mut() {
            let _ = out.flush();
        }
    }
}

/// Opens a [`JsonlWriter`] per log file.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonlWriterFactory;

impl WriterFactory for JsonlWriterFactory {
    fn create(&self, path: &Path) -> Result<Box<dyn LogWriter>> {
        Ok(Box::new(JsonlWriter::create(path)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use tempfile::TempDir;

    fn read_lines(path: &Path) -> Vec<Value> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn test_records_are_one_json_object_per_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.jsonl");

        let mut writer = JsonlWriter::create(&path).unwrap();
        let voltage = writer.start_entry("RIO/Voltage", "double", "", 10).unwrap();
        let flags = writer.start_entry("Flags", "boolean[]", "", 11).unwrap();
        assert_ne!(voltage, flags);

        writer.append(voltage, &EntryValue::Double(12.4), 10).unwrap();
        writer
            .append(flags, &EntryValue::BooleanArray(vec![true, false]), 11)
            .unwrap();
        writer.close().unwrap();

        let lines = read_lines(&path);
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0]["record"], "header");
        assert_eq!(lines[0]["format"], FORMAT_NAME);
        assert_eq!(lines[1]["record"], "start");
        assert_eq!(lines[1]["name"], "RIO/Voltage");
        assert_eq!(lines[1]["type"], "double");
        assert_eq!(lines[3]["record"], "data");
        assert_eq!(lines[3]["entry"], lines[1]["entry"]);
        assert_eq!(lines[3]["ts"], 10);
        assert_eq!(lines[3]["value"], 12.4);
        assert_eq!(lines[4]["value"], serde_json::json!([true, false]));
    }

    #[test]
    fn test_flush_makes_records_visible() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("flush.jsonl");

        let mut writer = JsonlWriter::create(&path).unwrap();
        let entry = writer.start_entry("a", "int64", "", 0).unwrap();
        writer.append(entry, &EntryValue::Integer(3), 5).unwrap();
        writer.flush().unwrap();

        assert_eq!(read_lines(&path).len(), 3);
    }

    #[test]
    fn test_close_is_idempotent_and_rejects_writes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("closed.jsonl");

        let mut writer = JsonlWriter::create(&path).unwrap();
        writer.close().unwrap();
        writer.close().unwrap();

        match writer.start_entry("a", "double", "", 0) {
            Err(TelemetryError::Writer(msg)) => assert!(msg.contains("closed")),
            other => panic!("Expected Writer error, got: {:?}", other),
        }
    }

    #[test]
    fn test_factory_creates_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("factory.jsonl");

        let mut writer = JsonlWriterFactory.create(&path).unwrap();
        writer.close().unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_non_finite_values_survive_reading_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nonfinite.jsonl");

        let mut writer = JsonlWriter::create(&path).unwrap();
        let scalar = writer.start_entry("Sensor/Ratio", "double", "", 0).unwrap();
        let array = writer.start_entry("Sensor/Samples", "float[]", "", 0).unwrap();
        for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY, 2.5] {
            writer.append(scalar, &EntryValue::Double(value), 1).unwrap();
        }
        writer
            .append(array, &EntryValue::FloatArray(vec![f32::NEG_INFINITY, 0.25]), 2)
            .unwrap();
        writer.close().unwrap();

        let read_back = |value: &Value| -> f64 {
            match value {
                Value::String(text) => text.parse().unwrap(),
                other => other.as_f64().unwrap(),
            }
        };

        let lines = read_lines(&path);
        let scalars: Vec<f64> = lines[3..7].iter().map(|line| read_back(&line["value"])).collect();
        assert!(scalars[0].is_nan());
        assert_eq!(scalars[1], f64::INFINITY);
        assert_eq!(scalars[2], f64::NEG_INFINITY);
        assert_eq!(scalars[3], 2.5);

        let samples = lines[7]["value"].as_array().unwrap();
        assert_eq!(read_back(&samples[0]), f64::NEG_INFINITY);
        assert_eq!(read_back(&samples[1]), 0.25);
    }
}
