//! # CSV Decode Stage
//!
//! Turns raw CSV packets into typed events and re-publishes them. Malformed
//! packets are logged and dropped here so they never reach persistence.

use tracing::warn;

use crate::config::CsvConfig;
use crate::csv::CsvDecoder;
use crate::error::Result;
use crate::telemetry::{EventPublisher, Payload, TelemetryContext, TelemetryStage};

/// Context attribute set once a packet has been decoded and re-published
pub const DECODED_ATTRIBUTE: &str = "csv.decoded";

pub struct CsvDecodeStage {
    decoder: CsvDecoder,
    publisher: EventPublisher,
}

impl CsvDecodeStage {
    pub fn new(config: &CsvConfig, publisher: EventPublisher) -> Self {
        Self {
            decoder: CsvDecoder::new(config),
            publisher,
        }
    }
}

impl TelemetryStage for CsvDecodeStage {
    fn name(&self) -> &'static str {
        "csv-decode"
    }

    fn apply(&self, ctx: &mut TelemetryContext) -> Result<()> {
        let Payload::Csv(line) = ctx.payload() else {
            return Ok(());
        };

        let decoded = self
            .decoder
            .decode(line, ctx.timestamp_micros(), ctx.event().source());
        match decoded {
            Ok(event) => {
                let published = self.publisher.publish(event);
                ctx.put_attribute(DECODED_ATTRIBUTE, published);
            }
            Err(e) => warn!("Dropping malformed packet {:?}: {}", line, e),
        }
        Ok(())
    }
}
