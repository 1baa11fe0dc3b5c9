//! # Battery Power Stage
//!
//! Folds the latest voltage and current readings into instantaneous power,
//! accumulated energy and a battery-swap flag. Results are re-published into
//! the pipeline as Double/Boolean events so they are persisted like any other
//! channel.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::config::BatteryConfig;
use crate::error::Result;
use crate::telemetry::{
    EventPublisher, Payload, TelemetryContext, TelemetryEvent, TelemetrySource, TelemetryStage,
};

/// Output channels
pub const WATTS_CHANNEL: &str = "Battery/Watts";
pub const WATT_HOURS_CHANNEL: &str = "Battery/WattHours";
pub const CHANGED_CHANNEL: &str = "Battery/Changed";

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

#[derive(Debug, Default)]
struct BatteryState {
    latest_voltage: Option<f64>,
    latest_current: Option<f64>,
    last_change_voltage: Option<f64>,
    total_watt_hours: f64,
    last_compute_ms: Option<i64>,
}

pub struct BatteryStage {
    voltage_channel: String,
    current_channel: String,
    change_threshold_volts: f64,
    compute_interval_ms: i64,
    clock: Arc<dyn Clock>,
    publisher: EventPublisher,
    state: Mutex<BatteryState>,
}

/// Instantaneous power in watts.
pub fn compute_watts(voltage: f64, current: f64) -> f64 {
    voltage * current
}

impl BatteryStage {
    pub fn new(config: &BatteryConfig, clock: Arc<dyn Clock>, publisher: EventPublisher) -> Self {
        info!(
            "Battery stage watching {} and {}",
            config.voltage_channel, config.current_channel
        );
        Self {
            voltage_channel: config.voltage_channel.clone(),
            current_channel: config.current_channel.clone(),
            change_threshold_volts: config.change_threshold_volts,
            compute_interval_ms: config.compute_interval_ms as i64,
            clock,
            publisher,
            state: Mutex::new(BatteryState::default()),
        }
    }

    /// Cache the reading if `channel` is the voltage or current channel and
    /// the payload is numeric.
    pub fn update_reading(&self, channel: &str, payload: &Payload) {
        let Some(value) = payload.as_f64() else {
            return;
        };
        let mut state = self.state.lock();
        if channel == self.voltage_channel {
            state.latest_voltage = Some(value);
        } else if channel == self.current_channel {
            state.latest_current = Some(value);
        }
    }

    /// Run the computation if the interval has elapsed since the last one.
    ///
    /// The first call only records `now_ms`. Returns the derived events, which
    /// is empty when nothing was computed.
    pub fn maybe_compute(&self, now_ms: i64) -> Vec<TelemetryEvent> {
        let mut state = self.state.lock();
        let Some(last) = state.last_compute_ms else {
            state.last_compute_ms = Some(now_ms);
            return Vec::new();
        };

        let elapsed_ms = now_ms - last;
        if elapsed_ms < self.compute_interval_ms {
            return Vec::new();
        }
        state.last_compute_ms = Some(now_ms);

        let (Some(voltage), Some(current)) = (state.latest_voltage, state.latest_current) else {
            return Vec::new();
        };

        let watts = compute_watts(voltage, current);
        state.total_watt_hours += watts * elapsed_ms as f64 / MILLIS_PER_HOUR;

        let timestamp = self.clock.monotonic_micros();
        let mut derived = vec![
            (WATTS_CHANNEL, Payload::Double(watts)),
            (WATT_HOURS_CHANNEL, Payload::Double(state.total_watt_hours)),
        ];
        if Self::detect_change(&mut state, voltage, self.change_threshold_volts) {
            info!("Battery change detected at {:.2} V", voltage);
            derived.push((CHANGED_CHANNEL, Payload::Boolean(true)));
        }

        derived
            .into_iter()
            .filter_map(|(channel, payload)| {
                TelemetryEvent::new(timestamp, TelemetrySource::Derived, channel, payload).ok()
            })
            .collect()
    }

    /// First reading only seeds the baseline.
    fn detect_change(state: &mut BatteryState, voltage: f64, threshold: f64) -> bool {
        let changed = state
            .last_change_voltage
            .is_some_and(|previous| voltage - previous >= threshold);
        state.last_change_voltage = Some(voltage);
        changed
    }

    pub fn total_watt_hours(&self) -> f64 {
        self.state.lock().total_watt_hours
    }

    pub fn latest_voltage(&self) -> Option<f64> {
        self.state.lock().latest_voltage
    }

    pub fn latest_current(&self) -> Option<f64> {
        self.state.lock().latest_current
    }
}

impl TelemetryStage for BatteryStage {
    fn name(&self) -> &'static str {
        "battery"
    }

    fn apply(&self, ctx: &mut TelemetryContext) -> Result<()> {
        self.update_reading(ctx.channel(), ctx.payload());
        for event in self.maybe_compute(self.clock.wall_millis()) {
            if !self.publisher.publish(event) {
                debug!("Derived battery event dropped");
            }
        }
        Ok(())
    }
}
