//! # Time Sources
//!
//! Wall-clock milliseconds drive rotation, flush batching and derived-metric
//! cadence. Monotonic microseconds since process start stamp received packets,
//! so log timelines begin near zero.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Source of time for every component that makes time-based decisions.
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn wall_millis(&self) -> i64;

    /// Microseconds since this clock was created.
    fn monotonic_micros(&self) -> i64;
}

/// Real clock backed by [`SystemTime`] and [`Instant`].
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn wall_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }

    fn monotonic_micros(&self) -> i64 {
        self.origin.elapsed().as_micros() as i64
    }
}

/// Hand-driven clock for deterministic tests and replays.
///
/// Both readings only move when [`ManualClock::advance_millis`] is called.
///
/// ```
/// use telemetry_logger::clock::{Clock, ManualClock};
///
/// let clock = ManualClock::new(1_000);
/// clock.advance_millis(250);
/// assert_eq!(clock.wall_millis(), 1_250);
/// assert_eq!(clock.monotonic_micros(), 250_000);
/// ```
#[derive(Debug, Default)]
pub struct ManualClock {
    wall_ms: AtomicI64,
    elapsed_us: AtomicI64,
}

impl ManualClock {
    pub fn new(start_wall_ms: i64) -> Self {
        Self {
            wall_ms: AtomicI64::new(start_wall_ms),
            elapsed_us: AtomicI64::new(0),
        }
    }

    pub fn advance_millis(&self, ms: i64) {
        self.wall_ms.fetch_add(ms, Ordering::SeqCst);
        self.elapsed_us.fetch_add(ms * 1000, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn wall_millis(&self) -> i64 {
        self.wall_ms.load(Ordering::SeqCst)
    }

    fn monotonic_micros(&self) -> i64 {
        self.elapsed_us.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_monotonic_starts_near_zero() {
        let clock = SystemClock::new();
        let first = clock.monotonic_micros();
        assert!(first >= 0);
        assert!(first < 1_000_000, "fresh clock should read under one second");
        assert!(clock.monotonic_micros() >= first);
    }

    #[test]
    fn test_system_clock_wall_time_is_after_2020() {
        // 2020-01-01T00:00:00Z
        assert!(SystemClock::new().wall_millis() > 1_577_836_800_000);
    }

    #[test]
    fn test_manual_clock_only_moves_when_advanced() {
        let clock = ManualClock::new(5_000);
        assert_eq!(clock.wall_millis(), 5_000);
        assert_eq!(clock.monotonic_micros(), 0);

        clock.advance_millis(1_500);
        assert_eq!(clock.wall_millis(), 6_500);
        assert_eq!(clock.monotonic_micros(), 1_500_000);
    }
}
