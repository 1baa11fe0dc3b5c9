//! # Live Telemetry Bus Module
//!
//! Interface to an external publish/subscribe key-value service used for
//! live dashboards, plus the pieces that talk to it.
//!
//! This module handles:
//! - The [`LiveBus`] sink/poll interface and an in-memory implementation
//! - Periodic health publication ([`health`])
//! - Polling bus paths back into the pipeline ([`poller`])

pub mod health;
pub mod poller;

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::error::Result;
use crate::telemetry::Payload;

pub use health::HealthPublisher;
pub use poller::LiveBusPoller;

/// Key-value publish/subscribe bus.
#[cfg_attr(test, mockall::automock)]
pub trait LiveBus: Send + Sync {
    /// Set the value at `path`.
    fn publish(&self, path: &str, value: &Payload) -> Result<()>;

    /// Latest value at `path`, if any.
    fn get(&self, path: &str) -> Option<Payload>;
}

/// [`LiveBus`] that keeps the latest value per path in memory.
///
/// ```
/// use telemetry_logger::live::{LiveBus, MemoryBus};
/// use telemetry_logger::telemetry::Payload;
///
/// let bus = MemoryBus::new();
/// bus.publish("pi/heartbeat", &Payload::Integer(3)).unwrap();
/// assert_eq!(bus.get("pi/heartbeat"), Some(Payload::Integer(3)));
/// assert_eq!(bus.get("pi/missing"), None);
/// ```
#[derive(Debug, Default)]
pub struct MemoryBus {
    values: RwLock<HashMap<String, Payload>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sorted list of every path that has a value.
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.values.read().keys().cloned().collect();
        paths.sort();
        paths
    }

    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}

impl LiveBus for MemoryBus {
    fn publish(&self, path: &str, value: &Payload) -> Result<()> {
        self.values.write().insert(path.to_string(), value.clone());
        Ok(())
    }

    fn get(&self, path: &str) -> Option<Payload> {
        self.values.read().get(path).cloned()
    }
}
