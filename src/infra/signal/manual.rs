//! Push-driven pressure source.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::core::{PressureLevel, PressureSource, ReadingCallback, SignalError};

/// Source the host (or a test) drives by hand, e.g. from an OS
/// memory-warning notification.
#[derive(Clone, Default)]
pub struct ManualPressureSource {
    subscribers: Arc<RwLock<Vec<ReadingCallback>>>,
}

impl ManualPressureSource {
    /// Create a source with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a level to every subscriber.
    pub fn emit(&self, level: PressureLevel) {
        self.deliver(&Ok(level));
    }

    /// Deliver a failed reading to every subscriber.
    pub fn fail(&self, error: SignalError) {
        self.deliver(&Err(error));
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    fn deliver(&self, reading: &Result<PressureLevel, SignalError>) {
        for callback in self.subscribers.read().iter() {
            callback(reading.clone());
        }
    }
}

impl PressureSource for ManualPressureSource {
    fn subscribe(&self, on_reading: ReadingCallback) {
        self.subscribers.write().push(on_reading);
    }
}
