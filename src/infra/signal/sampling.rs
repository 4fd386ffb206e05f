//! Polling pressure source built on an available-memory probe.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::core::{PressureLevel, PressureSource, ReadingCallback, SignalError, Spawn};

/// Available-memory thresholds, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryThresholds {
    /// Below this, pressure is at least warning.
    pub warning_below: u64,
    /// Below this, pressure is critical.
    pub critical_below: u64,
}

impl MemoryThresholds {
    /// Classify an available-memory reading.
    #[must_use]
    pub const fn classify(&self, available_bytes: u64) -> PressureLevel {
        if available_bytes < self.critical_below {
            PressureLevel::Critical
        } else if available_bytes < self.warning_below {
            PressureLevel::Warning
        } else {
            PressureLevel::Normal
        }
    }
}

impl Default for MemoryThresholds {
    fn default() -> Self {
        const MIB: u64 = 1024 * 1024;
        Self {
            warning_below: 200 * MIB,
            critical_below: 80 * MIB,
        }
    }
}

type Probe = Box<dyn Fn() -> Result<u64, SignalError> + Send + Sync>;

struct SamplerInner {
    probe: Probe,
    thresholds: MemoryThresholds,
    subscribers: RwLock<Vec<ReadingCallback>>,
    last: Mutex<Option<PressureLevel>>,
}

/// Periodically samples a probe and pushes classified levels.
///
/// Only changes are pushed; a failed probe is pushed as an error reading.
/// The sampling loop ends when the last handle is dropped.
#[derive(Clone)]
pub struct SamplingSource {
    inner: Arc<SamplerInner>,
}

impl SamplingSource {
    /// Create a source around `probe`, which returns available bytes.
    pub fn new<F>(thresholds: MemoryThresholds, probe: F) -> Self
    where
        F: Fn() -> Result<u64, SignalError> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(SamplerInner {
                probe: Box::new(probe),
                thresholds,
                subscribers: RwLock::new(Vec::new()),
                last: Mutex::new(None),
            }),
        }
    }

    /// Take one sample now. Returns the classified level, if the probe
    /// succeeded.
    pub fn sample(&self) -> Option<PressureLevel> {
        self.inner.sample()
    }

    /// Spawn the sampling loop on `spawner`.
    pub fn start<S: Spawn>(&self, spawner: &S, every: Duration) {
        let weak: Weak<SamplerInner> = Arc::downgrade(&self.inner);
        spawner.spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else { break };
                inner.sample();
            }
            debug!("pressure sampler stopped");
        });
    }
}

impl SamplerInner {
    fn sample(&self) -> Option<PressureLevel> {
        let reading = (self.probe)().map(|available| self.thresholds.classify(available));
        match &reading {
            Ok(level) => {
                let mut last = self.last.lock();
                if *last == Some(*level) {
                    return Some(*level);
                }
                *last = Some(*level);
            }
            Err(e) => warn!(error = %e, "pressure probe failed"),
        }
        for callback in self.subscribers.read().iter() {
            callback(reading.clone());
        }
        reading.ok()
    }
}

impl PressureSource for SamplingSource {
    fn subscribe(&self, on_reading: ReadingCallback) {
        self.inner.subscribers.write().push(on_reading);
    }
}
