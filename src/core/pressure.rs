//! Resource-pressure circuit breaker.
//!
//! The monitor reacts to pushed pressure readings and drives a three-level
//! state machine:
//!
//! - **Critical**: every feature gate closes and registered responders run an
//!   emergency cleanup (the result cache flushes completely).
//! - **Warning**: background work, image loading, and network requests are
//!   gated; heavy computation keeps its previous state. Responders run a
//!   lighter, age-based cleanup.
//! - **Normal**: gates reopen only after the recovery delay elapses without
//!   another transition, so noisy readings near a threshold do not flap.
//!
//! Cleanups run exactly once per entry into a level; repeated readings at the
//! current level are ignored. Each transition bumps a generation counter and a
//! pending recovery only applies if its generation is still current.

use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, error, info, trace, warn};

use crate::config::PressureConfig;
use crate::core::{SignalError, Spawn};
use crate::runtime::TokioSpawner;

/// Coarse resource-pressure level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum PressureLevel {
    /// Resources are healthy.
    #[default]
    Normal = 0,
    /// Resources are getting tight; optional work is shed.
    Warning = 1,
    /// Resources are nearly exhausted; everything optional stops.
    Critical = 2,
}

impl PressureLevel {
    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Normal,
            1 => Self::Warning,
            _ => Self::Critical,
        }
    }

    /// Short label used in logs and snapshots.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for PressureLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named capability that can be switched off under pressure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    /// Deferrable background refreshes and normal-priority pool work.
    BackgroundWork,
    /// Decoding and displaying images.
    ImageLoading,
    /// Non-essential network traffic.
    NetworkRequests,
    /// CPU-heavy computation such as route planning or photo processing.
    HeavyComputation,
}

impl Feature {
    /// Every feature, in gate-table order.
    pub const ALL: [Self; 4] = [
        Self::BackgroundWork,
        Self::ImageLoading,
        Self::NetworkRequests,
        Self::HeavyComputation,
    ];

    /// Features closed on entering [`PressureLevel::Warning`].
    pub const WARNING_GATED: [Self; 3] = [
        Self::BackgroundWork,
        Self::ImageLoading,
        Self::NetworkRequests,
    ];

    const fn index(self) -> usize {
        match self {
            Self::BackgroundWork => 0,
            Self::ImageLoading => 1,
            Self::NetworkRequests => 2,
            Self::HeavyComputation => 3,
        }
    }

    /// Short label used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BackgroundWork => "background_work",
            Self::ImageLoading => "image_loading",
            Self::NetworkRequests => "network_requests",
            Self::HeavyComputation => "heavy_computation",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lock-free table of feature gates.
///
/// Only the monitor changes gates; everyone else reads a snapshot.
#[derive(Debug)]
pub struct GateSet {
    closed: [AtomicBool; 4],
}

impl GateSet {
    /// All gates open.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            closed: [
                AtomicBool::new(false),
                AtomicBool::new(false),
                AtomicBool::new(false),
                AtomicBool::new(false),
            ],
        }
    }

    /// True when `feature` is currently disabled.
    #[must_use]
    pub fn is_gated(&self, feature: Feature) -> bool {
        self.closed[feature.index()].load(Ordering::Acquire)
    }

    /// Inverse of [`GateSet::is_gated`].
    #[must_use]
    pub fn is_allowed(&self, feature: Feature) -> bool {
        !self.is_gated(feature)
    }

    /// Gate state per feature (`true` = gated).
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<Feature, bool> {
        Feature::ALL
            .iter()
            .map(|&feature| (feature, self.is_gated(feature)))
            .collect()
    }

    fn close(&self, features: &[Feature]) {
        for feature in features {
            self.closed[feature.index()].store(true, Ordering::Release);
        }
    }

    fn open_all(&self) {
        for gate in &self.closed {
            gate.store(false, Ordering::Release);
        }
    }
}

impl Default for GateSet {
    fn default() -> Self {
        Self::new()
    }
}

/// Broadcast to subscribers of [`PressureMonitor::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PressureEvent {
    /// The level changed.
    LevelChanged {
        /// Level before the reading.
        from: PressureLevel,
        /// Level after the reading.
        to: PressureLevel,
        /// Generation assigned to this transition.
        generation: u64,
    },
    /// Gates reopened after a debounced recovery.
    GatesRestored {
        /// Generation of the transition to normal that was confirmed.
        generation: u64,
    },
}

/// Cleanup hook run when the monitor enters warning or critical.
///
/// Responders run inside the monitor's transition and must not feed readings
/// back into the same monitor.
pub trait PressureResponder: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// React to entering `level` (`Warning` or `Critical`).
    ///
    /// # Errors
    ///
    /// Failures are logged by the monitor and never propagated.
    fn respond(&self, level: PressureLevel) -> anyhow::Result<()>;
}

/// Closure-backed responder, see [`responder_fn`].
pub struct FnResponder<F> {
    name: String,
    f: F,
}

impl<F> PressureResponder for FnResponder<F>
where
    F: Fn(PressureLevel) -> anyhow::Result<()> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn respond(&self, level: PressureLevel) -> anyhow::Result<()> {
        (self.f)(level)
    }
}

/// Wrap a closure as a responder, e.g. to drop an ephemeral cache.
pub fn responder_fn<F>(name: impl Into<String>, f: F) -> Arc<dyn PressureResponder>
where
    F: Fn(PressureLevel) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(FnResponder {
        name: name.into(),
        f,
    })
}

/// Callback handed to a [`PressureSource`].
pub type ReadingCallback = Box<dyn Fn(Result<PressureLevel, SignalError>) + Send + Sync>;

/// Host-provided, push-based pressure signal.
pub trait PressureSource {
    /// Register a callback invoked for every reading.
    fn subscribe(&self, on_reading: ReadingCallback);
}

/// Counters describing the monitor's history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MonitorStats {
    /// Level changes applied.
    pub transitions: u64,
    /// Entries into critical.
    pub emergency_cleanups: u64,
    /// Entries into warning.
    pub light_cleanups: u64,
    /// Debounced recoveries that reopened the gates.
    pub recoveries: u64,
    /// Readings that failed and were ignored.
    pub failed_readings: u64,
    /// Responder invocations that errored or panicked.
    pub responder_failures: u64,
}

struct MonitorState {
    level: PressureLevel,
    generation: u64,
    stats: MonitorStats,
}

struct MonitorInner<S> {
    config: PressureConfig,
    level: AtomicU8,
    gates: Arc<GateSet>,
    state: Mutex<MonitorState>,
    responders: RwLock<Vec<Arc<dyn PressureResponder>>>,
    events: broadcast::Sender<PressureEvent>,
    spawner: S,
}

/// Shared degrade/recover state machine. Cloning yields another handle to
/// the same monitor.
pub struct PressureMonitor<S = TokioSpawner> {
    inner: Arc<MonitorInner<S>>,
}

impl<S> Clone for PressureMonitor<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S> PressureMonitor<S> {
    /// Current level (lock-free read).
    #[must_use]
    pub fn current_level(&self) -> PressureLevel {
        PressureLevel::from_u8(self.inner.level.load(Ordering::Acquire))
    }

    /// True when `feature` is currently disabled.
    #[must_use]
    pub fn is_gated(&self, feature: Feature) -> bool {
        self.inner.gates.is_gated(feature)
    }

    /// Shared gate table, for components that consult gates on hot paths.
    #[must_use]
    pub fn gates(&self) -> Arc<GateSet> {
        Arc::clone(&self.inner.gates)
    }

    /// Receive level changes and recoveries.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PressureEvent> {
        self.inner.events.subscribe()
    }

    /// Add a cleanup responder.
    pub fn register(&self, responder: Arc<dyn PressureResponder>) {
        debug!(responder = responder.name(), "pressure responder registered");
        self.inner.responders.write().push(responder);
    }

    /// Generation of the most recent transition.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.inner.state.lock().generation
    }

    /// History counters.
    #[must_use]
    pub fn stats(&self) -> MonitorStats {
        self.inner.state.lock().stats
    }
}

impl<S> PressureMonitor<S>
where
    S: Spawn + Send + Sync + 'static,
{
    /// Create a monitor at [`PressureLevel::Normal`] with all gates open.
    pub fn new(config: PressureConfig, spawner: S) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            inner: Arc::new(MonitorInner {
                config,
                level: AtomicU8::new(PressureLevel::Normal as u8),
                gates: Arc::new(GateSet::new()),
                state: Mutex::new(MonitorState {
                    level: PressureLevel::Normal,
                    generation: 0,
                    stats: MonitorStats::default(),
                }),
                responders: RwLock::new(Vec::new()),
                events,
                spawner,
            }),
        }
    }

    /// Feed readings from `source` into this monitor.
    ///
    /// The source holds only a weak reference; readings arriving after the
    /// monitor is dropped are ignored.
    pub fn bind(&self, source: &dyn PressureSource) {
        let weak: Weak<MonitorInner<S>> = Arc::downgrade(&self.inner);
        source.subscribe(Box::new(move |reading| {
            if let Some(inner) = weak.upgrade() {
                PressureMonitor { inner }.record_reading(reading);
            }
        }));
    }

    /// Apply a known level. Shorthand for `record_reading(Ok(level))`.
    pub fn set_level(&self, level: PressureLevel) -> PressureLevel {
        self.record_reading(Ok(level))
    }

    /// Apply one reading and return the resulting level.
    ///
    /// A failed reading leaves the last known level in place.
    pub fn record_reading(&self, reading: Result<PressureLevel, SignalError>) -> PressureLevel {
        let mut state = self.inner.state.lock();
        let level = match reading {
            Ok(level) => level,
            Err(e) => {
                state.stats.failed_readings += 1;
                warn!(error = %e, level = %state.level, "pressure reading failed, keeping last level");
                return state.level;
            }
        };

        if level == state.level {
            trace!(%level, "pressure reading unchanged");
            return level;
        }

        let from = state.level;
        state.level = level;
        state.generation += 1;
        state.stats.transitions += 1;
        let generation = state.generation;
        self.inner.level.store(level as u8, Ordering::Release);
        info!(%from, to = %level, generation, "pressure level changed");

        match level {
            PressureLevel::Critical => {
                self.inner.gates.close(&Feature::ALL);
                state.stats.emergency_cleanups += 1;
                self.run_responders(level, &mut state.stats);
            }
            PressureLevel::Warning => {
                self.inner.gates.close(&Feature::WARNING_GATED);
                state.stats.light_cleanups += 1;
                self.run_responders(level, &mut state.stats);
            }
            PressureLevel::Normal => {}
        }

        let _ = self.inner.events.send(PressureEvent::LevelChanged {
            from,
            to: level,
            generation,
        });

        if level == PressureLevel::Normal {
            self.schedule_recovery(&mut state, generation);
        }
        level
    }

    fn schedule_recovery(&self, state: &mut MonitorState, generation: u64) {
        let delay = self.inner.config.recovery_delay();
        if delay.is_zero() {
            self.inner.restore(state, generation);
            return;
        }
        debug!(generation, ?delay, "gate recovery scheduled");
        let weak = Arc::downgrade(&self.inner);
        self.inner.spawner.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                let mut state = inner.state.lock();
                inner.restore(&mut state, generation);
            }
        });
    }

    fn run_responders(&self, level: PressureLevel, stats: &mut MonitorStats) {
        let responders = self.inner.responders.read().clone();
        for responder in responders {
            match panic::catch_unwind(AssertUnwindSafe(|| responder.respond(level))) {
                Ok(Ok(())) => debug!(responder = responder.name(), %level, "pressure cleanup ran"),
                Ok(Err(e)) => {
                    stats.responder_failures += 1;
                    warn!(responder = responder.name(), %level, error = %e, "pressure cleanup failed");
                }
                Err(_) => {
                    stats.responder_failures += 1;
                    error!(responder = responder.name(), %level, "pressure cleanup panicked");
                }
            }
        }
    }
}

impl<S> MonitorInner<S> {
    fn restore(&self, state: &mut MonitorState, generation: u64) {
        if state.generation != generation || state.level != PressureLevel::Normal {
            debug!(generation, current = state.generation, "gate recovery superseded");
            return;
        }
        self.gates.open_all();
        state.stats.recoveries += 1;
        info!(generation, "feature gates restored");
        let _ = self.events.send(PressureEvent::GatesRestored { generation });
    }
}
