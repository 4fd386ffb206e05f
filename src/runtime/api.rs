//! Serializable status views for dashboards and diagnostics.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::core::{
    CacheStats, Feature, Governor, MonitorStats, PoolStats, PressureLevel, Spawn,
};
use crate::util::clock::now_ms;

/// Point-in-time view of the whole governance layer.
#[derive(Debug, Clone, Serialize)]
pub struct GovernanceSnapshot {
    /// Current pressure level.
    pub level: PressureLevel,
    /// Gate state per feature (`true` = gated).
    pub gates: BTreeMap<Feature, bool>,
    /// Pool counters.
    pub pool: PoolStats,
    /// Cache counters.
    pub cache: CacheStats,
    /// Monitor counters.
    pub pressure: MonitorStats,
    /// Capture time, milliseconds since the Unix epoch.
    pub captured_at_ms: u128,
}

/// Health response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Health {
    /// False while pressure is critical.
    pub ok: bool,
    /// Current pressure level.
    pub level: PressureLevel,
}

/// Capture a snapshot of `governor`.
pub fn snapshot<S>(governor: &Governor<S>) -> GovernanceSnapshot
where
    S: Spawn + Clone + Send + Sync + 'static,
{
    let monitor = governor.monitor();
    GovernanceSnapshot {
        level: monitor.current_level(),
        gates: monitor.gates().snapshot(),
        pool: governor.pool().stats(),
        cache: governor.cache().stats(),
        pressure: monitor.stats(),
        captured_at_ms: now_ms(),
    }
}

/// Return a health payload.
pub fn health<S>(governor: &Governor<S>) -> Health
where
    S: Spawn + Clone + Send + Sync + 'static,
{
    let level = governor.current_level();
    Health {
        ok: level != PressureLevel::Critical,
        level,
    }
}
