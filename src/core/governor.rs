//! Composition root owning one pool, one cache, and one monitor.

use std::sync::Arc;

use tracing::info;

use crate::config::GovernanceConfig;
use crate::core::{
    AdmissionPool, Feature, GovernanceError, PressureLevel, PressureMonitor, PressureSource,
    ResultCache, Spawn,
};
use crate::infra::query::RowLimitGuard;
use crate::runtime::TokioSpawner;
use crate::util::clock::{Clock, SystemClock};

/// The governance layer for one application instance.
///
/// Constructed once by the host and passed to business code; there is no
/// process-global state. The cache is registered as a pressure responder and
/// the pool reads the monitor's gates.
pub struct Governor<S = TokioSpawner>
where
    S: Spawn + Clone + Send + Sync + 'static,
{
    config: GovernanceConfig,
    pool: AdmissionPool<S>,
    cache: ResultCache,
    monitor: PressureMonitor<S>,
}

impl<S> Governor<S>
where
    S: Spawn + Clone + Send + Sync + 'static,
{
    /// Wire components from `config` using the system clock.
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError::InvalidConfig`] when validation fails.
    pub fn new(config: GovernanceConfig, spawner: S) -> Result<Self, GovernanceError> {
        Self::with_clock(config, spawner, Arc::new(SystemClock))
    }

    /// Wire components from `config`, measuring cache freshness with `clock`.
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError::InvalidConfig`] when validation fails.
    pub fn with_clock(
        config: GovernanceConfig,
        spawner: S,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, GovernanceError> {
        config.validate().map_err(GovernanceError::InvalidConfig)?;

        let monitor = PressureMonitor::new(config.pressure.clone(), spawner.clone());
        let cache = ResultCache::with_clock(config.cache.clone(), clock);
        if let Some(limit) = config.cache.default_row_limit {
            cache.set_transform(Arc::new(RowLimitGuard::new(limit)));
        }
        monitor.register(Arc::new(cache.clone()));
        let pool = AdmissionPool::with_gates(config.pool.clone(), spawner, monitor.gates())?;

        info!(
            max_concurrent = config.pool.max_concurrent,
            row_limit = ?config.cache.default_row_limit,
            "governor assembled"
        );
        Ok(Self {
            config,
            pool,
            cache,
            monitor,
        })
    }

    /// Start the pool's congestion heartbeat.
    pub fn start(&self) {
        self.pool.start_heartbeat();
    }

    /// Route readings from `source` into the monitor.
    pub fn bind_source(&self, source: &dyn PressureSource) {
        self.monitor.bind(source);
    }

    /// Admission pool.
    #[must_use]
    pub const fn pool(&self) -> &AdmissionPool<S> {
        &self.pool
    }

    /// Result cache.
    #[must_use]
    pub const fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Pressure monitor.
    #[must_use]
    pub const fn monitor(&self) -> &PressureMonitor<S> {
        &self.monitor
    }

    /// Configuration the governor was built from.
    #[must_use]
    pub const fn config(&self) -> &GovernanceConfig {
        &self.config
    }

    /// True when `feature` is currently disabled.
    #[must_use]
    pub fn is_gated(&self, feature: Feature) -> bool {
        self.monitor.is_gated(feature)
    }

    /// Current pressure level.
    #[must_use]
    pub fn current_level(&self) -> PressureLevel {
        self.monitor.current_level()
    }

    /// Stop admitting work and cancel everything pending.
    pub fn shutdown(&self) {
        self.pool.shutdown();
    }
}
