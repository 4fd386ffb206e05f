//! Governance configuration structures.
//!
//! Durations are carried as milliseconds so the JSON form stays flat. Every
//! section implements `Default` with the tuning values the layer ships with;
//! the shedding threshold and keep-count are tuning knobs, not contracts.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Admission pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum number of work items running at once.
    pub max_concurrent: usize,
    /// Congestion heartbeat period in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Pending depth above which a saturated pool sheds work.
    pub shed_threshold: usize,
    /// Pending entries kept after shedding.
    pub shed_keep: usize,
    /// Reject normal-priority submissions while background work is gated.
    pub gate_normal_priority: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 8,
            heartbeat_interval_ms: 5_000,
            shed_threshold: 20,
            shed_keep: 10,
            gate_normal_priority: true,
        }
    }
}

impl PoolConfig {
    /// Heartbeat period.
    #[must_use]
    pub const fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Validate pool configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrent == 0 {
            return Err("max_concurrent must be greater than 0".into());
        }
        if self.heartbeat_interval_ms == 0 {
            return Err("heartbeat_interval_ms must be greater than 0".into());
        }
        if self.shed_keep > self.shed_threshold {
            return Err(format!(
                "shed_keep ({}) must not exceed shed_threshold ({})",
                self.shed_keep, self.shed_threshold
            ));
        }
        Ok(())
    }
}

/// Result cache configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Freshness window used when a call does not pass one.
    pub default_ttl_ms: u64,
    /// Entries at least this old are evicted when pressure reaches warning.
    pub warning_max_age_ms: u64,
    /// Row limit injected into unbounded query descriptions; `None` disables it.
    pub default_row_limit: Option<u32>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_ms: 300_000,
            warning_max_age_ms: 60_000,
            default_row_limit: Some(500),
        }
    }
}

impl CacheConfig {
    /// Default freshness window.
    #[must_use]
    pub const fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }

    /// Age threshold for warning-level eviction.
    #[must_use]
    pub const fn warning_max_age(&self) -> Duration {
        Duration::from_millis(self.warning_max_age_ms)
    }

    /// Validate cache configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.default_ttl_ms == 0 {
            return Err("default_ttl_ms must be greater than 0".into());
        }
        if self.default_row_limit == Some(0) {
            return Err("default_row_limit must be greater than 0 when set".into());
        }
        Ok(())
    }
}

/// Pressure monitor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PressureConfig {
    /// Delay before gates reopen after returning to normal.
    pub recovery_delay_ms: u64,
    /// Buffered events per subscriber before lagging subscribers skip ahead.
    pub event_capacity: usize,
}

impl Default for PressureConfig {
    fn default() -> Self {
        Self {
            recovery_delay_ms: 2_000,
            event_capacity: 64,
        }
    }
}

impl PressureConfig {
    /// Recovery debounce.
    #[must_use]
    pub const fn recovery_delay(&self) -> Duration {
        Duration::from_millis(self.recovery_delay_ms)
    }

    /// Validate monitor configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.event_capacity == 0 {
            return Err("event_capacity must be greater than 0".into());
        }
        Ok(())
    }
}

/// Root configuration for the governance layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernanceConfig {
    /// Admission pool section.
    pub pool: PoolConfig,
    /// Result cache section.
    pub cache: CacheConfig,
    /// Pressure monitor section.
    pub pressure: PressureConfig,
}

impl GovernanceConfig {
    /// Validate every section.
    ///
    /// # Errors
    ///
    /// Returns the first failure, prefixed with its section name.
    pub fn validate(&self) -> Result<(), String> {
        self.pool.validate().map_err(|e| format!("pool: {e}"))?;
        self.cache.validate().map_err(|e| format!("cache: {e}"))?;
        self.pressure
            .validate()
            .map_err(|e| format!("pressure: {e}"))?;
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns a parse or validation message.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Build configuration from defaults overridden by `GOVERNOR_*`
    /// environment variables, loading a `.env` file first if present.
    ///
    /// Recognized variables: `GOVERNOR_MAX_CONCURRENT`,
    /// `GOVERNOR_HEARTBEAT_MS`, `GOVERNOR_SHED_THRESHOLD`,
    /// `GOVERNOR_SHED_KEEP`, `GOVERNOR_CACHE_TTL_MS`,
    /// `GOVERNOR_CACHE_WARNING_AGE_MS`, `GOVERNOR_ROW_LIMIT` (`0` disables),
    /// `GOVERNOR_RECOVERY_DELAY_MS`.
    ///
    /// # Errors
    ///
    /// Returns a message naming the variable that failed to parse, or the
    /// validation failure.
    pub fn from_env() -> Result<Self, String> {
        let _ = dotenvy::dotenv();
        let mut cfg = Self::default();
        override_from_env("GOVERNOR_MAX_CONCURRENT", &mut cfg.pool.max_concurrent)?;
        override_from_env("GOVERNOR_HEARTBEAT_MS", &mut cfg.pool.heartbeat_interval_ms)?;
        override_from_env("GOVERNOR_SHED_THRESHOLD", &mut cfg.pool.shed_threshold)?;
        override_from_env("GOVERNOR_SHED_KEEP", &mut cfg.pool.shed_keep)?;
        override_from_env("GOVERNOR_CACHE_TTL_MS", &mut cfg.cache.default_ttl_ms)?;
        override_from_env(
            "GOVERNOR_CACHE_WARNING_AGE_MS",
            &mut cfg.cache.warning_max_age_ms,
        )?;
        let mut row_limit = cfg.cache.default_row_limit.unwrap_or(0);
        override_from_env("GOVERNOR_ROW_LIMIT", &mut row_limit)?;
        cfg.cache.default_row_limit = (row_limit > 0).then_some(row_limit);
        override_from_env(
            "GOVERNOR_RECOVERY_DELAY_MS",
            &mut cfg.pressure.recovery_delay_ms,
        )?;
        cfg.validate()?;
        Ok(cfg)
    }
}

fn override_from_env<T>(name: &str, slot: &mut T) -> Result<(), String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => {
            *slot = raw
                .trim()
                .parse()
                .map_err(|e| format!("{name}: cannot parse `{raw}`: {e}"))?;
            Ok(())
        }
        Err(env::VarError::NotPresent) => Ok(()),
        Err(e) => Err(format!("{name}: {e}")),
    }
}
