//! Configuration models for the pool, cache, and pressure monitor.

pub mod governance;

pub use governance::{CacheConfig, GovernanceConfig, PoolConfig, PressureConfig};
