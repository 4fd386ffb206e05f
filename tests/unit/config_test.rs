//! Tests for configuration validation

use std::time::Duration;

use ops_governor::config::{CacheConfig, GovernanceConfig, PoolConfig, PressureConfig};

#[test]
fn test_pool_config_validation() {
    let valid = PoolConfig {
        max_concurrent: 4,
        heartbeat_interval_ms: 1_000,
        shed_threshold: 20,
        shed_keep: 10,
        gate_normal_priority: true,
    };
    assert!(valid.validate().is_ok());
}

#[test]
fn test_pool_config_invalid_max_concurrent() {
    let invalid = PoolConfig {
        max_concurrent: 0,
        ..PoolConfig::default()
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_pool_config_keep_above_threshold() {
    let invalid = PoolConfig {
        shed_threshold: 5,
        shed_keep: 6,
        ..PoolConfig::default()
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_cache_config_invalid_row_limit() {
    let invalid = CacheConfig {
        default_row_limit: Some(0),
        ..CacheConfig::default()
    };
    assert!(invalid.validate().is_err());

    let unbounded = CacheConfig {
        default_row_limit: None,
        ..CacheConfig::default()
    };
    assert!(unbounded.validate().is_ok());
}

#[test]
fn test_pressure_config_durations() {
    let cfg = PressureConfig {
        recovery_delay_ms: 250,
        ..PressureConfig::default()
    };
    assert_eq!(cfg.recovery_delay(), Duration::from_millis(250));
}

#[test]
fn test_governance_config_from_json_partial() {
    let cfg = GovernanceConfig::from_json_str(
        r#"{ "pool": { "max_concurrent": 2 }, "cache": { "default_row_limit": null } }"#,
    )
    .unwrap();
    assert_eq!(cfg.pool.max_concurrent, 2);
    assert_eq!(cfg.pool.shed_threshold, 20);
    assert_eq!(cfg.cache.default_row_limit, None);
    assert_eq!(cfg.cache.default_ttl(), Duration::from_secs(300));
}

#[test]
fn test_governance_config_from_json_rejects_invalid() {
    let err = GovernanceConfig::from_json_str(r#"{ "pool": { "max_concurrent": 0 } }"#)
        .unwrap_err();
    assert!(err.starts_with("pool:"));

    let err = GovernanceConfig::from_json_str("{ not json").unwrap_err();
    assert!(err.starts_with("parse error"));
}
