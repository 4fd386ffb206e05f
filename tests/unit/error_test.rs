//! Tests for error types

use ops_governor::core::{Feature, GovernanceError, SignalError, TaskError};

#[test]
fn test_failed_error_carries_cause() {
    let err = TaskError::Failed(anyhow::anyhow!("disk full"));
    assert_eq!(format!("{}", err), "work item failed: disk full");
    assert!(!err.never_ran());
}

#[test]
fn test_shed_error() {
    let err = TaskError::Shed;
    assert_eq!(format!("{}", err), "work item shed by congestion control");
    assert!(err.never_ran());
}

#[test]
fn test_rejected_error_names_feature() {
    let err = TaskError::Rejected(Feature::BackgroundWork);
    assert_eq!(format!("{}", err), "work item rejected: background_work is gated");
    assert!(err.never_ran());
}

#[test]
fn test_aborted_error_ran() {
    assert!(!TaskError::Aborted.never_ran());
    assert!(TaskError::Cancelled.never_ran());
    assert!(TaskError::PoolShutdown.never_ran());
}

#[test]
fn test_signal_error() {
    let err = SignalError::Unavailable("meminfo missing".to_string());
    assert_eq!(
        format!("{}", err),
        "pressure reading unavailable: meminfo missing"
    );
    assert_eq!(
        format!("{}", SignalError::Disconnected),
        "pressure source disconnected"
    );
}

#[test]
fn test_invalid_config_error() {
    let err = GovernanceError::InvalidConfig("pool: max_concurrent must be > 0".to_string());
    assert_eq!(
        format!("{}", err),
        "invalid configuration: pool: max_concurrent must be > 0"
    );
}
