//! Tests for utility functions

use std::time::Duration;

use ops_governor::util::{now_ms, Clock, ManualClock, Priority, TaskId};

#[test]
fn test_priority_default_is_normal() {
    assert_eq!(Priority::default(), Priority::Normal);
}

#[test]
fn test_priority_serde() {
    assert_eq!(serde_json::to_string(&Priority::High).unwrap(), "\"high\"");
    let parsed: Priority = serde_json::from_str("\"normal\"").unwrap();
    assert_eq!(parsed, Priority::Normal);
    assert_eq!(format!("{}", Priority::High), "high");
}

#[test]
fn test_manual_clock_advances_shared_handles() {
    let clock = ManualClock::new();
    let other = clock.clone();
    let start = clock.now();

    other.advance(Duration::from_secs(3));

    assert_eq!(clock.now() - start, Duration::from_secs(3));
    assert_eq!(clock.elapsed(), Duration::from_secs(3));
}

#[test]
fn test_now_ms_is_after_2020() {
    assert!(now_ms() > 1_577_836_800_000);
}

#[test]
fn test_task_id() {
    let id: TaskId = 12345;
    assert_eq!(id, 12345);
}

#[test]
fn test_init_tracing_is_idempotent() {
    ops_governor::util::init_tracing_with("ops_governor=debug");
    ops_governor::util::init_tracing();
    tracing::info!(component = "util_test", "tracing initialized");
}
