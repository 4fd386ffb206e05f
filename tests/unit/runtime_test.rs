//! Tests for tokio spawner utilities and the status surface

use ops_governor::builders::GovernorBuilder;
use ops_governor::core::{PressureLevel, Spawn};
use ops_governor::runtime::tokio_spawner::TokioSpawner;
use ops_governor::runtime::{health, snapshot};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tokio_spawner_spawn() {
    let spawner = TokioSpawner::new(tokio::runtime::Handle::current());

    let (tx, rx) = tokio::sync::oneshot::channel();
    spawner.spawn(async move {
        tx.send(123).unwrap();
    });

    let result = rx.await.expect("oneshot result");
    assert_eq!(result, 123);
}

#[tokio::test]
async fn test_health_tracks_critical_level() {
    let governor = GovernorBuilder::current()
        .start_heartbeat(false)
        .build()
        .unwrap();
    assert!(health(&governor).ok);

    governor.monitor().set_level(PressureLevel::Warning);
    assert!(health(&governor).ok);

    governor.monitor().set_level(PressureLevel::Critical);
    let status = health(&governor);
    assert!(!status.ok);
    assert_eq!(status.level, PressureLevel::Critical);
}

#[tokio::test]
async fn test_snapshot_serializes() {
    let governor = GovernorBuilder::current()
        .start_heartbeat(false)
        .build()
        .unwrap();
    governor.monitor().set_level(PressureLevel::Warning);

    let value = serde_json::to_value(snapshot(&governor)).unwrap();

    assert_eq!(value["level"], "warning");
    assert_eq!(value["gates"]["background_work"], true);
    assert_eq!(value["gates"]["heavy_computation"], false);
    assert_eq!(value["pool"]["active"], 0);
    assert_eq!(value["cache"]["entries"], 0);
    assert_eq!(value["pressure"]["light_cleanups"], 1);
    assert!(value["captured_at_ms"].as_u64().unwrap() > 0);
}
