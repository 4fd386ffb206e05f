//! Integration tests for PressureMonitor
//!
//! Recovery is debounced on the tokio timer, so these tests run on a paused
//! runtime clock.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ops_governor::config::PressureConfig;
use ops_governor::core::{
    responder_fn, Feature, PressureEvent, PressureLevel, PressureMonitor, PressureResponder,
    SignalError,
};
use ops_governor::infra::{ManualPressureSource, MemoryThresholds, SamplingSource};
use ops_governor::runtime::TokioSpawner;

const MIB: u64 = 1024 * 1024;

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn monitor() -> PressureMonitor {
    PressureMonitor::new(PressureConfig::default(), TokioSpawner::current())
}

fn counting_responder(name: &str) -> (Arc<dyn PressureResponder>, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let responder = responder_fn(name, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    (responder, calls)
}

async fn advance(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

// ============================================================================
// DEGRADE
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_warning_gates_optional_features() {
    let monitor = monitor();
    let (responder, calls) = counting_responder("light");
    monitor.register(responder);

    assert_eq!(monitor.set_level(PressureLevel::Warning), PressureLevel::Warning);

    assert!(monitor.is_gated(Feature::BackgroundWork));
    assert!(monitor.is_gated(Feature::ImageLoading));
    assert!(monitor.is_gated(Feature::NetworkRequests));
    assert!(!monitor.is_gated(Feature::HeavyComputation));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(monitor.stats().light_cleanups, 1);
}

#[tokio::test(start_paused = true)]
async fn test_critical_runs_cleanup_once() {
    let monitor = monitor();
    let (responder, calls) = counting_responder("emergency");
    monitor.register(responder);

    for _ in 0..3 {
        monitor.set_level(PressureLevel::Critical);
    }

    assert!(Feature::ALL.iter().all(|&f| monitor.is_gated(f)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let stats = monitor.stats();
    assert_eq!(stats.emergency_cleanups, 1);
    assert_eq!(stats.transitions, 1);
    assert_eq!(monitor.generation(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_warning_after_critical_keeps_heavy_computation_gated() {
    let monitor = monitor();
    monitor.set_level(PressureLevel::Critical);
    monitor.set_level(PressureLevel::Warning);

    assert!(monitor.is_gated(Feature::HeavyComputation));
    assert_eq!(monitor.current_level(), PressureLevel::Warning);
}

#[tokio::test(start_paused = true)]
async fn test_failed_reading_keeps_level() {
    let monitor = monitor();
    monitor.set_level(PressureLevel::Warning);

    let level = monitor.record_reading(Err(SignalError::Unavailable("probe".into())));

    assert_eq!(level, PressureLevel::Warning);
    assert_eq!(monitor.current_level(), PressureLevel::Warning);
    assert_eq!(monitor.generation(), 1);
    assert_eq!(monitor.stats().failed_readings, 1);
}

// ============================================================================
// RECOVERY
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_recovery_is_debounced() {
    let monitor = monitor();
    monitor.set_level(PressureLevel::Critical);
    monitor.set_level(PressureLevel::Normal);

    assert_eq!(monitor.current_level(), PressureLevel::Normal);
    assert!(monitor.is_gated(Feature::BackgroundWork));

    advance(1_900).await;
    assert!(monitor.is_gated(Feature::BackgroundWork));

    advance(200).await;
    assert!(Feature::ALL.iter().all(|&f| !monitor.is_gated(f)));
    assert_eq!(monitor.stats().recoveries, 1);
}

#[tokio::test(start_paused = true)]
async fn test_newer_reading_cancels_pending_recovery() {
    let monitor = monitor();
    monitor.set_level(PressureLevel::Critical);
    monitor.set_level(PressureLevel::Normal);

    advance(1_000).await;
    monitor.set_level(PressureLevel::Warning);
    advance(1_500).await;
    assert!(monitor.is_gated(Feature::BackgroundWork));
    assert_eq!(monitor.stats().recoveries, 0);

    monitor.set_level(PressureLevel::Normal);
    advance(2_100).await;
    assert!(!monitor.is_gated(Feature::BackgroundWork));
    assert_eq!(monitor.stats().recoveries, 1);
}

#[tokio::test(start_paused = true)]
async fn test_zero_delay_recovers_immediately() {
    let monitor = PressureMonitor::new(
        PressureConfig {
            recovery_delay_ms: 0,
            ..PressureConfig::default()
        },
        TokioSpawner::current(),
    );
    monitor.set_level(PressureLevel::Critical);
    monitor.set_level(PressureLevel::Normal);

    assert!(!monitor.is_gated(Feature::NetworkRequests));
}

// ============================================================================
// RESPONDERS AND EVENTS
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_responder_failures_are_contained() {
    let monitor = monitor();
    monitor.register(responder_fn("failing", |_| anyhow::bail!("cannot drop tiles")));
    monitor.register(responder_fn("panicking", |level| {
        if level == PressureLevel::Critical {
            panic!("responder exploded");
        }
        Ok(())
    }));
    let (responder, calls) = counting_responder("healthy");
    monitor.register(responder);

    assert_eq!(
        monitor.set_level(PressureLevel::Critical),
        PressureLevel::Critical
    );

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(monitor.stats().responder_failures, 2);
    assert!(monitor.is_gated(Feature::HeavyComputation));

    // The monitor stays usable after a panicking responder.
    monitor.set_level(PressureLevel::Warning);
    assert_eq!(monitor.current_level(), PressureLevel::Warning);
}

#[tokio::test(start_paused = true)]
async fn test_events_are_broadcast() {
    let monitor = monitor();
    let mut events = monitor.subscribe();

    monitor.set_level(PressureLevel::Warning);
    monitor.set_level(PressureLevel::Normal);
    advance(2_100).await;

    assert_eq!(
        events.try_recv().unwrap(),
        PressureEvent::LevelChanged {
            from: PressureLevel::Normal,
            to: PressureLevel::Warning,
            generation: 1,
        }
    );
    assert_eq!(
        events.try_recv().unwrap(),
        PressureEvent::LevelChanged {
            from: PressureLevel::Warning,
            to: PressureLevel::Normal,
            generation: 2,
        }
    );
    assert_eq!(
        events.try_recv().unwrap(),
        PressureEvent::GatesRestored { generation: 2 }
    );
    assert!(events.try_recv().is_err());
}

// ============================================================================
// SOURCES
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_manual_source_drives_monitor() {
    let monitor = monitor();
    let source = ManualPressureSource::new();
    monitor.bind(&source);

    source.emit(PressureLevel::Critical);
    assert_eq!(monitor.current_level(), PressureLevel::Critical);

    source.fail(SignalError::Disconnected);
    assert_eq!(monitor.current_level(), PressureLevel::Critical);
    assert_eq!(monitor.stats().failed_readings, 1);

    drop(monitor);
    source.emit(PressureLevel::Normal);
}

#[tokio::test(start_paused = true)]
async fn test_sampling_source_drives_monitor() {
    let monitor = monitor();
    let available = Arc::new(AtomicU64::new(1_024 * MIB));
    let probe = Arc::clone(&available);
    let source = SamplingSource::new(MemoryThresholds::default(), move || {
        Ok(probe.load(Ordering::SeqCst))
    });
    monitor.bind(&source);
    source.start(&TokioSpawner::current(), Duration::from_secs(1));

    advance(100).await;
    assert_eq!(monitor.current_level(), PressureLevel::Normal);

    available.store(150 * MIB, Ordering::SeqCst);
    advance(1_000).await;
    assert_eq!(monitor.current_level(), PressureLevel::Warning);

    available.store(20 * MIB, Ordering::SeqCst);
    advance(1_000).await;
    assert_eq!(monitor.current_level(), PressureLevel::Critical);
    assert_eq!(monitor.stats().transitions, 2);
}
