//! Tests for builder modules

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ops_governor::builders::GovernorBuilder;
use ops_governor::config::GovernanceConfig;
use ops_governor::core::{responder_fn, DescriptionTransform, GovernanceError, PressureLevel};
use ops_governor::infra::ManualPressureSource;

struct Uppercase;

impl DescriptionTransform for Uppercase {
    fn transform(&self, description: &str) -> String {
        description.to_uppercase()
    }
}

#[tokio::test]
async fn test_builder_defaults() {
    let governor = GovernorBuilder::current().build().unwrap();
    assert_eq!(governor.config().pool.max_concurrent, 8);
    assert_eq!(governor.pool().max_concurrent(), 8);
    assert_eq!(governor.current_level(), PressureLevel::Normal);
    assert_eq!(
        governor.cache().describe("SELECT * FROM tasks"),
        "SELECT * FROM tasks LIMIT 500"
    );
}

#[tokio::test]
async fn test_builder_rejects_invalid_config() {
    let mut config = GovernanceConfig::default();
    config.pool.max_concurrent = 0;

    let result = GovernorBuilder::current().config(config).build();
    assert!(matches!(result, Err(GovernanceError::InvalidConfig(_))));
}

#[tokio::test]
async fn test_builder_transform_overrides_row_limit() {
    let governor = GovernorBuilder::current()
        .transform(Arc::new(Uppercase))
        .build()
        .unwrap();
    assert_eq!(governor.cache().describe("select 1"), "SELECT 1");
}

#[tokio::test]
async fn test_builder_binds_sources_and_responders() {
    let source = Arc::new(ManualPressureSource::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);

    let governor = GovernorBuilder::current()
        .source(source.clone())
        .responder(responder_fn("counter", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }))
        .build()
        .unwrap();

    assert_eq!(source.subscriber_count(), 1);
    source.emit(PressureLevel::Warning);
    assert_eq!(governor.current_level(), PressureLevel::Warning);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
