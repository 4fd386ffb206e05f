//! Infrastructure adapters: pending queues, pressure signal sources, and
//! fetch-description transforms.

pub mod query;
pub mod queue;
pub mod signal;

pub use query::RowLimitGuard;
pub use queue::ClassQueue;
pub use signal::{ManualPressureSource, MemoryThresholds, SamplingSource};
