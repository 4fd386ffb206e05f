//! Pressure signal sources.

pub mod manual;
pub mod sampling;

pub use manual::ManualPressureSource;
pub use sampling::{MemoryThresholds, SamplingSource};
