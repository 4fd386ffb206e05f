//! Core governance components: admission pool, result cache, and pressure
//! monitor, plus the composition root that ties them together.

pub mod error;
pub mod governor;
pub mod pressure;
pub mod result_cache;
pub mod spawn;
pub mod task_pool;

pub use error::{AppResult, GovernanceError, SignalError, TaskError};
pub use governor::Governor;
pub use pressure::{
    responder_fn, Feature, FnResponder, GateSet, MonitorStats, PressureEvent, PressureLevel,
    PressureMonitor, PressureResponder, PressureSource, ReadingCallback,
};
pub use result_cache::{CacheStats, DescriptionTransform, ResultCache};
pub use spawn::{BoxFuture, Spawn};
pub use task_pool::{AdmissionPool, PoolStats, PoolStatus, TaskHandle};
