//! Error types for governance operations.

use thiserror::Error;

use crate::core::pressure::Feature;

/// Outcome reported through a [`TaskHandle`](crate::core::TaskHandle) when a
/// work item does not produce a value.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The work item ran and returned an error.
    #[error("work item failed: {0}")]
    Failed(anyhow::Error),
    /// The item was still pending when the queue was cancelled.
    #[error("work item cancelled before it started")]
    Cancelled,
    /// The item was dropped by congestion control.
    #[error("work item shed by congestion control")]
    Shed,
    /// Admission was refused because a feature gate is closed.
    #[error("work item rejected: {0} is gated")]
    Rejected(Feature),
    /// The pool no longer accepts work.
    #[error("pool has been shut down")]
    PoolShutdown,
    /// The work item panicked or its task was torn down.
    #[error("work item aborted")]
    Aborted,
}

impl TaskError {
    /// True when the item never started running.
    #[must_use]
    pub const fn never_ran(&self) -> bool {
        matches!(
            self,
            Self::Cancelled | Self::Shed | Self::Rejected(_) | Self::PoolShutdown
        )
    }
}

/// Failure to obtain a resource-pressure reading.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignalError {
    /// The probe could not produce a value.
    #[error("pressure reading unavailable: {0}")]
    Unavailable(String),
    /// The host stopped delivering readings.
    #[error("pressure source disconnected")]
    Disconnected,
}

/// Errors raised while assembling governance components.
#[derive(Debug, Error)]
pub enum GovernanceError {
    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
