//! Serializable value types shared across the governance components.

use serde::{Deserialize, Serialize};

/// Internal identifier assigned to each submitted work item.
pub type TaskId = u64;

/// Admission priority class of a work item.
///
/// `High` items are admitted ahead of every pending `Normal` item; ordering
/// within a class is FIFO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Default class for deferrable work.
    #[default]
    Normal,
    /// Latency-sensitive work, admitted first.
    High,
}

impl Priority {
    /// Short label used in structured logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::High => "high",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
