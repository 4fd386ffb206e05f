//! Runtime adapters and status surface.

pub mod api;
pub mod tokio_spawner;

pub use api::{health, snapshot, GovernanceSnapshot, Health};
pub use tokio_spawner::TokioSpawner;
