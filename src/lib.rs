//! # Ops Governor
//!
//! Resource governance for long-running services on constrained hosts.
//!
//! Three cooperating components keep a process responsive when memory,
//! CPU, or downstream capacity runs short:
//!
//! - **Admission pool** ([`core::AdmissionPool`]): bounds concurrently
//!   running async work, queues the rest in two priority classes, and sheds
//!   the backlog when it grows past a threshold while saturated.
//! - **Result cache** ([`core::ResultCache`]): fetch-through cache over
//!   expensive reads with per-call freshness windows and explicit
//!   invalidation.
//! - **Pressure monitor** ([`core::PressureMonitor`]): turns a stream of
//!   pressure readings into feature gates and cleanup actions, and reopens
//!   the gates after a debounced recovery.
//!
//! [`core::Governor`] wires the three together: the pool consults the
//! monitor's gates at admission time and the cache is registered as a
//! cleanup responder.
//!
//! ```rust,ignore
//! use ops_governor::builders::GovernorBuilder;
//! use ops_governor::util::Priority;
//! use ops_governor::infra::ManualPressureSource;
//! use std::sync::Arc;
//!
//! let source = Arc::new(ManualPressureSource::new());
//! let governor = GovernorBuilder::current()
//!     .source(source.clone())
//!     .build()?;
//!
//! let report = governor
//!     .cache()
//!     .fetch_cached(Some("report:today"), None, || load_report())
//!     .await?;
//!
//! let handle = governor
//!     .pool()
//!     .submit(|| refresh_index(), Priority::Normal);
//! handle.await?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Admission pool, result cache, pressure monitor, and their composition.
pub mod core;
/// Configuration models and loaders.
pub mod config;
/// Builders to construct a governor from configuration.
pub mod builders;
/// Infrastructure adapters: queues, pressure sources, query guards.
pub mod infra;
/// Runtime adapters and status surface.
pub mod runtime;
/// Shared utilities.
pub mod util;
