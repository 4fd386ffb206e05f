//! Builders to construct the governance layer from configuration.

pub mod governor_builder;

pub use governor_builder::GovernorBuilder;
