//! Fluent assembly of a [`Governor`] and its collaborators.

use std::sync::Arc;

use crate::config::GovernanceConfig;
use crate::core::{
    DescriptionTransform, GovernanceError, Governor, PressureResponder, PressureSource, Spawn,
};
use crate::runtime::TokioSpawner;
use crate::util::clock::{Clock, SystemClock};

/// Collects configuration, runtime, and host hooks, then builds a
/// [`Governor`].
pub struct GovernorBuilder<S = TokioSpawner> {
    config: GovernanceConfig,
    spawner: S,
    clock: Arc<dyn Clock>,
    transform: Option<Arc<dyn DescriptionTransform>>,
    responders: Vec<Arc<dyn PressureResponder>>,
    sources: Vec<Arc<dyn PressureSource + Send + Sync>>,
    start_heartbeat: bool,
}

impl GovernorBuilder<TokioSpawner> {
    /// Builder that spawns onto the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    #[must_use]
    pub fn current() -> Self {
        Self::with_spawner(TokioSpawner::current())
    }
}

impl<S> GovernorBuilder<S>
where
    S: Spawn + Clone + Send + Sync + 'static,
{
    /// Builder that spawns with `spawner`.
    pub fn with_spawner(spawner: S) -> Self {
        Self {
            config: GovernanceConfig::default(),
            spawner,
            clock: Arc::new(SystemClock),
            transform: None,
            responders: Vec::new(),
            sources: Vec::new(),
            start_heartbeat: true,
        }
    }

    /// Replace the configuration.
    #[must_use]
    pub fn config(mut self, config: GovernanceConfig) -> Self {
        self.config = config;
        self
    }

    /// Measure cache freshness with `clock`.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Use `transform` instead of the row-limit guard derived from config.
    #[must_use]
    pub fn transform(mut self, transform: Arc<dyn DescriptionTransform>) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Register an extra pressure responder (after the result cache).
    #[must_use]
    pub fn responder(mut self, responder: Arc<dyn PressureResponder>) -> Self {
        self.responders.push(responder);
        self
    }

    /// Bind a pressure source once the monitor exists.
    #[must_use]
    pub fn source(mut self, source: Arc<dyn PressureSource + Send + Sync>) -> Self {
        self.sources.push(source);
        self
    }

    /// Whether `build` starts the congestion heartbeat (default `true`).
    #[must_use]
    pub fn start_heartbeat(mut self, start: bool) -> Self {
        self.start_heartbeat = start;
        self
    }

    /// Validate configuration and assemble the governor.
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError::InvalidConfig`] when validation fails.
    pub fn build(self) -> Result<Governor<S>, GovernanceError> {
        let governor = Governor::with_clock(self.config, self.spawner, self.clock)?;
        if let Some(transform) = self.transform {
            governor.cache().set_transform(transform);
        }
        for responder in self.responders {
            governor.monitor().register(responder);
        }
        for source in &self.sources {
            governor.bind_source(source.as_ref());
        }
        if self.start_heartbeat {
            governor.start();
        }
        Ok(governor)
    }
}
