//! Builder to construct pool managers from configuration.

use std::sync::Arc;

use crate::config::ManagerConfig;
use crate::core::{AppResult, JobRegistry, PoolError, PoolManager, ThreadUnitFactory, UnitFactory};
use crate::runtime::Spawn;

/// Builds [`PoolManager`]s from a validated [`ManagerConfig`].
#[derive(Debug, Clone, Default)]
pub struct PoolManagerBuilder {
    config: ManagerConfig,
}

impl PoolManagerBuilder {
    /// Start from an explicit configuration.
    #[must_use]
    pub const fn new(config: ManagerConfig) -> Self {
        Self { config }
    }

    /// Start from `WORKER_POOL_*` environment variables (and `.env`).
    ///
    /// # Errors
    ///
    /// Fails if a variable cannot be parsed or the result is invalid.
    pub fn from_env() -> AppResult<Self> {
        Ok(Self::new(ManagerConfig::from_env()?))
    }

    /// The configuration the manager will be built with.
    #[must_use]
    pub const fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Build a manager on the current tokio runtime with a custom factory.
    ///
    /// # Errors
    ///
    /// See [`PoolManager::new`].
    pub fn build<F: UnitFactory>(self, factory: F) -> Result<PoolManager, PoolError> {
        PoolManager::new(self.config, factory)
    }

    /// Build a manager whose event loop runs on `spawner`.
    ///
    /// # Errors
    ///
    /// See [`PoolManager::with_spawner`].
    pub fn build_with_spawner<F: UnitFactory, S: Spawn>(
        self,
        factory: F,
        spawner: &S,
    ) -> Result<PoolManager, PoolError> {
        PoolManager::with_spawner(self.config, factory, spawner)
    }

    /// Build a manager whose units are threads running jobs from `registry`.
    ///
    /// Unit threads use the configured `thread_stack_size`.
    ///
    /// # Errors
    ///
    /// See [`PoolManager::new`].
    pub fn build_threaded(self, registry: Arc<JobRegistry>) -> Result<PoolManager, PoolError> {
        let factory = ThreadUnitFactory::new(registry).with_stack_size(self.config.thread_stack_size);
        self.build(factory)
    }
}
