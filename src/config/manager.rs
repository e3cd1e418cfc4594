//! Pool manager configuration.

use std::env;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::core::unit::DEFAULT_STACK_SIZE;
use crate::core::AppResult;

/// Environment variable overriding [`ManagerConfig::pool_size`].
pub const ENV_POOL_SIZE: &str = "WORKER_POOL_SIZE";
/// Environment variable overriding [`ManagerConfig::location`].
pub const ENV_LOCATION: &str = "WORKER_POOL_LOCATION";
/// Environment variable overriding [`ManagerConfig::unit_id_prefix`].
pub const ENV_ID_PREFIX: &str = "WORKER_POOL_ID_PREFIX";
/// Environment variable overriding [`ManagerConfig::thread_stack_size`].
pub const ENV_STACK_SIZE: &str = "WORKER_POOL_STACK_SIZE";

/// Pool manager configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Number of execution units in the pool.
    pub pool_size: usize,
    /// Opaque location handed to the unit factory for every spawn.
    pub location: String,
    /// Prefix of unit ids (`<prefix>_0`, `<prefix>_1`, ...).
    pub unit_id_prefix: String,
    /// Stack size of unit threads when using the threaded unit host.
    pub thread_stack_size: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            pool_size: 2,
            location: "in-process".into(),
            unit_id_prefix: "unit".into(),
            thread_stack_size: DEFAULT_STACK_SIZE,
        }
    }
}

impl ManagerConfig {
    /// Create a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of units.
    #[must_use]
    pub const fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Set the unit location.
    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    /// Set the unit id prefix.
    #[must_use]
    pub fn with_unit_id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.unit_id_prefix = prefix.into();
        self
    }

    /// Set the unit thread stack size.
    #[must_use]
    pub const fn with_thread_stack_size(mut self, stack_size: usize) -> Self {
        self.thread_stack_size = stack_size;
        self
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.pool_size == 0 {
            return Err("pool_size must be greater than 0".into());
        }
        if self.unit_id_prefix.is_empty() {
            return Err("unit_id_prefix must not be empty".into());
        }
        if self.thread_stack_size < 64 * 1024 {
            return Err("thread_stack_size must be at least 64 KiB".into());
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns a description of the parse or validation failure.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Build configuration from defaults overridden by `WORKER_POOL_*`
    /// environment variables, loading a `.env` file first if one exists.
    ///
    /// # Errors
    ///
    /// Fails if a variable is present but unparsable, or if the result does
    /// not validate.
    pub fn from_env() -> AppResult<Self> {
        // A missing .env file is normal outside development.
        let _ = dotenvy::dotenv();

        let mut cfg = Self::default();
        if let Ok(raw) = env::var(ENV_POOL_SIZE) {
            cfg.pool_size = raw
                .trim()
                .parse()
                .with_context(|| format!("{ENV_POOL_SIZE}={raw} is not a valid pool size"))?;
        }
        if let Ok(location) = env::var(ENV_LOCATION) {
            cfg.location = location;
        }
        if let Ok(prefix) = env::var(ENV_ID_PREFIX) {
            cfg.unit_id_prefix = prefix;
        }
        if let Ok(raw) = env::var(ENV_STACK_SIZE) {
            cfg.thread_stack_size = raw
                .trim()
                .parse()
                .with_context(|| format!("{ENV_STACK_SIZE}={raw} is not a valid stack size"))?;
        }

        cfg.validate().map_err(anyhow::Error::msg)?;
        Ok(cfg)
    }
}
