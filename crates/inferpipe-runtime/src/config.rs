//! Pipeline configuration
//!
//! Library defaults with runtime environment overrides.
//!
//! # Configuration Priority (highest wins)
//!
//! 1. Builder calls
//! 2. Environment variables
//! 3. Library defaults
//!
//! # Example
//!
//! ```rust,ignore
//! use inferpipe_runtime::config::PipelineConfig;
//!
//! let config = PipelineConfig::from_env()
//!     .max_concurrency(4)
//!     .output_selector("prob");
//! ```

use inferpipe_core::env::{env_get, env_get_opt, key};
use inferpipe_core::ConfigError;

/// Library defaults
pub mod defaults {
    /// Concurrent in-flight units
    pub const MAX_CONCURRENCY: usize = 4;
}

/// Pipeline configuration with builder pattern.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Number of worker slots (concurrent in-flight units)
    pub max_concurrency: usize,
    /// Named output read from each finished unit
    pub output_selector: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: defaults::MAX_CONCURRENCY,
            output_selector: None,
        }
    }
}

impl PipelineConfig {
    /// Defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `INFERPIPE_MAX_CONCURRENCY` - Number of worker slots
    /// - `INFERPIPE_OUTPUT` - Output selector
    pub fn from_env() -> Self {
        Self {
            max_concurrency: env_get(&key("MAX_CONCURRENCY"), defaults::MAX_CONCURRENCY),
            output_selector: env_get_opt(&key("OUTPUT")),
        }
    }

    /// Set the number of worker slots
    pub fn max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = n;
        self
    }

    /// Set the output selector
    pub fn output_selector(mut self, name: impl Into<String>) -> Self {
        self.output_selector = Some(name.into());
        self
    }

    /// Check the values the pool needs at construction.
    ///
    /// A missing selector is not an error here; `submit` reports it.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrency == 0 {
            return Err(ConfigError::InvalidConcurrency(self.max_concurrency));
        }
        Ok(())
    }

    /// The selector if set and non-empty
    pub fn selector(&self) -> Option<&str> {
        self.output_selector.as_deref().filter(|s| !s.is_empty())
    }
}
