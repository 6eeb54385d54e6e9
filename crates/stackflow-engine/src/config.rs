//! Engine configuration
//!
//! Read from the stack's optional `provisioning` section:
//!
//! ```yaml
//! provisioning:
//!   workers: 8
//!   provider_limits:
//!     aws: 4
//!   retry:
//!     max_attempts: 5
//!     initial_delay_ms: 500
//! ```

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use stackflow_cloud::RetryConfig;
use std::collections::HashMap;

pub const DEFAULT_WORKERS: usize = 4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of provider calls in flight
    pub workers: usize,

    /// Per-provider cap on concurrent calls
    pub provider_limits: HashMap<String, usize>,

    pub retry: RetryConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            provider_limits: HashMap::new(),
            retry: RetryConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse the `provisioning` settings tree; `None` gives the defaults
    pub fn from_settings(settings: Option<&Value>) -> Result<Self> {
        let config = match settings {
            None | Some(Value::Null) => Self::default(),
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|e| EngineError::InvalidConfig(e.to_string()))?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_provider_limit(mut self, provider: impl Into<String>, limit: usize) -> Self {
        self.provider_limits.insert(provider.into(), limit);
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(EngineError::InvalidConfig(
                "workers must be at least 1".to_string(),
            ));
        }
        if let Some((provider, _)) = self.provider_limits.iter().find(|(_, limit)| **limit == 0) {
            return Err(EngineError::InvalidConfig(format!(
                "provider limit for '{}' must be at least 1",
                provider
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(EngineError::InvalidConfig(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
