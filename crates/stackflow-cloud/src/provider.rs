//! Cloud provider trait definition

use crate::error::Result;
use crate::state::ProviderAttributes;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use stackflow_core::{ResourceCategory, ResourceDefinition};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Cloud provider abstraction trait
///
/// Every backend (AWS, OpenStack, an in-memory double, ...) implements this
/// trait. The engine only ever calls `exists`, `describe` and `create`;
/// `destroy` is reserved for explicit cleanup tooling.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Provider identifier referenced by `provider:` in the stack
    fn name(&self) -> &str;

    /// Human readable name for logs
    fn display_name(&self) -> &str {
        self.name()
    }

    /// Whether a resource with this identity already exists
    async fn exists(&self, identity: &ResourceIdentity) -> Result<bool>;

    /// Create the resource and return what the provider assigned to it
    async fn create(&self, resource: &ResourceConfig) -> Result<ProviderAttributes>;

    /// Attributes of an existing resource
    async fn describe(&self, identity: &ResourceIdentity) -> Result<ProviderAttributes>;

    /// Delete a resource
    async fn destroy(&self, identity: &ResourceIdentity) -> Result<()>;
}

/// Provider-facing identity of a declared resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceIdentity {
    pub stack: String,
    pub category: ResourceCategory,
    pub name: String,
    /// `{stack}-{name}`, the name the provider sees
    pub qualified_name: String,
    pub region: Option<String>,
}

impl ResourceIdentity {
    pub fn from_definition(stack: &str, definition: &ResourceDefinition) -> Self {
        Self {
            stack: stack.to_string(),
            category: definition.category,
            name: definition.name.clone(),
            qualified_name: definition.qualified_name(stack),
            region: definition.attribute_str("region_name").map(str::to_string),
        }
    }

    /// Unique key (`category:qualified_name[@region]`)
    pub fn key(&self) -> String {
        match &self.region {
            Some(region) => format!("{}:{}@{}", self.category, self.qualified_name, region),
            None => format!("{}:{}", self.category, self.qualified_name),
        }
    }
}

impl fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Everything a provider needs to create a resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub identity: ResourceIdentity,

    /// Declared attributes, as a mapping
    pub config: Value,

    /// Tags to apply on the provider side
    pub tags: BTreeMap<String, String>,
}

impl ResourceConfig {
    pub fn from_definition(stack: &str, definition: &ResourceDefinition) -> Self {
        Self {
            identity: ResourceIdentity::from_definition(stack, definition),
            config: Value::Object(definition.attributes.clone()),
            tags: definition.tags.clone(),
        }
    }

    /// Get a configuration value as a specific type
    pub fn get_config<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.config
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// Retry configuration for provider operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included
    pub max_attempts: u32,

    /// Delay before the second attempt
    #[serde(with = "millis", rename = "initial_delay_ms")]
    pub initial_delay: Duration,

    /// Upper bound for any single delay
    #[serde(with = "millis", rename = "max_delay_ms")]
    pub max_delay: Duration,

    /// Backoff multiplier
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Delay to wait after failed attempt number `attempt` (1-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = self.backoff_multiplier.max(1.0).powi(exponent);
        let nanos = self.initial_delay.as_nanos() as f64 * factor;
        if !nanos.is_finite() || nanos >= self.max_delay.as_nanos() as f64 {
            self.max_delay
        } else {
            Duration::from_nanos(nanos.round() as u64)
        }
    }

    /// Whether another attempt is allowed after `attempts` have been made
    pub fn allows_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis().min(u64::MAX as u128) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
