//! Provider-side records of cloud resources

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Attributes a provider assigned to a resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderAttributes {
    /// Provider-specific resource ID
    pub instance_id: Option<String>,

    /// Public (or primary) network address
    pub address: Option<String>,

    pub private_address: Option<String>,

    /// Current status
    pub status: ResourceStatus,

    /// Anything else the provider reports (ARNs, URLs, endpoints, ...)
    #[serde(default)]
    pub extra: Map<String, Value>,

    /// When these attributes were observed
    pub observed_at: DateTime<Utc>,
}

impl Default for ProviderAttributes {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderAttributes {
    pub fn new() -> Self {
        Self {
            instance_id: None,
            address: None,
            private_address: None,
            status: ResourceStatus::Unknown,
            extra: Map::new(),
            observed_at: Utc::now(),
        }
    }

    pub fn with_instance_id(mut self, id: impl Into<String>) -> Self {
        self.instance_id = Some(id.into());
        self
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn with_private_address(mut self, address: impl Into<String>) -> Self {
        self.private_address = Some(address.into());
        self
    }

    pub fn with_status(mut self, status: ResourceStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    pub fn get_extra<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.extra
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// Status of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    /// Resource is being created
    Creating,
    /// Resource is running/active
    Running,
    /// Resource is stopped
    Stopped,
    /// Resource is in error state
    Error,
    /// Status is unknown
    Unknown,
}

impl std::fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceStatus::Creating => write!(f, "creating"),
            ResourceStatus::Running => write!(f, "running"),
            ResourceStatus::Stopped => write!(f, "stopped"),
            ResourceStatus::Error => write!(f, "error"),
            ResourceStatus::Unknown => write!(f, "unknown"),
        }
    }
}
