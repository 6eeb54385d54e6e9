//! Resource definitions

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::scope::ScopeRef;

/// Fixed set of resource categories a stack may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceCategory {
    SecurityGroups,
    Servers,
    Buckets,
    Queues,
    Databases,
    LoadBalancers,
}

impl ResourceCategory {
    pub const ALL: &'static [ResourceCategory] = &[
        ResourceCategory::SecurityGroups,
        ResourceCategory::Servers,
        ResourceCategory::Buckets,
        ResourceCategory::Queues,
        ResourceCategory::Databases,
        ResourceCategory::LoadBalancers,
    ];

    /// Top-level configuration key for this category
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceCategory::SecurityGroups => "security_groups",
            ResourceCategory::Servers => "servers",
            ResourceCategory::Buckets => "buckets",
            ResourceCategory::Queues => "queues",
            ResourceCategory::Databases => "databases",
            ResourceCategory::LoadBalancers => "load_balancers",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.as_str() == key)
    }
}

impl fmt::Display for ResourceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a node in the dependency graph (`category:name`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct NodeId {
    pub category: ResourceCategory,
    pub name: String,
}

impl NodeId {
    pub fn new(category: ResourceCategory, name: impl Into<String>) -> Self {
        Self {
            category,
            name: name.into(),
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.category, self.name)
    }
}

impl FromStr for NodeId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (category, name) = s
            .split_once(':')
            .ok_or_else(|| format!("node id '{}' is not of the form category:name", s))?;
        let category = ResourceCategory::from_key(category)
            .ok_or_else(|| format!("unknown resource category '{}'", category))?;
        Ok(NodeId::new(category, name))
    }
}

impl From<NodeId> for String {
    fn from(id: NodeId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for NodeId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A single declared resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDefinition {
    pub category: ResourceCategory,

    pub name: String,

    /// Provider identifier. `None` marks a pre-provisioned host.
    pub provider: Option<String>,

    /// Declared hostname (pre-provisioned servers only)
    pub hostname: Option<String>,

    /// Free-form attributes; string values may reference other resources
    pub attributes: Map<String, Value>,

    /// Tags applied by the provider
    #[serde(default)]
    pub tags: BTreeMap<String, String>,

    /// Config scopes in declaration order
    #[serde(default)]
    pub config_scopes: Vec<ScopeRef>,

    /// Inventory groups this server belongs to
    #[serde(default)]
    pub groups: Vec<String>,

    /// Declared server name this definition was cloned from by
    /// `instance_count`
    #[serde(default)]
    pub server_class: Option<String>,
}

impl ResourceDefinition {
    pub fn new(category: ResourceCategory, name: impl Into<String>) -> Self {
        Self {
            category,
            name: name.into(),
            provider: None,
            hostname: None,
            attributes: Map::new(),
            tags: BTreeMap::new(),
            config_scopes: Vec::new(),
            groups: Vec::new(),
            server_class: None,
        }
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn with_scope(mut self, scope: ScopeRef) -> Self {
        self.config_scopes.push(scope);
        self
    }

    pub fn id(&self) -> NodeId {
        NodeId::new(self.category, self.name.clone())
    }

    /// Declared name shared by every instance of a server
    pub fn class_name(&self) -> &str {
        self.server_class.as_deref().unwrap_or(&self.name)
    }

    pub fn is_pre_provisioned(&self) -> bool {
        self.provider.is_none()
    }

    /// Provider-facing name, prefixed with the stack name
    pub fn qualified_name(&self, stack: &str) -> String {
        format!("{}-{}", stack, self.name)
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn attribute_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }
}
