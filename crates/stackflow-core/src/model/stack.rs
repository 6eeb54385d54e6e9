//! Stack definition

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::resource::{NodeId, ResourceCategory, ResourceDefinition};
use super::scope::ConfigScope;

/// Default tag key that receives the `{stack}-{server}` name
pub const DEFAULT_NAME_TAG: &str = "Name";

/// Stack-wide settings that are neither resources nor scopes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackSettings {
    /// Tag key for the combined stack/server name. Empty disables the tag.
    pub name_tag_name: String,

    /// Engine tuning (`workers`, `provider_limits`, `retry`)
    #[serde(default)]
    pub provisioning: Option<Value>,

    /// Executor section passed through untouched
    #[serde(default)]
    pub ansible: Option<Value>,
}

impl Default for StackSettings {
    fn default() -> Self {
        Self {
            name_tag_name: DEFAULT_NAME_TAG.to_string(),
            provisioning: None,
            ansible: None,
        }
    }
}

/// The complete declared deployment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackConfig {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub playbooks: Vec<String>,
    pub resources: BTreeMap<ResourceCategory, BTreeMap<String, ResourceDefinition>>,
    pub scopes: BTreeMap<String, ConfigScope>,
    #[serde(default)]
    pub settings: StackSettings,
}

impl StackConfig {
    pub fn resource(&self, id: &NodeId) -> Option<&ResourceDefinition> {
        self.resources.get(&id.category)?.get(&id.name)
    }

    pub fn contains(&self, category: ResourceCategory, name: &str) -> bool {
        self.resources
            .get(&category)
            .is_some_and(|entries| entries.contains_key(name))
    }

    pub fn resources_in(
        &self,
        category: ResourceCategory,
    ) -> impl Iterator<Item = &ResourceDefinition> {
        self.resources
            .get(&category)
            .into_iter()
            .flat_map(|entries| entries.values())
    }

    pub fn all_resources(&self) -> impl Iterator<Item = &ResourceDefinition> {
        self.resources.values().flat_map(|entries| entries.values())
    }

    pub fn servers(&self) -> impl Iterator<Item = &ResourceDefinition> {
        self.resources_in(ResourceCategory::Servers)
    }

    pub fn scope(&self, name: &str) -> Option<&ConfigScope> {
        self.scopes.get(name)
    }

    pub fn resource_count(&self) -> usize {
        self.resources.values().map(BTreeMap::len).sum()
    }
}
