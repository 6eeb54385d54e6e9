//! Inventory payload handed to the configuration executor

use serde::Serialize;
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, BTreeSet};

/// One inventory host and its variables
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostEntry {
    /// Declared server name
    pub server: String,
    /// Inventory host identity (address, instance id or hostname)
    pub host: String,
    pub groups: Vec<String>,
    pub variables: Map<String, Value>,
}

impl HostEntry {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.variables.get(key)
    }
}

/// Per-host inventory keyed by host identity
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InventoryPayload {
    hosts: BTreeMap<String, HostEntry>,
}

impl InventoryPayload {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, entry: HostEntry) {
        self.hosts.insert(entry.host.clone(), entry);
    }

    pub fn host(&self, host: &str) -> Option<&HostEntry> {
        self.hosts.get(host)
    }

    /// Look a host up by its declared server name
    pub fn by_server(&self, server: &str) -> Option<&HostEntry> {
        self.hosts.values().find(|entry| entry.server == server)
    }

    pub fn hosts(&self) -> impl Iterator<Item = &HostEntry> {
        self.hosts.values()
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Group name to its sorted member hosts
    pub fn groups(&self) -> BTreeMap<String, Vec<String>> {
        let mut groups: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for entry in self.hosts.values() {
            for group in &entry.groups {
                groups
                    .entry(group.clone())
                    .or_default()
                    .insert(entry.host.clone());
            }
        }
        groups
            .into_iter()
            .map(|(group, hosts)| (group, hosts.into_iter().collect()))
            .collect()
    }

    /// `{"hosts": {host: vars}, "groups": {group: [hosts]}}`
    pub fn to_value(&self) -> Value {
        let hosts: Map<String, Value> = self
            .hosts
            .iter()
            .map(|(host, entry)| (host.clone(), Value::Object(entry.variables.clone())))
            .collect();
        json!({
            "hosts": hosts,
            "groups": self.groups(),
        })
    }

    /// Dynamic-inventory document: every group maps to its sorted host list
    /// and `_meta.hostvars` carries the per-host variables.
    pub fn to_executor_inventory(&self) -> Value {
        let mut inventory: Map<String, Value> = self
            .groups()
            .into_iter()
            .map(|(group, hosts)| (group, json!(hosts)))
            .collect();
        let hostvars: Map<String, Value> = self
            .hosts
            .iter()
            .map(|(host, entry)| (host.clone(), Value::Object(entry.variables.clone())))
            .collect();
        inventory.insert("_meta".to_string(), json!({ "hostvars": hostvars }));
        Value::Object(inventory)
    }
}
