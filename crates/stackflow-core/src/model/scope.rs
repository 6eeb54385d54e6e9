//! Configuration scopes

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Bundle of key-value configuration data assignable to hosts.
///
/// Named scopes are declared at the top level of the stack; inline scopes
/// live directly in a server's `config_scopes` list and carry no name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigScope {
    pub name: Option<String>,
    pub values: Map<String, Value>,
}

impl ConfigScope {
    pub fn named(name: impl Into<String>, values: Map<String, Value>) -> Self {
        Self {
            name: Some(name.into()),
            values,
        }
    }

    pub fn inline(values: Map<String, Value>) -> Self {
        Self { name: None, values }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }
}

/// Entry of a server's `config_scopes` list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeRef {
    Named(String),
    Inline(ConfigScope),
}
