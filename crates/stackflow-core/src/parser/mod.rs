//! Stack configuration parser
//!
//! Turns the language-neutral tree (mappings, sequences, scalars) into a
//! [`StackConfig`]. Top-level keys are classified only through the fixed
//! reserved-key tables below: category keys hold resources, settings keys
//! hold stack settings, and every other key is a named config scope.

mod resource;
mod scope;

use resource::{parse_category, prepare_resources};
use scope::parse_named_scope;

use crate::error::{Result, StackError};
use crate::model::{ResourceCategory, StackConfig, StackSettings};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, instrument};

pub(crate) const NAME: &str = "name";
pub(crate) const VERSION: &str = "version";
pub(crate) const PLAYBOOKS: &str = "playbooks";
pub(crate) const NAME_TAG_NAME: &str = "name_tag_name";
pub(crate) const PROVISIONING: &str = "provisioning";
pub(crate) const ANSIBLE: &str = "ansible";
pub(crate) const SERVER_COMMON_ATTRIBUTES: &str = "server_common_attributes";
pub(crate) const DATABASE_CREDENTIALS: &str = "database_credentials";

/// Top-level keys that are stack settings or convenience stanzas, never scopes
pub const SETTINGS_KEYS: &[&str] = &[
    NAME,
    VERSION,
    PLAYBOOKS,
    NAME_TAG_NAME,
    PROVISIONING,
    ANSIBLE,
    SERVER_COMMON_ATTRIBUTES,
    DATABASE_CREDENTIALS,
    "deployer_credentials",
    "logging",
    "config_dir",
];

/// Whether a top-level key is reserved (resource category or setting)
pub fn is_reserved_key(key: &str) -> bool {
    ResourceCategory::from_key(key).is_some() || SETTINGS_KEYS.contains(&key)
}

/// Build a [`StackConfig`] from a parsed configuration tree
#[instrument(skip(tree))]
pub fn load(tree: &Value) -> Result<StackConfig> {
    let root = tree
        .as_object()
        .ok_or_else(|| StackError::config("stack configuration must be a mapping"))?;

    let name = required_scalar(root, NAME)?;
    let version = required_scalar(root, VERSION)?;
    let playbooks = parse_playbooks(root.get(PLAYBOOKS))?;
    let settings = parse_settings(root)?;

    let mut resources = BTreeMap::new();
    let mut scopes = BTreeMap::new();

    for (key, value) in root {
        if let Some(category) = ResourceCategory::from_key(key) {
            let entries = parse_category(category, value)?;
            debug!(category = %category, count = entries.len(), "Parsed resource category");
            resources.insert(category, entries);
        } else if !SETTINGS_KEYS.contains(&key.as_str()) {
            let scope = parse_named_scope(key, value)?;
            scopes.insert(key.clone(), scope);
        }
    }

    prepare_resources(&mut resources, root, &name, &settings)?;

    let stack = StackConfig {
        name,
        version,
        playbooks,
        resources,
        scopes,
        settings,
    };
    debug!(
        stack = %stack.name,
        resources = stack.resource_count(),
        scopes = stack.scopes.len(),
        "Stack configuration loaded"
    );
    Ok(stack)
}

/// Read a required scalar; numbers are accepted and stringified (`version: 2.9`)
fn required_scalar(root: &Map<String, Value>, key: &str) -> Result<String> {
    match root.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(other) => Err(StackError::config(format!(
            "'{}' must be a non-empty string, got {}",
            key, other
        ))),
        None => Err(StackError::config(format!("missing required key '{}'", key))),
    }
}

fn parse_playbooks(value: Option<&Value>) -> Result<Vec<String>> {
    let Some(value) = value else {
        return Ok(Vec::new());
    };
    let items = value
        .as_array()
        .ok_or_else(|| StackError::config("'playbooks' must be a sequence"))?;
    items
        .iter()
        .map(|item| {
            item.as_str().map(str::to_string).ok_or_else(|| {
                StackError::config(format!("playbook entries must be strings, got {}", item))
            })
        })
        .collect()
}

fn parse_settings(root: &Map<String, Value>) -> Result<StackSettings> {
    let mut settings = StackSettings::default();

    match root.get(NAME_TAG_NAME) {
        None => {}
        Some(Value::String(tag)) => settings.name_tag_name = tag.clone(),
        Some(Value::Null) => settings.name_tag_name = String::new(),
        Some(other) => {
            return Err(StackError::config(format!(
                "'{}' must be a string, got {}",
                NAME_TAG_NAME, other
            )));
        }
    }

    if let Some(provisioning) = root.get(PROVISIONING) {
        if !provisioning.is_object() {
            return Err(StackError::config(format!(
                "'{}' must be a mapping",
                PROVISIONING
            )));
        }
        settings.provisioning = Some(provisioning.clone());
    }

    settings.ansible = root.get(ANSIBLE).cloned();
    Ok(settings)
}

#[cfg(test)]
mod tests;
