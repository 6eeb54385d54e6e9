//! Config scope parsing

use crate::error::{Result, StackError};
use crate::model::{ConfigScope, ScopeRef};
use serde_json::Value;

/// Parse a top-level (named) scope. Anything that is not a mapping is an
/// error: unreserved keys are always scopes, never sniffed by type.
pub(super) fn parse_named_scope(name: &str, value: &Value) -> Result<ConfigScope> {
    let values = value.as_object().ok_or_else(|| {
        StackError::config(format!(
            "top-level key '{}' is not a reserved key, so it must be a config scope mapping",
            name
        ))
    })?;
    Ok(ConfigScope::named(name, values.clone()))
}

/// Parse a resource's `config_scopes` list (scope names and inline mappings)
pub(super) fn parse_scope_refs(owner: &str, value: &Value) -> Result<Vec<ScopeRef>> {
    let items = value.as_array().ok_or_else(|| {
        StackError::config(format!("'config_scopes' of '{}' must be a sequence", owner))
    })?;

    items
        .iter()
        .map(|item| match item {
            Value::String(name) => Ok(ScopeRef::Named(name.clone())),
            Value::Object(values) => Ok(ScopeRef::Inline(ConfigScope::inline(values.clone()))),
            other => Err(StackError::config(format!(
                "config scope entries of '{}' must be names or mappings, got {}",
                owner, other
            ))),
        })
        .collect()
}
