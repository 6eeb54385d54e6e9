//! Config scope resolution
//!
//! A server's scopes are applied in declaration order into one flat mapping.
//! Later scopes overwrite earlier ones key by key at the top level only;
//! nested values are replaced wholesale.

use crate::error::{Result, StackError};
use crate::model::{ResourceDefinition, ScopeRef, StackConfig};
use crate::redact::redact_value;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, instrument, warn};

/// Flattened scope variables of one server. Read-only once resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostVariableSet {
    host: String,
    variables: Map<String, Value>,
}

impl HostVariableSet {
    /// Name of the server these variables belong to
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.variables.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.variables.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.variables.iter()
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.variables
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.variables
    }
}

/// Resolves server scope lists against a stack's named scopes
pub struct ScopeResolver<'a> {
    stack: &'a StackConfig,
}

impl<'a> ScopeResolver<'a> {
    pub fn new(stack: &'a StackConfig) -> Self {
        Self { stack }
    }

    #[instrument(skip(self, server), fields(host = %server.name))]
    pub fn resolve(&self, server: &ResourceDefinition) -> Result<HostVariableSet> {
        let mut variables = Map::new();

        for scope_ref in &server.config_scopes {
            let scope = match scope_ref {
                ScopeRef::Named(name) => {
                    self.stack
                        .scope(name)
                        .ok_or_else(|| StackError::UnknownScope {
                            host: server.name.clone(),
                            scope: name.clone(),
                        })?
                }
                ScopeRef::Inline(scope) => scope,
            };
            for (key, value) in &scope.values {
                variables.insert(key.clone(), value.clone());
            }
        }

        let resolved = HostVariableSet {
            host: server.name.clone(),
            variables,
        };
        if tracing::enabled!(tracing::Level::DEBUG) {
            let shown = redact_value(&Value::Object(resolved.variables.clone()));
            debug!(variables = %shown, "Resolved host variables");
        }
        Ok(resolved)
    }

    /// Resolve every server independently; one host's failure leaves the
    /// others untouched.
    pub fn resolve_all(&self) -> BTreeMap<String, Result<HostVariableSet>> {
        self.stack
            .servers()
            .map(|server| {
                let resolved = self.resolve(server);
                if let Err(err) = &resolved {
                    warn!(host = %server.name, error = %err, "Host variable resolution failed");
                }
                (server.name.clone(), resolved)
            })
            .collect()
    }
}
