//! Inventory generation
//!
//! Joins the outcome of a provisioning run with each server's resolved scope
//! variables. Provisioning data and executor metadata are injected under
//! reserved keys; a scope that defines one of those keys for a host is an
//! error for that host alone.

use crate::error::HostError;
use crate::payload::{HostEntry, InventoryPayload};
use serde::Serialize;
use serde_json::{Map, Value, json};
use stackflow_core::{
    HostVariableSet, ResourceDefinition, ScopeResolver, StackConfig, StackError,
};
use stackflow_engine::{ProvisioningResult, RunReport};
use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;
use tracing::{info, instrument, warn};

pub const ADDRESS: &str = "address";
pub const PRIVATE_ADDRESS: &str = "private_address";
pub const INSTANCE_ID: &str = "instance_id";
pub const PROVIDER_ATTRIBUTES: &str = "provider_attributes";
pub const INVENTORY_HOSTNAME: &str = "inventory_hostname";
pub const INVENTORY_HOSTNAME_SHORT: &str = "inventory_hostname_short";
pub const GROUP_NAMES: &str = "group_names";
pub const STACK: &str = "stack";
pub const SERVER_CLASS: &str = "server_class";
pub const SERVER_ATTRIBUTES: &str = "server_attributes";

/// Keys injected into every host
pub const HOST_KEYS: &[&str] = &[
    STACK,
    SERVER_CLASS,
    SERVER_ATTRIBUTES,
    INVENTORY_HOSTNAME,
    INVENTORY_HOSTNAME_SHORT,
    GROUP_NAMES,
];

/// Keys injected only into provider-created hosts
pub const PROVIDER_KEYS: &[&str] = &[ADDRESS, PRIVATE_ADDRESS, INSTANCE_ID, PROVIDER_ATTRIBUTES];

/// Whether `key` may be injected into some host
pub fn is_reserved_key(key: &str) -> bool {
    HOST_KEYS.contains(&key) || PROVIDER_KEYS.contains(&key)
}

/// Generated inventory plus the hosts that could not be included
#[derive(Debug, Clone, Default, Serialize)]
pub struct Inventory {
    pub payload: InventoryPayload,
    /// Keyed by declared server name
    pub errors: BTreeMap<String, HostError>,
}

impl Inventory {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn error(&self, server: &str) -> Option<&HostError> {
        self.errors.get(server)
    }
}

pub struct InventoryGenerator<'a> {
    stack: &'a StackConfig,
}

impl<'a> InventoryGenerator<'a> {
    pub fn new(stack: &'a StackConfig) -> Self {
        Self { stack }
    }

    /// Resolve every server's scopes, then generate
    pub fn generate_from_report(&self, report: &RunReport) -> Inventory {
        let resolved = ScopeResolver::new(self.stack).resolve_all();
        self.generate(report, &resolved)
    }

    #[instrument(skip_all, fields(stack = %self.stack.name))]
    pub fn generate(
        &self,
        report: &RunReport,
        resolved: &BTreeMap<String, stackflow_core::Result<HostVariableSet>>,
    ) -> Inventory {
        let mut inventory = Inventory::default();
        // host identity -> server that claimed it
        let mut claimed: BTreeMap<String, String> = BTreeMap::new();

        for server in self.stack.servers() {
            let entry = self.host_entry(server, report, resolved.get(&server.name));
            let entry = entry.and_then(|entry| match claimed.get(&entry.host) {
                Some(other) => Err(HostError::DuplicateHost {
                    host: server.name.clone(),
                    address: entry.host.clone(),
                    other: other.clone(),
                }),
                None => Ok(entry),
            });

            match entry {
                Ok(entry) => {
                    claimed.insert(entry.host.clone(), server.name.clone());
                    inventory.payload.insert(entry);
                }
                Err(err) => {
                    warn!(host = %server.name, error = %err, "Host left out of inventory");
                    inventory.errors.insert(server.name.clone(), err);
                }
            }
        }

        info!(
            hosts = inventory.payload.len(),
            errors = inventory.errors.len(),
            "Inventory generated"
        );
        inventory
    }

    fn host_entry(
        &self,
        server: &ResourceDefinition,
        report: &RunReport,
        resolved: Option<&stackflow_core::Result<HostVariableSet>>,
    ) -> Result<HostEntry, HostError> {
        let result = provisioned(server, report)?;
        let scope_vars = match resolved {
            Some(Ok(vars)) => vars.as_map().clone(),
            Some(Err(err)) => return Err(resolution_error(server, err)),
            None => ScopeResolver::new(self.stack)
                .resolve(server)
                .map_err(|err| resolution_error(server, &err))?
                .into_map(),
        };

        let host = host_identity(server, result)?;
        let groups: Vec<String> = server
            .groups
            .iter()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut injected = Map::new();
        injected.insert(
            STACK.to_string(),
            json!({"name": self.stack.name, "version": self.stack.version}),
        );
        injected.insert(SERVER_CLASS.to_string(), json!(server.class_name()));
        injected.insert(
            SERVER_ATTRIBUTES.to_string(),
            Value::Object(server.attributes.clone()),
        );
        injected.insert(INVENTORY_HOSTNAME.to_string(), json!(host));
        injected.insert(INVENTORY_HOSTNAME_SHORT.to_string(), json!(short_hostname(&host)));
        injected.insert(GROUP_NAMES.to_string(), json!(groups));

        let provider_attributes = result
            .attributes
            .as_ref()
            .filter(|_| !server.is_pre_provisioned());
        if let Some(attributes) = provider_attributes {
            injected.insert(ADDRESS.to_string(), json!(attributes.address));
            injected.insert(PRIVATE_ADDRESS.to_string(), json!(attributes.private_address));
            injected.insert(INSTANCE_ID.to_string(), json!(attributes.instance_id));
            let reported = serde_json::to_value(attributes).map_err(|err| HostError::Resolution {
                host: server.name.clone(),
                message: format!("provider attributes are not serializable: {}", err),
            })?;
            injected.insert(PROVIDER_ATTRIBUTES.to_string(), reported);
        }

        if let Some(key) = scope_vars.keys().find(|key| injected.contains_key(*key)) {
            return Err(HostError::ReservedKeyCollision {
                host: server.name.clone(),
                key: key.clone(),
            });
        }

        let mut variables = scope_vars;
        variables.extend(injected);
        Ok(HostEntry {
            server: server.name.clone(),
            host,
            groups,
            variables,
        })
    }
}

/// Convenience wrapper around [`InventoryGenerator::generate`]
pub fn generate(
    report: &RunReport,
    stack: &StackConfig,
    resolved: &BTreeMap<String, stackflow_core::Result<HostVariableSet>>,
) -> Inventory {
    InventoryGenerator::new(stack).generate(report, resolved)
}

fn provisioned<'r>(
    server: &ResourceDefinition,
    report: &'r RunReport,
) -> Result<&'r ProvisioningResult, HostError> {
    let result = report
        .get(&server.id())
        .ok_or_else(|| HostError::NotProvisioned {
            host: server.name.clone(),
            reason: "not part of the run".to_string(),
        })?;
    if !result.is_provisioned() {
        let reason = result
            .error
            .as_ref()
            .map(|reason| reason.to_string())
            .unwrap_or_else(|| format!("left in state {}", result.state));
        return Err(HostError::NotProvisioned {
            host: server.name.clone(),
            reason,
        });
    }
    Ok(result)
}

fn host_identity(
    server: &ResourceDefinition,
    result: &ProvisioningResult,
) -> Result<String, HostError> {
    if let Some(hostname) = &server.hostname {
        return Ok(hostname.clone());
    }
    result
        .attributes
        .as_ref()
        .and_then(|attrs| attrs.address.clone().or_else(|| attrs.instance_id.clone()))
        .ok_or_else(|| HostError::NotProvisioned {
            host: server.name.clone(),
            reason: "provider reported neither an address nor an instance id".to_string(),
        })
}

/// First DNS label; addresses are kept whole
fn short_hostname(host: &str) -> String {
    if host.parse::<IpAddr>().is_ok() {
        return host.to_string();
    }
    host.split('.').next().unwrap_or(host).to_string()
}

fn resolution_error(server: &ResourceDefinition, err: &StackError) -> HostError {
    match err {
        StackError::UnknownScope { host, scope } => HostError::UnknownScope {
            host: host.clone(),
            scope: scope.clone(),
        },
        other => HostError::Resolution {
            host: server.name.clone(),
            message: other.to_string(),
        },
    }
}
