//! Per-host inventory errors

use serde::Serialize;
use thiserror::Error;

/// Why a server is missing from the inventory. Each error concerns one host
/// only; the rest of the inventory is still produced.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HostError {
    #[error("server '{host}' references unknown config scope '{scope}'")]
    UnknownScope { host: String, scope: String },

    #[error("server '{host}' defines '{key}', which is reserved for provisioning data")]
    ReservedKeyCollision { host: String, key: String },

    #[error("server '{host}' was not provisioned: {reason}")]
    NotProvisioned { host: String, reason: String },

    #[error("server '{host}' resolves to inventory host '{address}', already used by '{other}'")]
    DuplicateHost {
        host: String,
        address: String,
        other: String,
    },

    #[error("variables for server '{host}' could not be resolved: {message}")]
    Resolution { host: String, message: String },
}

impl HostError {
    /// Server the error concerns
    pub fn host(&self) -> &str {
        match self {
            HostError::UnknownScope { host, .. }
            | HostError::ReservedKeyCollision { host, .. }
            | HostError::NotProvisioned { host, .. }
            | HostError::DuplicateHost { host, .. }
            | HostError::Resolution { host, .. } => host,
        }
    }
}
