//! StackFlow
//!
//! Declarative multi-resource stacks, provisioned in dependency order and
//! handed to a configuration executor as a per-host inventory.
//!
//! ```text
//!  YAML / tree ──► Stack ──► plan()   ──► Plan
//!                    │
//!                    ├─────► deploy() ──► RunReport + Inventory
//!                    └─────► gather_inventory()
//! ```
//!
//! The building blocks live in their own crates: `stackflow-core` (model,
//! graph, scopes), `stackflow-cloud` (provider interface), `stackflow-engine`
//! (provisioning) and `stackflow-inventory`.

pub mod stack;
pub mod telemetry;

pub use stack::{DeployOutcome, Stack, StackDescription};
pub use telemetry::{init_tracing, init_tracing_with};

pub use stackflow_cloud::{CloudError, CloudProvider, Plan, ProviderRegistry};
pub use stackflow_core::{DependencyGraph, StackConfig, StackError};
pub use stackflow_engine::{CancellationHandle, EngineConfig, RunReport};
pub use stackflow_inventory::{HostError, Inventory, InventoryPayload};
