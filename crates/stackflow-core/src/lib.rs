//! StackFlow Core
//!
//! Typed stack model, dependency discovery and configuration scope
//! resolution. Nothing in this crate talks to a provider; it only turns a
//! parsed configuration tree into data the engine and the inventory
//! generator can act on.
//!
//! ```text
//!  parsed tree ──► parser::load ──► StackConfig
//!                                      │
//!                     ┌────────────────┼─────────────────┐
//!                     ▼                                  ▼
//!          graph::DependencyGraph              resolver::ScopeResolver
//!          (provisioning order)                (per-host variables)
//! ```

pub mod error;
pub mod graph;
pub mod loader;
pub mod model;
pub mod parser;
pub mod redact;
pub mod resolver;

pub use error::{Result, StackError};
pub use graph::{DependencyGraph, DependencyNode, NodeState};
pub use loader::{load_documents, load_str, merge_trees, parse_tree};
pub use model::{
    ConfigScope, NodeId, ResourceCategory, ResourceDefinition, ScopeRef, StackConfig,
    StackSettings,
};
pub use parser::load;
pub use resolver::{HostVariableSet, ScopeResolver};
