//! StackFlow Inventory
//!
//! Turns a provisioning [`RunReport`](stackflow_engine::RunReport) and the
//! servers' resolved config scopes into the per-host inventory consumed by
//! the configuration executor.

pub mod error;
pub mod generator;
pub mod payload;

pub use error::HostError;
pub use generator::{Inventory, InventoryGenerator, generate, is_reserved_key};
pub use payload::{HostEntry, InventoryPayload};
