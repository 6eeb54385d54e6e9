//! StackFlow Cloud
//!
//! The provider capability interface. Every cloud backend implements
//! [`CloudProvider`]; the engine reaches backends only through a
//! [`ProviderRegistry`] keyed by the provider name a resource declares.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            stackflow-engine             │
//! └───────────────────┬─────────────────────┘
//!                     │ exists / describe / create
//! ┌───────────────────▼─────────────────────┐
//! │             ProviderRegistry            │
//! │      "aws" ─► dyn CloudProvider         │
//! │      "openstack" ─► dyn CloudProvider   │
//! └─────────────────────────────────────────┘
//! ```

pub mod action;
pub mod error;
pub mod memory;
pub mod provider;
pub mod registry;
pub mod state;

// Re-exports
pub use action::{Action, ActionType, Plan, PlanSummary};
pub use error::{CloudError, Result};
pub use memory::{CallKind, CallRecord, InMemoryProvider};
pub use provider::{CloudProvider, ResourceConfig, ResourceIdentity, RetryConfig};
pub use registry::ProviderRegistry;
pub use state::{ProviderAttributes, ResourceStatus};
