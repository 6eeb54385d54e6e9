//! StackFlow Engine
//!
//! Walks a [`DependencyGraph`](stackflow_core::DependencyGraph) and brings
//! every node into existence through the provider its resource names:
//!
//! - a node starts only once every dependency is `Provisioned`;
//! - independent nodes run concurrently, bounded by `workers` and by the
//!   per-provider limits;
//! - an existing resource is adopted (`exists` then `describe`) instead of
//!   created, so re-running a partially failed stack is safe;
//! - retryable provider errors back off exponentially;
//! - a terminal failure fails every transitive dependent without attempting
//!   it, while unrelated branches carry on;
//! - nothing is ever rolled back.

pub mod cancel;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod result;

pub use cancel::CancellationHandle;
pub use config::{DEFAULT_WORKERS, EngineConfig};
pub use context::RunContext;
pub use engine::ProvisioningEngine;
pub use error::{EngineError, Result};
pub use result::{FailureReason, ProvisioningResult, RunReport, RunSummary};
