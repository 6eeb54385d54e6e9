//! Engine error types

use stackflow_cloud::CloudError;
use stackflow_core::{NodeId, NodeState};
use thiserror::Error;

/// Errors that stop a run before (or instead of) producing a report
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("node '{node}' uses provider '{provider}', which is not registered")]
    UnknownProvider { node: NodeId, provider: String },

    #[error("invalid engine configuration: {0}")]
    InvalidConfig(String),

    #[error("node '{node}' cannot move from {from} to {to}")]
    IllegalTransition {
        node: NodeId,
        from: NodeState,
        to: NodeState,
    },

    #[error("node '{0}' is not part of this run")]
    UnknownNode(NodeId),

    #[error("provider call for '{node}' failed: {source}")]
    Provider {
        node: NodeId,
        #[source]
        source: CloudError,
    },
}

pub type Result<T> = std::result::Result<T, EngineError>;
