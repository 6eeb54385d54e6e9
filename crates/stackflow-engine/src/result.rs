//! Per-node results and the run report

use chrono::{DateTime, Utc};
use serde::Serialize;
use stackflow_cloud::ProviderAttributes;
use stackflow_core::{NodeId, NodeState};
use std::collections::BTreeMap;
use std::fmt;

/// Why a node ended up `Failed`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// The provider reported a non-retryable error
    Provider { message: String },
    /// Every allowed attempt hit a retryable error
    RetriesExhausted { attempts: u32, message: String },
    /// Never attempted because a dependency failed
    DependencyFailed { upstream: NodeId },
    /// Inventory gathering found no such resource
    Absent,
    /// The run was cancelled before the node was decided
    Cancelled,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Provider { message } => write!(f, "provider error: {}", message),
            FailureReason::RetriesExhausted { attempts, message } => {
                write!(f, "gave up after {} attempts: {}", attempts, message)
            }
            FailureReason::DependencyFailed { upstream } => {
                write!(f, "skipped, dependency '{}' failed", upstream)
            }
            FailureReason::Absent => write!(f, "resource does not exist"),
            FailureReason::Cancelled => write!(f, "run cancelled"),
        }
    }
}

/// Terminal outcome of a single node
#[derive(Debug, Clone, Serialize)]
pub struct ProvisioningResult {
    pub node: NodeId,
    pub state: NodeState,
    /// Provider-assigned attributes; `None` for failed and external nodes
    pub attributes: Option<ProviderAttributes>,
    pub error: Option<FailureReason>,
    /// Provider attempts made (0 when never attempted)
    pub attempts: u32,
    /// The resource already existed and was adopted without `create`
    pub reused: bool,
    /// Pre-provisioned host; no provider involved
    pub external: bool,
}

impl ProvisioningResult {
    pub fn is_provisioned(&self) -> bool {
        self.state == NodeState::Provisioned
    }

    /// Failed only because something upstream failed
    pub fn is_skipped(&self) -> bool {
        matches!(self.error, Some(FailureReason::DependencyFailed { .. }))
    }
}

/// Full node → outcome map of one run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub results: BTreeMap<NodeId, ProvisioningResult>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub cancelled: bool,
}

impl RunReport {
    /// Success only if every node reached `Provisioned`
    pub fn is_success(&self) -> bool {
        self.results.values().all(ProvisioningResult::is_provisioned)
    }

    pub fn get(&self, node: &NodeId) -> Option<&ProvisioningResult> {
        self.results.get(node)
    }

    pub fn failed(&self) -> impl Iterator<Item = &ProvisioningResult> {
        self.results.values().filter(|r| !r.is_provisioned())
    }

    pub fn provisioned(&self) -> impl Iterator<Item = &ProvisioningResult> {
        self.results.values().filter(|r| r.is_provisioned())
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }

    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary::default();
        for result in self.results.values() {
            match (&result.state, &result.error) {
                (NodeState::Provisioned, _) if result.external => summary.external += 1,
                (NodeState::Provisioned, _) if result.reused => summary.reused += 1,
                (NodeState::Provisioned, _) => summary.created += 1,
                (_, Some(FailureReason::DependencyFailed { .. })) => summary.skipped += 1,
                (_, Some(FailureReason::Cancelled)) => summary.cancelled += 1,
                _ => summary.failed += 1,
            }
        }
        summary
    }
}

/// Counts per outcome
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub created: usize,
    pub reused: usize,
    pub external: usize,
    pub failed: usize,
    pub skipped: usize,
    pub cancelled: usize,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} created, {} reused, {} external, {} failed, {} skipped, {} cancelled",
            self.created, self.reused, self.external, self.failed, self.skipped, self.cancelled
        )
    }
}
