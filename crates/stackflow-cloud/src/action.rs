//! Dry-run plan types

use serde::{Deserialize, Serialize};
use stackflow_core::NodeId;

/// Represents a planned action for a stack resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    /// Graph node this action belongs to
    pub node: NodeId,

    /// Type of action to perform
    pub action_type: ActionType,

    /// Provider handling the resource (`None` for pre-provisioned hosts)
    pub provider: Option<String>,

    /// Topological stage; actions in the same stage may run concurrently
    pub stage: usize,

    /// Description of the action
    pub description: String,
}

/// Type of action to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Create a new resource
    Create,
    /// Adopt a resource that already exists
    Reuse,
    /// Pre-provisioned host, nothing to do
    External,
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionType::Create => write!(f, "create"),
            ActionType::Reuse => write!(f, "reuse"),
            ActionType::External => write!(f, "external"),
        }
    }
}

/// Plan containing all actions, in stage order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    /// List of actions to perform
    pub actions: Vec<Action>,

    /// Whether the plan would create anything
    pub has_changes: bool,
}

impl Plan {
    pub fn new(actions: Vec<Action>) -> Self {
        let has_changes = actions.iter().any(|a| a.action_type == ActionType::Create);
        Self {
            actions,
            has_changes,
        }
    }

    pub fn empty() -> Self {
        Self {
            actions: Vec::new(),
            has_changes: false,
        }
    }

    /// Get actions by type
    pub fn actions_by_type(&self, action_type: ActionType) -> Vec<&Action> {
        self.actions
            .iter()
            .filter(|a| a.action_type == action_type)
            .collect()
    }

    pub fn action_for(&self, node: &NodeId) -> Option<&Action> {
        self.actions.iter().find(|a| &a.node == node)
    }

    /// Summary of the plan
    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            create: self.actions_by_type(ActionType::Create).len(),
            reuse: self.actions_by_type(ActionType::Reuse).len(),
            external: self.actions_by_type(ActionType::External).len(),
        }
    }
}

/// Summary of planned actions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanSummary {
    pub create: usize,
    pub reuse: usize,
    pub external: usize,
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to create, {} to reuse, {} external",
            self.create, self.reuse, self.external
        )
    }
}
