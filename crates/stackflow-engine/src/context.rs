//! Run context
//!
//! Owns the mutable state of every node for the duration of one run. Each
//! node sits behind its own mutex; every state change goes through
//! [`RunContext::transition`], which rejects moves the state machine does
//! not allow.

use crate::error::{EngineError, Result};
use crate::result::{FailureReason, ProvisioningResult};
use stackflow_cloud::ProviderAttributes;
use stackflow_core::{DependencyGraph, NodeId, NodeState};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug)]
struct NodeSlot {
    state: NodeState,
    /// Dependencies not yet `Provisioned`
    remaining: usize,
    dependents: Vec<NodeId>,
    attempts: u32,
    attributes: Option<ProviderAttributes>,
    failure: Option<FailureReason>,
    reused: bool,
    external: bool,
}

#[derive(Debug)]
pub struct RunContext {
    slots: HashMap<NodeId, Mutex<NodeSlot>>,
}

impl RunContext {
    pub fn new(graph: &DependencyGraph) -> Self {
        let slots = graph
            .nodes()
            .map(|node| {
                let slot = NodeSlot {
                    state: NodeState::Pending,
                    remaining: node.dependencies.len(),
                    dependents: node.dependents.iter().cloned().collect(),
                    attempts: 0,
                    attributes: None,
                    failure: None,
                    reused: false,
                    external: !node.needs_provisioning(),
                };
                (node.id.clone(), Mutex::new(slot))
            })
            .collect();
        Self { slots }
    }

    fn slot(&self, id: &NodeId) -> Result<MutexGuard<'_, NodeSlot>> {
        self.slots
            .get(id)
            .map(|slot| slot.lock().unwrap_or_else(PoisonError::into_inner))
            .ok_or_else(|| EngineError::UnknownNode(id.clone()))
    }

    pub fn state(&self, id: &NodeId) -> Option<NodeState> {
        self.slot(id).ok().map(|slot| slot.state)
    }

    pub fn attempts(&self, id: &NodeId) -> u32 {
        self.slot(id).map(|slot| slot.attempts).unwrap_or(0)
    }

    /// Nodes with no dependencies, sorted by id
    pub fn initially_ready(&self) -> Vec<NodeId> {
        let mut ready: Vec<NodeId> = self
            .slots
            .iter()
            .filter(|(_, slot)| {
                let slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
                slot.state == NodeState::Pending && slot.remaining == 0
            })
            .map(|(id, _)| id.clone())
            .collect();
        ready.sort();
        ready
    }

    /// Move `id` to `next`, failing if the state machine forbids it
    pub fn transition(&self, id: &NodeId, next: NodeState) -> Result<NodeState> {
        let mut slot = self.slot(id)?;
        Self::apply(id, &mut slot, next)
    }

    fn apply(id: &NodeId, slot: &mut NodeSlot, next: NodeState) -> Result<NodeState> {
        let previous = slot.state;
        if !previous.can_transition_to(next) {
            return Err(EngineError::IllegalTransition {
                node: id.clone(),
                from: previous,
                to: next,
            });
        }
        slot.state = next;
        Ok(previous)
    }

    /// Start an attempt and return its number (1-based). A node waiting for
    /// a retry is already `Provisioning` and stays there.
    pub fn begin_attempt(&self, id: &NodeId) -> Result<u32> {
        let mut slot = self.slot(id)?;
        if slot.state != NodeState::Provisioning {
            Self::apply(id, &mut slot, NodeState::Provisioning)?;
        }
        slot.attempts += 1;
        Ok(slot.attempts)
    }

    /// Mark `id` provisioned and return the dependents that just became ready
    pub fn complete(
        &self,
        id: &NodeId,
        attributes: Option<ProviderAttributes>,
        reused: bool,
    ) -> Result<Vec<NodeId>> {
        let dependents = {
            let mut slot = self.slot(id)?;
            Self::apply(id, &mut slot, NodeState::Provisioned)?;
            slot.attributes = attributes;
            slot.reused = reused;
            slot.dependents.clone()
        };

        let mut ready = Vec::new();
        for dependent in dependents {
            let mut slot = self.slot(&dependent)?;
            slot.remaining = slot.remaining.saturating_sub(1);
            if slot.remaining == 0 && slot.state == NodeState::Pending {
                ready.push(dependent.clone());
            }
        }
        Ok(ready)
    }

    /// Pre-provisioned hosts go straight through without a provider call
    pub fn complete_external(&self, id: &NodeId) -> Result<Vec<NodeId>> {
        self.transition(id, NodeState::Provisioning)?;
        self.complete(id, None, false)
    }

    /// Mark an attempted node as failed
    pub fn fail(&self, id: &NodeId, reason: FailureReason) -> Result<()> {
        let mut slot = self.slot(id)?;
        Self::apply(id, &mut slot, NodeState::Failed)?;
        slot.failure = Some(reason);
        Ok(())
    }

    /// Fail a never-attempted node because `upstream` failed. Returns
    /// `false` when the node was already decided.
    pub fn skip(&self, id: &NodeId, upstream: &NodeId) -> Result<bool> {
        let mut slot = self.slot(id)?;
        if slot.state != NodeState::Pending {
            return Ok(false);
        }
        Self::apply(id, &mut slot, NodeState::Failed)?;
        slot.failure = Some(FailureReason::DependencyFailed {
            upstream: upstream.clone(),
        });
        Ok(true)
    }

    /// Fail every node that is not yet terminal; decided nodes keep their
    /// state. Returns the abandoned nodes.
    pub fn abandon_undecided(&self, reason: FailureReason) -> Vec<NodeId> {
        let mut abandoned = Vec::new();
        for (id, slot) in &self.slots {
            let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
            if !slot.state.is_terminal() {
                slot.state = NodeState::Failed;
                slot.failure = Some(reason.clone());
                abandoned.push(id.clone());
            }
        }
        abandoned.sort();
        abandoned
    }

    pub fn into_results(self) -> BTreeMap<NodeId, ProvisioningResult> {
        self.slots
            .into_iter()
            .map(|(id, slot)| {
                let slot = slot.into_inner().unwrap_or_else(PoisonError::into_inner);
                let result = ProvisioningResult {
                    node: id.clone(),
                    state: slot.state,
                    attributes: slot.attributes,
                    error: slot.failure,
                    attempts: slot.attempts,
                    reused: slot.reused,
                    external: slot.external,
                };
                (id, result)
            })
            .collect()
    }
}
