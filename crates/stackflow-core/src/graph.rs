//! Dependency graph
//!
//! Edges are discovered implicitly: every string found anywhere inside a
//! resource's attributes is matched against the names of resources in the
//! categories that resource is allowed to reference. A match creates an edge
//! from the referencing (dependent) resource to the referenced one.

use crate::error::{Result, StackError};
use crate::model::{NodeId, ResourceCategory, ResourceDefinition, StackConfig};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::fmt;
use tracing::{debug, instrument};

/// Categories a resource of `category` may depend on
pub fn reference_targets(category: ResourceCategory) -> &'static [ResourceCategory] {
    use ResourceCategory::*;
    match category {
        Servers => &[SecurityGroups, Buckets, Queues, Databases],
        Databases => &[SecurityGroups],
        LoadBalancers => &[Servers, SecurityGroups],
        SecurityGroups => &[SecurityGroups],
        Queues | Buckets => &[],
    }
}

/// Provisioning state of a graph node
///
/// `Pending → Provisioning → Provisioned | Failed`, plus `Pending → Failed`
/// for nodes that are skipped or cancelled before their first attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Pending,
    Provisioning,
    Provisioned,
    Failed,
}

impl NodeState {
    pub fn can_transition_to(self, next: NodeState) -> bool {
        matches!(
            (self, next),
            (NodeState::Pending, NodeState::Provisioning)
                | (NodeState::Pending, NodeState::Failed)
                | (NodeState::Provisioning, NodeState::Provisioned)
                | (NodeState::Provisioning, NodeState::Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, NodeState::Provisioned | NodeState::Failed)
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeState::Pending => "pending",
            NodeState::Provisioning => "provisioning",
            NodeState::Provisioned => "provisioned",
            NodeState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A resource together with its derived edges
#[derive(Debug, Clone)]
pub struct DependencyNode {
    pub id: NodeId,
    pub definition: ResourceDefinition,
    /// Nodes this one references
    pub dependencies: BTreeSet<NodeId>,
    /// Nodes referencing this one
    pub dependents: BTreeSet<NodeId>,
}

impl DependencyNode {
    pub fn provider(&self) -> Option<&str> {
        self.definition.provider.as_deref()
    }

    /// Pre-provisioned servers are leaves that never reach a provider
    pub fn needs_provisioning(&self) -> bool {
        !self.definition.is_pre_provisioned()
    }
}

/// Acyclic graph of every resource in a stack
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    stack_name: String,
    nodes: BTreeMap<NodeId, DependencyNode>,
}

impl DependencyGraph {
    /// Derive the graph from a loaded stack, rejecting dependency cycles
    #[instrument(skip(stack), fields(stack = %stack.name))]
    pub fn build(stack: &StackConfig) -> Result<Self> {
        let mut nodes: BTreeMap<NodeId, DependencyNode> = stack
            .all_resources()
            .map(|def| {
                let node = DependencyNode {
                    id: def.id(),
                    definition: def.clone(),
                    dependencies: BTreeSet::new(),
                    dependents: BTreeSet::new(),
                };
                (node.id.clone(), node)
            })
            .collect();

        // a server class name stands for every instance cloned from it
        let mut referable: BTreeMap<(ResourceCategory, &str), Vec<NodeId>> = BTreeMap::new();
        for def in stack.all_resources() {
            referable
                .entry((def.category, def.name.as_str()))
                .or_default()
                .push(def.id());
            if let Some(class) = &def.server_class {
                referable
                    .entry((def.category, class.as_str()))
                    .or_default()
                    .push(def.id());
            }
        }

        let mut edges = Vec::new();
        // pre-provisioned hosts are leaves; they are only ever referenced
        for def in stack.all_resources().filter(|def| !def.is_pre_provisioned()) {
            let mut strings = Vec::new();
            for value in def.attributes.values() {
                collect_strings(value, &mut strings);
            }

            let from = def.id();
            for target in reference_targets(def.category) {
                for s in &strings {
                    let Some(ids) = referable.get(&(*target, *s)) else {
                        continue;
                    };
                    for to in ids {
                        if *to != from {
                            edges.push((from.clone(), to.clone()));
                        }
                    }
                }
            }
        }

        for (from, to) in edges {
            if let Some(node) = nodes.get_mut(&from) {
                node.dependencies.insert(to.clone());
            }
            if let Some(node) = nodes.get_mut(&to) {
                node.dependents.insert(from);
            }
        }

        let graph = Self {
            stack_name: stack.name.clone(),
            nodes,
        };
        graph.check_acyclic()?;

        debug!(
            nodes = graph.len(),
            edges = graph.edge_count(),
            "Dependency graph built"
        );
        Ok(graph)
    }

    pub fn stack_name(&self) -> &str {
        &self.stack_name
    }

    pub fn node(&self, id: &NodeId) -> Option<&DependencyNode> {
        self.nodes.get(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &DependencyNode> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.nodes.values().map(|n| n.dependencies.len()).sum()
    }

    pub fn dependencies_of(&self, id: &NodeId) -> impl Iterator<Item = &NodeId> {
        self.nodes
            .get(id)
            .into_iter()
            .flat_map(|n| n.dependencies.iter())
    }

    pub fn dependents_of(&self, id: &NodeId) -> impl Iterator<Item = &NodeId> {
        self.nodes
            .get(id)
            .into_iter()
            .flat_map(|n| n.dependents.iter())
    }

    /// Every node that depends on `id`, directly or through other nodes
    pub fn transitive_dependents(&self, id: &NodeId) -> BTreeSet<NodeId> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<&NodeId> = self.dependents_of(id).collect();
        while let Some(next) = queue.pop_front() {
            if seen.insert(next.clone()) {
                queue.extend(self.dependents_of(next));
            }
        }
        seen
    }

    /// Topological levels: every node's dependencies live in earlier stages.
    /// Nodes inside a stage are sorted by id and carry no mutual ordering.
    pub fn stages(&self) -> Vec<Vec<NodeId>> {
        let mut in_degree: HashMap<&NodeId, usize> = self
            .nodes
            .iter()
            .map(|(id, node)| (id, node.dependencies.len()))
            .collect();

        let mut current: Vec<&NodeId> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(id, _)| *id)
            .collect();
        current.sort();

        let mut stages = Vec::new();
        while !current.is_empty() {
            let mut next = Vec::new();
            for id in &current {
                for dependent in self.dependents_of(id) {
                    if let Some(degree) = in_degree.get_mut(dependent) {
                        *degree -= 1;
                        if *degree == 0 {
                            next.push(dependent);
                        }
                    }
                }
            }
            next.sort();
            stages.push(current.into_iter().cloned().collect());
            current = next;
        }
        stages
    }

    /// One valid provisioning order (stages flattened)
    pub fn topological_order(&self) -> Vec<NodeId> {
        self.stages().into_iter().flatten().collect()
    }

    fn check_acyclic(&self) -> Result<()> {
        let mut colours: HashMap<&NodeId, Colour> =
            self.nodes.keys().map(|id| (id, Colour::White)).collect();
        let mut path = Vec::new();

        for id in self.nodes.keys() {
            if colours.get(id) == Some(&Colour::White) {
                if let Some(cycle) = self.visit(id, &mut colours, &mut path) {
                    return Err(StackError::DependencyCycle { cycle });
                }
            }
        }
        Ok(())
    }

    fn visit<'a>(
        &'a self,
        id: &'a NodeId,
        colours: &mut HashMap<&'a NodeId, Colour>,
        path: &mut Vec<&'a NodeId>,
    ) -> Option<Vec<String>> {
        colours.insert(id, Colour::Grey);
        path.push(id);

        for dep in self.dependencies_of(id) {
            match colours.get(dep).copied() {
                Some(Colour::Grey) => {
                    // back edge: the cycle runs from `dep` to the top of the path
                    let start = path.iter().position(|p| *p == dep).unwrap_or(0);
                    let mut cycle: Vec<String> =
                        path[start..].iter().map(|p| p.to_string()).collect();
                    cycle.push(dep.to_string());
                    return Some(cycle);
                }
                Some(Colour::White) => {
                    if let Some(cycle) = self.visit(dep, colours, path) {
                        return Some(cycle);
                    }
                }
                _ => {}
            }
        }

        path.pop();
        colours.insert(id, Colour::Black);
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Colour {
    White,
    Grey,
    Black,
}

/// Collect every string scalar inside a (possibly nested) value
fn collect_strings<'a>(value: &'a Value, out: &mut Vec<&'a str>) {
    match value {
        Value::String(s) => out.push(s),
        Value::Array(items) => items.iter().for_each(|item| collect_strings(item, out)),
        Value::Object(map) => map.values().for_each(|item| collect_strings(item, out)),
        _ => {}
    }
}
