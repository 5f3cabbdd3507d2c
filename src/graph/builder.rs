//! Dependency graph construction.
//!
//! The graph is rebuilt from the full set of declarations: every deferred
//! value found in a node's property bag contributes an edge from the owning
//! node to the value's source, and explicit `depends_on` edges are added the
//! same way. Access rules are validated and kept as a separate edge set; they
//! are bound after realization and therefore never constrain ordering.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use crate::error::GraphError;
use crate::model::{AccessRule, NodeId, Stack};

/// How an ordering edge came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeOrigin {
    /// A deferred value inside the dependent's properties.
    Inferred,
    /// A `depends_on` declaration.
    Explicit,
}

/// A directed ordering edge: `dependent` needs `dependency` realized first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Edge {
    /// The node that waits.
    pub dependent: NodeId,
    /// The node that must be realized first.
    pub dependency: NodeId,
    /// Where the edge came from.
    pub origin: EdgeOrigin,
}

/// Nodes plus directed dependency edges, in declaration order.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    nodes: Vec<NodeId>,
    positions: HashMap<NodeId, usize>,
    /// Per dependent, its dependencies keyed by declaration position.
    dependencies: Vec<BTreeMap<usize, EdgeOrigin>>,
    access_rules: Vec<AccessRule>,
}

/// Builds the dependency graph of a stack.
///
/// # Errors
///
/// Returns `SelfDependency` when a node references itself (through a property,
/// an explicit edge, or an access rule) and `UnknownNode` when it references an
/// identity the stack never declared.
pub fn build_graph(stack: &Stack) -> Result<DependencyGraph, GraphError> {
    let mut graph = DependencyGraph::with_nodes(stack.nodes().iter().map(|n| n.id().clone()));

    for node in stack.nodes() {
        let mut refs = Vec::new();
        for value in node.properties().values() {
            value.collect_references(&mut refs);
        }
        for reference in refs {
            graph.add_edge(node.id(), &reference.source, EdgeOrigin::Inferred)?;
        }
    }

    for (dependent, dependency) in stack.explicit_edges() {
        graph.add_edge(dependent, dependency, EdgeOrigin::Explicit)?;
    }

    for rule in stack.access_rules() {
        graph.add_access_rule(rule)?;
    }

    debug!(
        "Built dependency graph: {} nodes, {} edges, {} access rules",
        graph.len(),
        graph.edge_count(),
        graph.access_rules.len()
    );

    Ok(graph)
}

impl DependencyGraph {
    fn with_nodes(ids: impl Iterator<Item = NodeId>) -> Self {
        let nodes: Vec<NodeId> = ids.collect();
        let positions = nodes
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();
        let dependencies = vec![BTreeMap::new(); nodes.len()];

        Self {
            nodes,
            positions,
            dependencies,
            access_rules: Vec::new(),
        }
    }

    fn resolve_endpoint(&self, referrer: &NodeId, id: &NodeId) -> Result<usize, GraphError> {
        self.positions
            .get(id)
            .copied()
            .ok_or_else(|| GraphError::UnknownNode {
                node: referrer.clone(),
                missing: id.clone(),
            })
    }

    fn add_edge(&mut self, dependent: &NodeId, dependency: &NodeId, origin: EdgeOrigin) -> Result<(), GraphError> {
        let from = self.resolve_endpoint(dependent, dependent)?;
        if dependent == dependency {
            return Err(GraphError::SelfDependency {
                node: dependent.clone(),
            });
        }
        let to = self.resolve_endpoint(dependent, dependency)?;

        self.dependencies[from].entry(to).or_insert(origin);
        Ok(())
    }

    fn add_access_rule(&mut self, rule: &AccessRule) -> Result<(), GraphError> {
        self.resolve_endpoint(&rule.source, &rule.target)?;
        self.resolve_endpoint(&rule.target, &rule.source)?;
        if rule.target == rule.source {
            return Err(GraphError::SelfDependency {
                node: rule.target.clone(),
            });
        }

        if !self.access_rules.contains(rule) {
            self.access_rules.push(rule.clone());
        }
        Ok(())
    }

    /// Returns node identities in declaration order.
    #[must_use]
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    /// Returns the number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns the declaration position of a node.
    #[must_use]
    pub fn position(&self, id: &NodeId) -> Option<usize> {
        self.positions.get(id).copied()
    }

    /// Returns the direct dependencies of a node, in declaration order.
    #[must_use]
    pub fn dependencies_of(&self, id: &NodeId) -> Vec<&NodeId> {
        self.position(id)
            .map(|i| self.dependency_positions(i).map(|d| &self.nodes[d]).collect())
            .unwrap_or_default()
    }

    /// Returns the nodes that directly depend on `id`, in declaration order.
    #[must_use]
    pub fn dependents_of(&self, id: &NodeId) -> Vec<&NodeId> {
        let Some(target) = self.position(id) else {
            return Vec::new();
        };
        self.dependencies
            .iter()
            .enumerate()
            .filter(|(_, deps)| deps.contains_key(&target))
            .map(|(i, _)| &self.nodes[i])
            .collect()
    }

    /// Returns every ordering edge.
    #[must_use]
    pub fn edges(&self) -> Vec<Edge> {
        self.dependencies
            .iter()
            .enumerate()
            .flat_map(|(from, deps)| {
                deps.iter().map(move |(&to, &origin)| Edge {
                    dependent: self.nodes[from].clone(),
                    dependency: self.nodes[to].clone(),
                    origin,
                })
            })
            .collect()
    }

    /// Returns the number of ordering edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.dependencies.iter().map(BTreeMap::len).sum()
    }

    /// Returns the validated access rules, without duplicates.
    #[must_use]
    pub fn access_rules(&self) -> &[AccessRule] {
        &self.access_rules
    }

    pub(crate) fn dependency_positions(&self, position: usize) -> impl Iterator<Item = usize> + '_ {
        self.dependencies[position].keys().copied()
    }
}
