//! Topological planning over the dependency graph.
//!
//! Iterative depth-first traversal with a three-colour marker. Roots and dependencies
//! are visited in declaration order, so identical declarations always yield
//! the same order. Meeting a node that is still in progress means a cycle;
//! the participants are reported in cycle order and no partial order escapes.

use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

use crate::error::GraphError;
use crate::model::NodeId;

use super::builder::DependencyGraph;

/// A creation order in which every dependency precedes its dependents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionOrder {
    order: Vec<NodeId>,
    /// Wave index of each node in `order`.
    waves: Vec<usize>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Computes a creation order for the graph.
///
/// # Errors
///
/// Returns `CyclicDependency` naming the participants if the graph has a cycle.
pub fn plan(graph: &DependencyGraph) -> Result<ExecutionOrder, GraphError> {
    let mut marks = vec![Mark::Unvisited; graph.len()];
    let mut path = Vec::new();
    let mut order = Vec::with_capacity(graph.len());

    for root in 0..graph.len() {
        visit(graph, root, &mut marks, &mut path, &mut order)?;
    }

    // Dependencies always precede a node in `order`, so one forward pass suffices.
    let mut level = vec![0usize; graph.len()];
    for &node in &order {
        level[node] = graph
            .dependency_positions(node)
            .map(|dep| level[dep] + 1)
            .max()
            .unwrap_or(0);
    }

    let waves = order.iter().map(|&i| level[i]).collect();
    let order: Vec<NodeId> = order.into_iter().map(|i| graph.nodes()[i].clone()).collect();

    debug!("Planned creation order: {order:?}");
    Ok(ExecutionOrder { order, waves })
}

/// Iterative depth-first visit. Each frame keeps the node and the remaining
/// dependencies to walk, so chain depth never touches the thread stack.
fn visit(
    graph: &DependencyGraph,
    root: usize,
    marks: &mut [Mark],
    path: &mut Vec<usize>,
    order: &mut Vec<usize>,
) -> Result<(), GraphError> {
    if marks[root] != Mark::Unvisited {
        return Ok(());
    }

    marks[root] = Mark::InProgress;
    path.push(root);
    let mut frames = vec![graph.dependency_positions(root)];

    while let Some(pending) = frames.last_mut() {
        let Some(dependency) = pending.next() else {
            frames.pop();
            if let Some(node) = path.pop() {
                marks[node] = Mark::Done;
                order.push(node);
            }
            continue;
        };

        match marks[dependency] {
            Mark::Done => {}
            Mark::InProgress => {
                let start = path.iter().position(|&p| p == dependency).unwrap_or(0);
                let cycle = path[start..]
                    .iter()
                    .map(|&p| graph.nodes()[p].clone())
                    .collect();
                return Err(GraphError::CyclicDependency { cycle });
            }
            Mark::Unvisited => {
                marks[dependency] = Mark::InProgress;
                path.push(dependency);
                frames.push(graph.dependency_positions(dependency));
            }
        }
    }

    Ok(())
}

impl ExecutionOrder {
    /// Returns the nodes in creation order.
    #[must_use]
    pub fn nodes(&self) -> &[NodeId] {
        &self.order
    }

    /// Returns the number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns true if there is nothing to create.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Returns the position of a node in the creation order.
    #[must_use]
    pub fn index_of(&self, id: &NodeId) -> Option<usize> {
        self.order.iter().position(|n| n == id)
    }

    /// Returns the wave of a node: one more than the deepest of its dependencies.
    #[must_use]
    pub fn wave_of(&self, id: &NodeId) -> Option<usize> {
        self.index_of(id).map(|i| self.waves[i])
    }

    /// Groups nodes into waves. Nodes within a wave are mutually independent.
    #[must_use]
    pub fn waves(&self) -> Vec<Vec<NodeId>> {
        let count = self.waves.iter().max().map_or(0, |m| m + 1);
        let mut grouped = vec![Vec::new(); count];
        for (id, &wave) in self.order.iter().zip(&self.waves) {
            grouped[wave].push(id.clone());
        }
        grouped
    }

    /// Maps each node to its position in the creation order.
    #[must_use]
    pub fn positions(&self) -> HashMap<NodeId, usize> {
        self.order
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Parameters;
    use crate::graph::build_graph;
    use crate::model::{NodeHandle, Properties, ResourceKind, Stack, Value};
    use proptest::prelude::*;

    fn depends(on: &[&NodeHandle]) -> Properties {
        on.iter()
            .enumerate()
            .map(|(i, h)| (format!("ref{i}"), h.output("id")))
            .collect()
    }

    fn ids(order: &ExecutionOrder) -> Vec<&str> {
        order.nodes().iter().map(NodeId::as_str).collect()
    }

    #[test]
    fn test_network_database_cache_service() {
        let mut stack = Stack::new("test", Parameters::default());
        let net = stack.declare(ResourceKind::Network, "network", Properties::new()).unwrap();
        let db = stack.declare(ResourceKind::DatabaseCluster, "database", depends(&[&net])).unwrap();
        let cache = stack.declare(ResourceKind::CacheCluster, "cache", depends(&[&net])).unwrap();
        stack
            .declare(ResourceKind::ContainerService, "service", depends(&[&db, &cache]))
            .unwrap();

        let order = plan(&build_graph(&stack).unwrap()).unwrap();
        assert_eq!(ids(&order), vec!["network", "database", "cache", "service"]);
        assert_eq!(order.waves().len(), 3);
        assert_eq!(order.waves()[1], vec![NodeId::from("database"), NodeId::from("cache")]);
        assert_eq!(order.wave_of(&NodeId::from("service")), Some(2));
    }

    #[test]
    fn test_forward_reference_placed_first() {
        let mut stack = Stack::new("test", Parameters::default());
        let later = NodeHandle::new(NodeId::from("secret"), ResourceKind::Secret);
        stack
            .declare(ResourceKind::DatabaseCluster, "database", depends(&[&later]))
            .unwrap();
        stack.declare(ResourceKind::Secret, "secret", Properties::new()).unwrap();

        let order = plan(&build_graph(&stack).unwrap()).unwrap();
        assert_eq!(ids(&order), vec!["secret", "database"]);
    }

    #[test]
    fn test_independent_nodes_keep_declaration_order() {
        let mut stack = Stack::new("test", Parameters::default());
        for name in ["zeta", "alpha", "mid"] {
            stack.declare(ResourceKind::Secret, name, Properties::new()).unwrap();
        }

        let order = plan(&build_graph(&stack).unwrap()).unwrap();
        assert_eq!(ids(&order), vec!["zeta", "alpha", "mid"]);
        assert_eq!(order.waves().len(), 1);
    }

    #[test]
    fn test_cycle_reports_participants() {
        let mut stack = Stack::new("test", Parameters::default());
        let a = NodeHandle::new(NodeId::from("a"), ResourceKind::Secret);
        let b = NodeHandle::new(NodeId::from("b"), ResourceKind::Secret);
        let c = NodeHandle::new(NodeId::from("c"), ResourceKind::Secret);
        stack.declare(ResourceKind::Network, "root", Properties::new()).unwrap();
        stack.declare(ResourceKind::Secret, "a", depends(&[&b])).unwrap();
        stack.declare(ResourceKind::Secret, "b", depends(&[&c])).unwrap();
        stack.declare(ResourceKind::Secret, "c", depends(&[&a])).unwrap();

        let err = plan(&build_graph(&stack).unwrap()).unwrap_err();
        let GraphError::CyclicDependency { cycle } = err else {
            panic!("expected cycle, got {err}");
        };
        let names: Vec<&str> = cycle.iter().map(NodeId::as_str).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_explicit_edge_cycle_detected() {
        let mut stack = Stack::new("test", Parameters::default());
        let a = stack.declare(ResourceKind::Secret, "a", Properties::new()).unwrap();
        let b = stack.declare(ResourceKind::Secret, "b", depends(&[&a])).unwrap();
        stack.depends_on(&a, &b);

        assert!(matches!(
            plan(&build_graph(&stack).unwrap()),
            Err(GraphError::CyclicDependency { .. })
        ));
    }

    #[test]
    fn test_long_forward_chain_does_not_exhaust_the_stack() {
        const LENGTH: usize = 100_000;
        let mut stack = Stack::new("chain", Parameters::default());
        for i in 0..LENGTH {
            let mut props = Properties::new();
            if i + 1 < LENGTH {
                let next = NodeHandle::new(NodeId::new(format!("n{}", i + 1)), ResourceKind::Secret);
                props.insert(String::from("ref"), next.output("id"));
            }
            stack.declare(ResourceKind::Secret, format!("n{i}"), props).unwrap();
        }

        let order = plan(&build_graph(&stack).unwrap()).unwrap();
        assert_eq!(order.len(), LENGTH);
        assert_eq!(order.nodes()[0].as_str(), format!("n{}", LENGTH - 1));
        assert_eq!(order.nodes()[LENGTH - 1].as_str(), "n0");
        assert_eq!(order.waves().len(), LENGTH);
    }

    #[test]
    fn test_long_forward_cycle_is_reported() {
        const LENGTH: usize = 50_000;
        let mut stack = Stack::new("ring", Parameters::default());
        for i in 0..LENGTH {
            let next = NodeHandle::new(NodeId::new(format!("n{}", (i + 1) % LENGTH)), ResourceKind::Secret);
            let mut props = Properties::new();
            props.insert(String::from("ref"), next.output("id"));
            stack.declare(ResourceKind::Secret, format!("n{i}"), props).unwrap();
        }

        let err = plan(&build_graph(&stack).unwrap()).unwrap_err();
        let GraphError::CyclicDependency { cycle } = err else {
            panic!("expected cycle, got {err}");
        };
        assert_eq!(cycle.len(), LENGTH);
        assert_eq!(cycle[0].as_str(), "n0");
    }

    /// Node count, a declaration order, and an edge mask over `i < j` pairs.
    fn acyclic_layout() -> impl Strategy<Value = (usize, Vec<usize>, Vec<bool>)> {
        (2usize..14).prop_flat_map(|size| {
            (
                Just(size),
                Just((0..size).collect::<Vec<_>>()).prop_shuffle(),
                proptest::collection::vec(proptest::bool::weighted(0.35), size * size),
            )
        })
    }

    proptest! {
        #[test]
        fn test_random_acyclic_graphs_respect_edges((size, declare_order, mask) in acyclic_layout()) {
            let mut stack = Stack::new("random", Parameters::default());
            let handles: Vec<NodeHandle> = (0..size)
                .map(|i| NodeHandle::new(NodeId::new(format!("n{i}")), ResourceKind::Secret))
                .collect();

            // Edges only point from lower to higher index.
            for &i in &declare_order {
                let mut props = Properties::new();
                for j in (i + 1)..size {
                    if mask[i * size + j] {
                        props.insert(format!("d{j}"), handles[j].output("id"));
                    }
                }
                props.insert(String::from("literal"), Value::from("x"));
                stack.declare(ResourceKind::Secret, format!("n{i}"), props).unwrap();
            }

            let graph = build_graph(&stack).unwrap();
            let order = plan(&graph).unwrap();
            let positions = order.positions();
            prop_assert_eq!(order.len(), size);
            for edge in graph.edges() {
                prop_assert!(positions[&edge.dependency] < positions[&edge.dependent]);
                prop_assert!(order.wave_of(&edge.dependency) < order.wave_of(&edge.dependent));
            }
        }
    }
}
