//! Resolution and realization of every node in a stack.
//!
//! A ready-queue scheduler drives the realizer. A node becomes ready once the
//! tasks of all its dependencies have completed and published their outputs;
//! task completion is the only barrier between a publisher and its readers.
//! At most `parallelism` realizations are in flight. With the default of one,
//! nodes are realized exactly in planner order.
//!
//! When a realization fails nothing new is started. Realizations already in
//! flight are allowed to finish, then the first failure is returned. Nodes
//! that were realized stay realized.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::task::{Id, JoinSet};
use tracing::{debug, info, warn};

use crate::error::{ResolveError, Result, StackError};
use crate::graph::{DependencyGraph, ExecutionOrder};
use crate::model::{Deferred, NodeId, ResourceNode, Stack};
use crate::plan::ResolvedNode;
use crate::provider::{Realizer, ResolvedProperties};

/// Default number of concurrent realizations.
pub const DEFAULT_PARALLELISM: usize = 1;

/// Published nodes a property bag may read from, keyed by identity.
pub type Sources = HashMap<NodeId, Arc<ResourceNode>>;

/// Realizes nodes in dependency order, substituting deferred values.
#[derive(Clone)]
pub struct Resolver {
    realizer: Arc<dyn Realizer>,
    parallelism: usize,
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("realizer", &self.realizer.provider_name())
            .field("parallelism", &self.parallelism)
            .finish()
    }
}

/// Bookkeeping for one node in planner order.
struct Slot {
    node: Arc<ResourceNode>,
    sources: Sources,
    depends_on: Vec<NodeId>,
    waiting_on: usize,
    dependents: Vec<usize>,
}

impl Resolver {
    /// Creates a sequential resolver.
    #[must_use]
    pub fn new(realizer: Arc<dyn Realizer>) -> Self {
        Self {
            realizer,
            parallelism: DEFAULT_PARALLELISM,
        }
    }

    /// Allows up to `parallelism` independent realizations at once.
    ///
    /// Zero is treated as one.
    #[must_use]
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    /// Returns the concurrency bound.
    #[must_use]
    pub const fn parallelism(&self) -> usize {
        self.parallelism
    }

    /// Realizes every node of `stack` and returns them in planner order.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyRealized` if the stack was deployed before,
    /// `RealizationFailed` for the first node whose realizer call failed, and
    /// the resolution errors of [`resolve_properties`].
    pub async fn resolve(
        &self,
        stack: &Stack,
        graph: &DependencyGraph,
        order: &ExecutionOrder,
    ) -> Result<Vec<ResolvedNode>> {
        let mut slots = build_slots(stack, graph, order)?;

        let mut ready: BTreeSet<usize> = slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.waiting_on == 0)
            .map(|(i, _)| i)
            .collect();
        let mut running: HashMap<Id, usize> = HashMap::new();
        let mut tasks = JoinSet::new();
        let mut resolved: Vec<Option<ResolvedProperties>> = vec![None; slots.len()];
        let mut failure: Option<ResolveError> = None;

        info!(
            "Realizing {} resources with {} ({} at a time)",
            slots.len(),
            self.realizer.provider_name(),
            self.parallelism
        );

        loop {
            while failure.is_none() && tasks.len() < self.parallelism {
                let Some(next) = ready.pop_first() else { break };
                let slot = &mut slots[next];
                let node = Arc::clone(&slot.node);
                let sources = std::mem::take(&mut slot.sources);
                let realizer = Arc::clone(&self.realizer);

                debug!("Starting {} '{}'", node.kind(), node.id());
                let handle = tasks.spawn(async move { realize_node(realizer.as_ref(), &node, &sources).await });
                running.insert(handle.id(), next);
            }

            let Some(joined) = tasks.join_next_with_id().await else {
                break;
            };

            match joined {
                Ok((id, Ok(properties))) => {
                    let Some(done) = running.remove(&id) else {
                        continue;
                    };
                    info!("Realized {} '{}'", slots[done].node.kind(), slots[done].node.id());
                    resolved[done] = Some(properties);
                    for dependent in std::mem::take(&mut slots[done].dependents) {
                        let slot = &mut slots[dependent];
                        slot.waiting_on -= 1;
                        if slot.waiting_on == 0 {
                            ready.insert(dependent);
                        }
                    }
                }
                Ok((id, Err(err))) => {
                    running.remove(&id);
                    record_failure(&mut failure, err, tasks.len());
                }
                Err(join_error) => {
                    let node = running
                        .remove(&join_error.id())
                        .map_or_else(|| NodeId::from("<unknown>"), |i| slots[i].node.id().clone());
                    let err = ResolveError::TaskAborted {
                        node,
                        message: join_error.to_string(),
                    };
                    record_failure(&mut failure, err, tasks.len());
                }
            }
        }

        if let Some(err) = failure {
            return Err(err.into());
        }

        slots
            .into_iter()
            .zip(resolved)
            .map(|(slot, done)| {
                let properties = done.ok_or_else(|| {
                    StackError::internal(format!("'{}' was never scheduled", slot.node.id()))
                })?;
                Ok(ResolvedNode {
                    identity: slot.node.id().clone(),
                    kind: slot.node.kind(),
                    properties,
                    outputs: slot.node.outputs()?.clone(),
                    depends_on: slot.depends_on,
                })
            })
            .collect()
    }
}

fn record_failure(failure: &mut Option<ResolveError>, err: ResolveError, in_flight: usize) {
    if failure.is_none() {
        warn!("{err}; draining {in_flight} in-flight realizations");
        *failure = Some(err);
    } else {
        warn!("Additional failure while draining: {err}");
    }
}

fn build_slots(stack: &Stack, graph: &DependencyGraph, order: &ExecutionOrder) -> Result<Vec<Slot>> {
    let positions = order.positions();
    let mut slots = Vec::with_capacity(order.len());

    for id in order.nodes() {
        let node = stack
            .node(id)
            .ok_or_else(|| StackError::internal(format!("planned node '{id}' is not in stack '{}'", stack.name())))?;
        if node.is_realized() {
            return Err(ResolveError::AlreadyRealized { node: id.clone() }.into());
        }

        let depends_on: Vec<NodeId> = graph.dependencies_of(id).into_iter().cloned().collect();
        let mut sources = Sources::new();
        for dependency in &depends_on {
            if let Some(source) = stack.node(dependency) {
                sources.insert(dependency.clone(), Arc::clone(source));
            }
        }

        slots.push(Slot {
            node: Arc::clone(node),
            sources,
            waiting_on: depends_on.len(),
            depends_on,
            dependents: Vec::new(),
        });
    }

    for i in 0..slots.len() {
        for dependency in slots[i].depends_on.clone() {
            let at = positions
                .get(&dependency)
                .copied()
                .ok_or_else(|| StackError::internal(format!("dependency '{dependency}' is not planned")))?;
            slots[at].dependents.push(i);
        }
    }

    Ok(slots)
}

async fn realize_node(
    realizer: &dyn Realizer,
    node: &ResourceNode,
    sources: &Sources,
) -> std::result::Result<ResolvedProperties, ResolveError> {
    let properties = resolve_properties(node, sources)?;

    let outputs = realizer
        .realize(node.id(), node.kind(), &properties)
        .await
        .map_err(|source| ResolveError::RealizationFailed {
            node: node.id().clone(),
            source,
        })?;

    node.publish(outputs)?;
    Ok(properties)
}

/// Substitutes every deferred value in a node's property bag.
///
/// # Errors
///
/// Returns `UnresolvedDependency` if a referenced source has not published,
/// `MissingOutput` if it published without the named output, and
/// `TransformFailed` if the output does not fit the reference's transform.
pub fn resolve_properties(
    node: &ResourceNode,
    sources: &Sources,
) -> std::result::Result<ResolvedProperties, ResolveError> {
    let mut lookup = |deferred: &Deferred| {
        let unresolved = || ResolveError::UnresolvedDependency {
            node: node.id().clone(),
            source_node: deferred.source.clone(),
        };
        let source = sources.get(&deferred.source).ok_or_else(unresolved)?;
        let outputs = source.outputs().map_err(|_| unresolved())?;
        let published = outputs
            .get(&deferred.output)
            .ok_or_else(|| ResolveError::MissingOutput {
                node: node.id().clone(),
                source_node: deferred.source.clone(),
                output: deferred.output.clone(),
            })?;

        deferred
            .apply(published)
            .map_err(|message| ResolveError::TransformFailed {
                node: node.id().clone(),
                source_node: deferred.source.clone(),
                output: deferred.output.clone(),
                message,
            })
    };

    node.properties()
        .iter()
        .map(|(key, value)| Ok((key.clone(), value.resolve_with(&mut lookup)?)))
        .collect()
}
