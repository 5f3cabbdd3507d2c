//! Deployment orchestration.
//!
//! Runs the phases in order: graph construction, cycle check, resolution
//! with realization, access-rule binding, and plan assembly. Every structural
//! problem is reported by [`Engine::prepare`] before any node is touched.

use chrono::Utc;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::config::ConfigHasher;
use crate::error::Result;
use crate::graph::{build_graph, plan, DependencyGraph, ExecutionOrder};
use crate::model::Stack;
use crate::plan::DeploymentPlan;
use crate::provider::Realizer;
use crate::resolver::{AccessRuleBinder, Resolver, DEFAULT_PARALLELISM};

/// A stack whose graph was built and ordered without realizing anything.
#[derive(Debug, Clone)]
pub struct PreparedStack {
    /// Dependency graph.
    pub graph: DependencyGraph,
    /// Creation order.
    pub order: ExecutionOrder,
    /// Hash of the declarations.
    pub config_hash: String,
}

/// Drives a stack from declarations to a concrete deployment plan.
#[derive(Clone)]
pub struct Engine {
    realizer: Arc<dyn Realizer>,
    parallelism: usize,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("provider", &self.realizer.provider_name())
            .field("parallelism", &self.parallelism)
            .finish()
    }
}

impl Engine {
    /// Creates an engine that realizes nodes through `realizer`.
    #[must_use]
    pub fn new(realizer: impl Realizer + 'static) -> Self {
        Self {
            realizer: Arc::new(realizer),
            parallelism: DEFAULT_PARALLELISM,
        }
    }

    /// Allows up to `parallelism` independent realizations at once.
    #[must_use]
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    /// Returns the realizer's provider name.
    #[must_use]
    pub fn provider_name(&self) -> &'static str {
        self.realizer.provider_name()
    }

    /// Returns the realizer's endpoint, if it has one.
    #[must_use]
    pub fn provider_target(&self) -> Option<String> {
        self.realizer.provider_target()
    }

    /// Builds and orders the graph without realizing anything.
    ///
    /// # Errors
    ///
    /// Returns the structural errors of graph construction and planning.
    pub fn prepare(&self, stack: &Stack) -> Result<PreparedStack> {
        let graph = build_graph(stack)?;
        let order = plan(&graph)?;
        let config_hash = ConfigHasher::new().hash_stack(stack);

        info!(
            "Prepared '{}': {} resources in {} waves",
            stack.name(),
            order.len(),
            order.waves().len()
        );

        Ok(PreparedStack {
            graph,
            order,
            config_hash,
        })
    }

    /// Realizes every node and returns the concrete deployment plan.
    ///
    /// # Errors
    ///
    /// Returns structural errors before anything is realized, and the first
    /// realization or resolution failure otherwise. Nodes realized before a
    /// failure are not rolled back.
    pub async fn deploy(&self, stack: &Stack) -> Result<DeploymentPlan> {
        let prepared = self.prepare(stack)?;

        let nodes = Resolver::new(Arc::clone(&self.realizer))
            .with_parallelism(self.parallelism)
            .resolve(stack, &prepared.graph, &prepared.order)
            .await?;

        let mut binder = AccessRuleBinder::new();
        binder.bind_all(prepared.graph.access_rules(), stack)?;

        let plan = DeploymentPlan {
            id: Uuid::new_v4(),
            stack: stack.name().to_string(),
            environment: stack.environment().to_string(),
            created_at: Utc::now(),
            config_hash: prepared.config_hash,
            provider: self.realizer.provider_name().to_string(),
            provider_target: self.realizer.provider_target(),
            nodes,
            access_rules: prepared.graph.access_rules().to_vec(),
            security: binder.into_config(),
        };

        info!(
            "Deployed '{}' ({}): {} resources, {} ingress rules",
            plan.stack,
            plan.environment,
            plan.len(),
            plan.security.ingress_count()
        );
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Parameters;
    use crate::error::{GraphError, StackError};
    use crate::model::{NodeHandle, NodeId, Permission, Properties, ResourceKind};
    use crate::provider::SimulatedRealizer;

    fn stack() -> Stack {
        let mut stack = Stack::new("demo", Parameters::default());
        let vpc = stack.declare(ResourceKind::Network, "vpc", Properties::new()).unwrap();
        let db = stack
            .declare(
                ResourceKind::DatabaseCluster,
                "database",
                [(String::from("vpc_id"), vpc.output("vpc_id"))].into_iter().collect(),
            )
            .unwrap();
        let svc = stack
            .declare(
                ResourceKind::ContainerService,
                "service",
                [(String::from("db"), db.output("socket_address"))].into_iter().collect(),
            )
            .unwrap();
        stack.allow_from(&db, &svc, Permission::all_traffic());
        stack
    }

    #[tokio::test]
    async fn test_deploy_produces_concrete_plan() {
        let stack = stack();
        let plan = Engine::new(SimulatedRealizer::new()).deploy(&stack).await.unwrap();

        assert_eq!(plan.order(), vec![&NodeId::from("vpc"), &NodeId::from("database"), &NodeId::from("service")]);
        assert_eq!(plan.provider, "simulated");
        let db_address = &plan.node("database").unwrap().outputs["socket_address"];
        assert_eq!(&plan.node("service").unwrap().properties["db"], db_address);
        assert_eq!(plan.security.ingress_count(), 1);
        assert_eq!(plan.config_hash, ConfigHasher::new().hash_stack(&stack));
    }

    #[tokio::test]
    async fn test_cycle_aborts_before_realization() {
        let mut stack = Stack::new("demo", Parameters::default());
        let b = NodeHandle::new(NodeId::from("b"), ResourceKind::Secret);
        let a = stack
            .declare(ResourceKind::Secret, "a", [(String::from("x"), b.output("v"))].into_iter().collect())
            .unwrap();
        stack
            .declare(ResourceKind::Secret, "b", [(String::from("y"), a.output("v"))].into_iter().collect())
            .unwrap();

        let err = Engine::new(SimulatedRealizer::new()).deploy(&stack).await.unwrap_err();
        assert!(matches!(err, StackError::Graph(GraphError::CyclicDependency { .. })));
        assert!(stack.nodes().iter().all(|n| !n.is_realized()));
    }

    #[test]
    fn test_prepare_reports_waves() {
        let prepared = Engine::new(SimulatedRealizer::new())
            .with_parallelism(4)
            .prepare(&stack())
            .unwrap();
        assert_eq!(prepared.order.waves().len(), 3);
        assert_eq!(prepared.graph.access_rules().len(), 1);
    }
}
