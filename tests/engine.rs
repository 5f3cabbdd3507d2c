//! End-to-end deployments through the public API.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::Value as Json;
use tempfile::TempDir;

use stackweave::config::{ConfigParser, Parameters, build_stack};
use stackweave::error::{ConfigError, GraphError, ProviderError, ResolveError, StackError};
use stackweave::model::{NodeId, Outputs, ResourceKind};
use stackweave::provider::{HttpRealizer, Realizer, ResolvedProperties, SimulatedRealizer};
use stackweave::stacks::{self, botpress};
use stackweave::state::{DeploymentRecord, LocalPlanStore, PlanStore};
use stackweave::{DeploymentPlan, Engine};

/// Delegates to the simulated realizer and counts calls.
#[derive(Default)]
struct CountingRealizer {
    inner: SimulatedRealizer,
    calls: AtomicUsize,
}

#[async_trait]
impl Realizer for CountingRealizer {
    async fn realize(
        &self,
        identity: &NodeId,
        kind: ResourceKind,
        properties: &ResolvedProperties,
    ) -> Result<Outputs, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.realize(identity, kind, properties).await
    }

    fn provider_name(&self) -> &'static str {
        "counting"
    }
}

fn botpress_parameters() -> Parameters {
    Parameters::new()
        .with(botpress::DOMAIN_NAME, "bot.example.com")
        .with(botpress::LICENSE_KEY, "license-123")
}

fn output<'a>(plan: &'a DeploymentPlan, node: &str, name: &str) -> &'a Json {
    &plan.node(node).expect("node in plan").outputs[name]
}

fn container_env<'a>(plan: &'a DeploymentPlan, name: &str) -> &'a Json {
    &plan.node("task-definition").expect("task in plan").properties["containers"][0]["environment"][name]
}

#[tokio::test]
async fn botpress_database_url_is_fully_concrete() {
    let stack = stacks::builtin("botpress", &botpress_parameters()).unwrap();
    let plan = Engine::new(SimulatedRealizer::new()).deploy(&stack).await.unwrap();

    let secret: Json = serde_json::from_str(output(&plan, "db-secret", "secret_string").as_str().unwrap()).unwrap();
    let password = secret["password"].as_str().unwrap();
    let socket = output(&plan, "database", "socket_address").as_str().unwrap();

    assert_eq!(password.len(), 30);
    assert_eq!(
        container_env(&plan, "DATABASE_URL"),
        &Json::String(format!("postgres://clusteradmin:{password}@{socket}/botpressdb"))
    );

    let redis_host = output(&plan, "redis", "endpoint_address").as_str().unwrap();
    assert_eq!(
        container_env(&plan, "REDIS_URL"),
        &Json::String(format!("redis://{redis_host}:6379"))
    );
    assert_eq!(
        container_env(&plan, "BP_MODULE_NLU_DUCKLINGURL"),
        &Json::String(String::from(r#"[{"endpoint":"http://localhost:8000"}]"#))
    );
    assert_eq!(
        plan.node("database").unwrap().properties["master_password"],
        Json::String(password.to_string())
    );
}

#[tokio::test]
async fn botpress_binds_service_into_database_and_cache_groups() {
    let stack = stacks::builtin("botpress", &botpress_parameters()).unwrap();
    let plan = Engine::new(SimulatedRealizer::new()).deploy(&stack).await.unwrap();

    let service_group = output(&plan, "service", "security_group_id").as_str().unwrap();
    for target in ["database", "redis-security-group"] {
        let group = plan.security.group(&NodeId::from(target)).expect("group bound");
        assert_eq!(group.ingress.len(), 1);
        let rule = group.ingress.iter().next().unwrap();
        assert_eq!(rule.source.as_str(), "service");
        assert_eq!(rule.source_group_id, service_group);
    }
}

#[test]
fn missing_license_is_rejected_at_declaration() {
    let parameters = Parameters::new().with(botpress::DOMAIN_NAME, "bot.example.com");

    let err = stacks::builtin("botpress", &parameters).unwrap_err();
    assert!(matches!(
        err,
        StackError::Config(ConfigError::MissingConfiguration { ref name }) if name == "BP_LICENSE_KEY"
    ));
    assert!(stacks::builtin("botpress", &parameters.with(botpress::LICENSE_KEY, "license-123")).is_ok());
}

#[tokio::test]
async fn parallel_deploy_matches_sequential() {
    let stack_a = stacks::builtin("botpress", &botpress_parameters()).unwrap();
    let stack_b = stacks::builtin("botpress", &botpress_parameters()).unwrap();

    let sequential = Engine::new(SimulatedRealizer::new()).deploy(&stack_a).await.unwrap();
    let parallel = Engine::new(SimulatedRealizer::new())
        .with_parallelism(4)
        .deploy(&stack_b)
        .await
        .unwrap();

    assert_eq!(sequential.order(), parallel.order());
    assert_eq!(sequential.nodes, parallel.nodes);
    assert_eq!(sequential.security, parallel.security);
}

#[tokio::test]
async fn init_template_deploys_end_to_end() {
    let config = ConfigParser::new()
        .parse_yaml(include_str!("../templates/stack.yaml"), None)
        .unwrap();
    let parameters = Parameters::new()
        .with("DOMAIN_NAME", "app.example.com")
        .with("IMAGE", "nginx:1.27");
    let stack = build_stack(&config, parameters).unwrap();

    let plan = Engine::new(SimulatedRealizer::new())
        .with_parallelism(config.provider.parallelism)
        .deploy(&stack)
        .await
        .unwrap();

    let order: Vec<&str> = plan.order().into_iter().map(NodeId::as_str).collect();
    assert_eq!(order[0], "vpc");
    assert_eq!(order.last(), Some(&"load-balancer"));

    let env = &plan.node("task").unwrap().properties["containers"][0]["environment"];
    assert_eq!(env["EXTERNAL_URL"], "https://app.example.com");
    assert_eq!(env["UPSTREAMS"], r#"[{"endpoint":"http://localhost:3100"}]"#);
    assert!(
        env["DATABASE_URL"]
            .as_str()
            .unwrap()
            .ends_with(&format!("@{}/appdb", output(&plan, "database", "socket_address").as_str().unwrap()))
    );
    assert_eq!(plan.node("task").unwrap().properties["containers"][0]["image"], "nginx:1.27");
    assert_eq!(plan.security.ingress_count(), 1);
}

#[tokio::test]
async fn yaml_cycle_is_rejected_without_realization() {
    let yaml = r"
stack:
  name: loop
resources:
  - name: a
    kind: security-group
    properties:
      peer: ${b.security_group_id}
  - name: b
    kind: security-group
    properties:
      peer: ${a.security_group_id}
";
    let config = ConfigParser::new().parse_yaml(yaml, None).unwrap();
    let stack = build_stack(&config, Parameters::new()).unwrap();
    let realizer = Arc::new(CountingRealizer::default());

    let err = Engine::new(Arc::clone(&realizer)).deploy(&stack).await.unwrap_err();

    assert!(matches!(err, StackError::Graph(GraphError::CyclicDependency { .. })));
    assert_eq!(realizer.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn provider_failure_stops_dependents() {
    let stack = stacks::builtin("botpress", &botpress_parameters()).unwrap();
    let realizer = SimulatedRealizer::new().with_failure("database", "quota exceeded");

    let err = Engine::new(realizer).deploy(&stack).await.unwrap_err();

    assert!(matches!(
        err,
        StackError::Resolve(ResolveError::RealizationFailed { ref node, .. }) if node.as_str() == "database"
    ));
    let task = stack.node(&NodeId::from("task-definition")).unwrap();
    assert!(!task.is_realized());
}

#[tokio::test]
async fn plan_survives_the_local_store() {
    let stack = stacks::builtin("botpress", &botpress_parameters()).unwrap();
    let plan = Engine::new(SimulatedRealizer::new()).deploy(&stack).await.unwrap();

    let temp = TempDir::new().unwrap();
    let store = LocalPlanStore::with_base_dir(temp.path(), stack.name(), stack.environment());
    let lock = store.acquire_lock("integration").await.unwrap();

    let mut record = DeploymentRecord::new(stack.name(), stack.environment());
    record.record_success(plan.clone());
    store.save(&record).await.unwrap();
    store.release_lock(&lock.lock_id).await.unwrap();

    let loaded = store.load().await.unwrap().unwrap();
    assert_eq!(loaded.latest.as_ref(), Some(&plan));
    assert!(loaded.is_current(&plan.config_hash, "simulated", None));
}

#[tokio::test]
async fn switching_provider_is_not_treated_as_applied() {
    let stack = stacks::builtin("botpress", &botpress_parameters()).unwrap();
    let simulated = Engine::new(SimulatedRealizer::new());
    let prepared = simulated.prepare(&stack).unwrap();
    let plan = simulated.deploy(&stack).await.unwrap();

    let mut record = DeploymentRecord::new(stack.name(), stack.environment());
    record.record_success(plan);

    let http = Engine::new(HttpRealizer::new("http://localhost:8080").unwrap());
    assert_eq!(http.provider_target().as_deref(), Some("http://localhost:8080"));
    assert!(record.is_current(&prepared.config_hash, simulated.provider_name(), None));
    assert!(!record.is_current(
        &prepared.config_hash,
        http.provider_name(),
        http.provider_target().as_deref()
    ));
}
