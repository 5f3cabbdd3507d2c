//! Deterministic in-process realizer.
//!
//! Produces plausible outputs for every resource kind without contacting any
//! backend. Identifiers are derived from a SHA-256 of the stack region and
//! node identity, so the same stack always yields the same plan. Used for dry
//! runs and tests.

use async_trait::async_trait;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::error::ProviderError;
use crate::model::{NodeId, Outputs, ResourceKind};

use super::realizer::{Realizer, ResolvedProperties};

/// Default region for simulated identifiers.
const DEFAULT_REGION: &str = "sim-east-1";

/// Default generated password length.
const DEFAULT_PASSWORD_LENGTH: u64 = 32;

/// Longest password a secret may generate.
const MAX_PASSWORD_LENGTH: u64 = 4096;

/// Default port of a simulated database cluster.
const DATABASE_PORT: u16 = 5432;

/// Default port of a simulated cache cluster.
const CACHE_PORT: u16 = 6379;

/// Realizer that fabricates deterministic outputs.
#[derive(Debug, Clone)]
pub struct SimulatedRealizer {
    region: String,
    failures: HashMap<NodeId, String>,
}

impl Default for SimulatedRealizer {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedRealizer {
    /// Creates a simulated realizer for the default region.
    #[must_use]
    pub fn new() -> Self {
        Self {
            region: DEFAULT_REGION.to_string(),
            failures: HashMap::new(),
        }
    }

    /// Sets the region embedded in generated identifiers.
    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    /// Makes realization of `identity` fail with `message`.
    #[must_use]
    pub fn with_failure(mut self, identity: impl Into<String>, message: impl Into<String>) -> Self {
        self.failures.insert(NodeId::new(identity), message.into());
        self
    }

    fn digest(&self, identity: &NodeId, salt: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.region.as_bytes());
        hasher.update(identity.as_str().as_bytes());
        hasher.update(salt.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn short(&self, identity: &NodeId, len: usize) -> String {
        self.digest(identity, "id").chars().take(len).collect()
    }

    fn arn(&self, service: &str, resource: &str) -> String {
        format!("arn:sim:{service}:{}:{resource}", self.region)
    }

    fn network(&self, id: &NodeId, props: &ResolvedProperties) -> Outputs {
        let zones = props
            .get("max_azs")
            .and_then(Value::as_u64)
            .unwrap_or(2);
        let suffix = self.short(id, 8);
        let subnets = |tier: &str| -> Vec<String> {
            (0..zones)
                .map(|z| format!("subnet-{tier}-{suffix}-{z}"))
                .collect()
        };

        outputs([
            ("vpc_id", json!(format!("vpc-{}", self.short(id, 17)))),
            (
                "cidr",
                props.get("cidr").cloned().unwrap_or_else(|| json!("10.0.0.0/16")),
            ),
            ("private_subnet_ids", json!(subnets("private"))),
            ("public_subnet_ids", json!(subnets("public"))),
        ])
    }

    fn secret(&self, id: &NodeId, props: &ResolvedProperties) -> Result<Outputs, ProviderError> {
        let length = props
            .get("password_length")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_PASSWORD_LENGTH);
        let length = usize::try_from(length)
            .ok()
            .filter(|_| (1..=MAX_PASSWORD_LENGTH).contains(&length))
            .ok_or_else(|| {
                ProviderError::rejected(
                    0,
                    format!("password_length must be between 1 and {MAX_PASSWORD_LENGTH}, got {length}"),
                )
            })?;
        let key = props
            .get("generate_key")
            .and_then(Value::as_str)
            .unwrap_or("password");

        let mut document = match props.get("secret_string_template") {
            Some(Value::String(text)) => serde_json::from_str::<Value>(text).map_err(|e| {
                ProviderError::rejected(0, format!("secret_string_template is not JSON: {e}"))
            })?,
            Some(other) => other.clone(),
            None => json!({}),
        };
        let Some(fields) = document.as_object_mut() else {
            return Err(ProviderError::rejected(0, "secret_string_template must be a JSON object"));
        };

        let mut material = String::new();
        let mut round = 0usize;
        while material.len() < length {
            material.push_str(&self.digest(id, &format!("secret-{round}")));
            round += 1;
        }
        material.truncate(length);
        fields.insert(key.to_string(), json!(material));

        Ok(outputs([
            ("secret_arn", json!(self.arn("secretsmanager", &format!("secret:{id}-{}", self.short(id, 6))))),
            ("secret_string", json!(document.to_string())),
        ]))
    }

    fn database(&self, id: &NodeId, props: &ResolvedProperties) -> Outputs {
        let endpoint = format!("{id}.cluster-{}.{}.rds.sim", self.short(id, 12), self.region);
        outputs([
            ("cluster_identifier", json!(id.as_str())),
            ("endpoint", json!(endpoint)),
            ("port", json!(DATABASE_PORT)),
            ("socket_address", json!(format!("{endpoint}:{DATABASE_PORT}"))),
            (
                "database_name",
                props.get("default_database_name").cloned().unwrap_or(Value::Null),
            ),
            ("security_group_id", json!(format!("sg-{}", self.short(id, 17)))),
        ])
    }

    fn cache(&self, id: &NodeId) -> Outputs {
        outputs([
            (
                "endpoint_address",
                json!(format!("{id}.{}.0001.{}.cache.sim", self.short(id, 6), self.region)),
            ),
            ("endpoint_port", json!(CACHE_PORT)),
        ])
    }

    fn load_balancer(&self, id: &NodeId) -> Outputs {
        let suffix = self.short(id, 8);
        outputs([
            ("dns_name", json!(format!("{id}-{suffix}.{}.elb.sim", self.region))),
            ("load_balancer_arn", json!(self.arn("elasticloadbalancing", &format!("loadbalancer/app/{id}/{suffix}")))),
            ("target_group_arn", json!(self.arn("elasticloadbalancing", &format!("targetgroup/{id}/{suffix}")))),
            ("security_group_id", json!(format!("sg-{}", self.short(id, 17)))),
        ])
    }
}

fn outputs<const N: usize>(entries: [(&str, Value); N]) -> Outputs {
    entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

#[async_trait]
impl Realizer for SimulatedRealizer {
    async fn realize(
        &self,
        identity: &NodeId,
        kind: ResourceKind,
        properties: &ResolvedProperties,
    ) -> Result<Outputs, ProviderError> {
        if let Some(message) = self.failures.get(identity) {
            return Err(ProviderError::rejected(0, message.clone()));
        }

        debug!("Simulating {kind} '{identity}'");

        let outputs = match kind {
            ResourceKind::Network => self.network(identity, properties),
            ResourceKind::Secret => self.secret(identity, properties)?,
            ResourceKind::SecurityGroup => outputs([(
                "security_group_id",
                json!(format!("sg-{}", self.short(identity, 17))),
            )]),
            ResourceKind::SubnetGroup => outputs([
                ("name", json!(identity.as_str())),
                (
                    "subnet_ids",
                    properties.get("subnet_ids").cloned().unwrap_or_else(|| json!([])),
                ),
            ]),
            ResourceKind::DatabaseCluster => self.database(identity, properties),
            ResourceKind::CacheCluster => self.cache(identity),
            ResourceKind::ContainerCluster => outputs([
                ("cluster_name", json!(identity.as_str())),
                ("cluster_arn", json!(self.arn("ecs", &format!("cluster/{identity}")))),
            ]),
            ResourceKind::TaskDefinition => outputs([
                ("family", json!(identity.as_str())),
                (
                    "task_definition_arn",
                    json!(self.arn("ecs", &format!("task-definition/{identity}:1"))),
                ),
            ]),
            ResourceKind::ContainerService => outputs([
                ("service_name", json!(identity.as_str())),
                ("service_arn", json!(self.arn("ecs", &format!("service/{identity}")))),
                ("security_group_id", json!(format!("sg-{}", self.short(identity, 17)))),
            ]),
            ResourceKind::LoadBalancer => self.load_balancer(identity),
        };

        info!("Simulated {kind} '{identity}' ({} outputs)", outputs.len());
        Ok(outputs)
    }

    fn provider_name(&self) -> &'static str {
        "simulated"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(entries: &[(&str, Value)]) -> ResolvedProperties {
        entries.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect()
    }

    #[tokio::test]
    async fn test_outputs_are_deterministic() {
        let realizer = SimulatedRealizer::new();
        let id = NodeId::from("database");
        let first = realizer
            .realize(&id, ResourceKind::DatabaseCluster, &ResolvedProperties::new())
            .await
            .unwrap();
        let second = realizer
            .realize(&id, ResourceKind::DatabaseCluster, &ResolvedProperties::new())
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(first["port"], json!(5432));
        let endpoint = first["endpoint"].as_str().unwrap();
        assert_eq!(first["socket_address"], json!(format!("{endpoint}:5432")));
    }

    #[tokio::test]
    async fn test_region_changes_identifiers() {
        let id = NodeId::from("vpc");
        let east = SimulatedRealizer::new()
            .realize(&id, ResourceKind::Network, &ResolvedProperties::new())
            .await
            .unwrap();
        let west = SimulatedRealizer::new()
            .with_region("sim-west-2")
            .realize(&id, ResourceKind::Network, &ResolvedProperties::new())
            .await
            .unwrap();

        assert_ne!(east["vpc_id"], west["vpc_id"]);
        assert_eq!(east["private_subnet_ids"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_secret_honours_length_and_key() {
        let realizer = SimulatedRealizer::new();
        let outputs = realizer
            .realize(
                &NodeId::from("db-secret"),
                ResourceKind::Secret,
                &props(&[
                    ("password_length", json!(30)),
                    ("generate_key", json!("password")),
                    ("secret_string_template", json!("{\"username\":\"clusteradmin\"}")),
                ]),
            )
            .await
            .unwrap();

        let document: Value = serde_json::from_str(outputs["secret_string"].as_str().unwrap()).unwrap();
        assert_eq!(document["password"].as_str().unwrap().len(), 30);
        assert_eq!(document["username"], json!("clusteradmin"));
    }

    #[tokio::test]
    async fn test_secret_rejects_oversized_password() {
        let realizer = SimulatedRealizer::new();
        for length in [0, MAX_PASSWORD_LENGTH + 1, u64::MAX] {
            let err = realizer
                .realize(
                    &NodeId::from("db-secret"),
                    ResourceKind::Secret,
                    &props(&[("password_length", json!(length))]),
                )
                .await
                .unwrap_err();
            assert!(matches!(err, ProviderError::Rejected { status: 0, .. }));
            assert!(err.to_string().contains("password_length"));
        }
    }

    #[tokio::test]
    async fn test_configured_failure() {
        let realizer = SimulatedRealizer::new().with_failure("cache", "capacity exhausted");
        let err = realizer
            .realize(&NodeId::from("cache"), ResourceKind::CacheCluster, &ResolvedProperties::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("capacity exhausted"));
    }
}
