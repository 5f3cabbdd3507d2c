//! The deployment plan: the fully concrete result of a deployment.
//!
//! Every property in a plan is a literal. No deferred placeholder survives
//! resolution, so a plan can be persisted, diffed, or shown as-is.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{AccessRule, NodeId, Outputs, ResourceKind};
use crate::provider::ResolvedProperties;
use crate::resolver::SecurityConfig;

/// A realized node with its concrete inputs and published outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedNode {
    /// Node identity.
    pub identity: NodeId,
    /// Node kind.
    pub kind: ResourceKind,
    /// Properties after every deferred value was substituted.
    pub properties: ResolvedProperties,
    /// Outputs published by the realizer.
    pub outputs: Outputs,
    /// Direct dependencies, in declaration order.
    #[serde(default)]
    pub depends_on: Vec<NodeId>,
}

/// A complete, concrete deployment plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentPlan {
    /// Unique plan identifier.
    pub id: Uuid,
    /// Stack name.
    pub stack: String,
    /// Environment name.
    pub environment: String,
    /// When the plan was produced.
    pub created_at: DateTime<Utc>,
    /// Hash of the declarations this plan was produced from.
    pub config_hash: String,
    /// Realizer that produced the outputs.
    pub provider: String,
    /// Endpoint of the realizer, when it has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_target: Option<String>,
    /// Nodes in creation order.
    pub nodes: Vec<ResolvedNode>,
    /// Access rules that were bound.
    #[serde(default)]
    pub access_rules: Vec<AccessRule>,
    /// Resulting security configuration.
    #[serde(default)]
    pub security: SecurityConfig,
}

impl DeploymentPlan {
    /// Returns true if the plan came from these declarations on this provider.
    #[must_use]
    pub fn produced_by(&self, config_hash: &str, provider: &str, target: Option<&str>) -> bool {
        self.config_hash == config_hash && self.provider == provider && self.provider_target.as_deref() == target
    }

    /// Finds a node by identity.
    #[must_use]
    pub fn node(&self, identity: &str) -> Option<&ResolvedNode> {
        self.nodes.iter().find(|n| n.identity.as_str() == identity)
    }

    /// Returns node identities in creation order.
    #[must_use]
    pub fn order(&self) -> Vec<&NodeId> {
        self.nodes.iter().map(|n| &n.identity).collect()
    }

    /// Returns the number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the plan is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Serializes the plan to pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl std::fmt::Display for DeploymentPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Deployment plan {} for {}/{} ({} resources, provider {})",
            self.id,
            self.stack,
            self.environment,
            self.nodes.len(),
            self.provider
        )?;

        for (i, node) in self.nodes.iter().enumerate() {
            write!(f, "  {}. {} [{}]", i + 1, node.identity, node.kind)?;
            if !node.depends_on.is_empty() {
                let deps: Vec<&str> = node.depends_on.iter().map(NodeId::as_str).collect();
                write!(f, " after {}", deps.join(", "))?;
            }
            writeln!(f)?;
        }

        for rule in &self.access_rules {
            writeln!(f, "  allow {rule}")?;
        }
        Ok(())
    }
}
