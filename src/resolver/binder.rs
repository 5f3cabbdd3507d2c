//! Access rule binding.
//!
//! Access rules are applied in a pass after every node is realized. Each rule
//! reads the security group of both endpoints and records an ingress entry on
//! the target's group. Binding is idempotent.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

use crate::error::{GraphError, ResolveError, Result};
use crate::model::{AccessRule, NodeId, Permission, Stack};

/// Output that carries a node's network boundary.
pub const SECURITY_GROUP_OUTPUT: &str = "security_group_id";

/// One allowed inbound peer of a security group.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IngressRule {
    /// Node allowed in.
    pub source: NodeId,
    /// Security group of the source node.
    pub source_group_id: String,
    /// Protocol and ports allowed.
    pub permission: Permission,
}

/// Ingress configuration of one node's security group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRules {
    /// Security group identifier published by the node.
    pub group_id: String,
    /// Allowed inbound peers.
    pub ingress: BTreeSet<IngressRule>,
}

/// Security configuration produced by binding access rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecurityConfig {
    groups: BTreeMap<NodeId, GroupRules>,
}

impl SecurityConfig {
    /// Returns the rules attached to a node's security group.
    #[must_use]
    pub fn group(&self, target: &NodeId) -> Option<&GroupRules> {
        self.groups.get(target)
    }

    /// Iterates over every configured group, sorted by node identity.
    pub fn groups(&self) -> impl Iterator<Item = (&NodeId, &GroupRules)> {
        self.groups.iter()
    }

    /// Returns the total number of ingress entries.
    #[must_use]
    pub fn ingress_count(&self) -> usize {
        self.groups.values().map(|g| g.ingress.len()).sum()
    }

    /// Returns true if no rule has been bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Applies access rules to a [`SecurityConfig`].
#[derive(Debug, Default)]
pub struct AccessRuleBinder {
    config: SecurityConfig,
}

impl AccessRuleBinder {
    /// Creates a binder with an empty security configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds one rule.
    ///
    /// Returns `true` if the rule added a new ingress entry and `false` if it
    /// was already bound.
    ///
    /// # Errors
    ///
    /// Returns `NotRealized` if either endpoint has not been realized, and
    /// `MissingOutput` if an endpoint published no security group.
    pub fn bind(&mut self, rule: &AccessRule, stack: &Stack) -> Result<bool> {
        let group_id = security_group(stack, &rule.target, &rule.target)?;
        let source_group_id = security_group(stack, &rule.target, &rule.source)?;

        let group = self
            .config
            .groups
            .entry(rule.target.clone())
            .or_insert_with(|| GroupRules {
                group_id,
                ingress: BTreeSet::new(),
            });

        let added = group.ingress.insert(IngressRule {
            source: rule.source.clone(),
            source_group_id,
            permission: rule.permission,
        });

        if added {
            debug!("Bound access rule {rule}");
        } else {
            debug!("Access rule {rule} already bound");
        }
        Ok(added)
    }

    /// Binds every rule, returning how many entries were new.
    ///
    /// # Errors
    ///
    /// Stops at the first rule that cannot be bound.
    pub fn bind_all(&mut self, rules: &[AccessRule], stack: &Stack) -> Result<usize> {
        let mut added = 0;
        for rule in rules {
            if self.bind(rule, stack)? {
                added += 1;
            }
        }
        info!("Bound {added} access rules");
        Ok(added)
    }

    /// Returns the configuration built so far.
    #[must_use]
    pub const fn config(&self) -> &SecurityConfig {
        &self.config
    }

    /// Consumes the binder, returning its configuration.
    #[must_use]
    pub fn into_config(self) -> SecurityConfig {
        self.config
    }
}

fn security_group(stack: &Stack, binding: &NodeId, endpoint: &NodeId) -> Result<String> {
    let node = stack.node(endpoint).ok_or_else(|| GraphError::NotDeclared {
        identity: endpoint.clone(),
        stack: stack.name().to_string(),
    })?;

    node.outputs()?
        .get(SECURITY_GROUP_OUTPUT)
        .and_then(serde_json::Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            ResolveError::MissingOutput {
                node: binding.clone(),
                source_node: endpoint.clone(),
                output: SECURITY_GROUP_OUTPUT.to_string(),
            }
            .into()
        })
}
