//! Resource nodes and their write-once output slots.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::error::ResolveError;

use super::value::{Deferred, Properties, Value};

/// Outputs published by a realized node.
pub type Outputs = BTreeMap<String, serde_json::Value>;

/// Unique identity of a node within a stack.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Creates a node identity.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of infrastructure a node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    /// Virtual network with public and private subnets.
    Network,
    /// Generated secret material.
    Secret,
    /// Network security group.
    SecurityGroup,
    /// Subnet group for managed data stores.
    SubnetGroup,
    /// Managed relational database cluster.
    DatabaseCluster,
    /// Managed in-memory cache cluster.
    CacheCluster,
    /// Container scheduling cluster.
    ContainerCluster,
    /// Container task definition.
    TaskDefinition,
    /// Long-running container service.
    ContainerService,
    /// Application load balancer.
    LoadBalancer,
}

impl ResourceKind {
    /// All kinds, in a stable order.
    pub const ALL: [Self; 10] = [
        Self::Network,
        Self::Secret,
        Self::SecurityGroup,
        Self::SubnetGroup,
        Self::DatabaseCluster,
        Self::CacheCluster,
        Self::ContainerCluster,
        Self::TaskDefinition,
        Self::ContainerService,
        Self::LoadBalancer,
    ];

    /// Returns the wire name of this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Secret => "secret",
            Self::SecurityGroup => "security-group",
            Self::SubnetGroup => "subnet-group",
            Self::DatabaseCluster => "database-cluster",
            Self::CacheCluster => "cache-cluster",
            Self::ContainerCluster => "container-cluster",
            Self::TaskDefinition => "task-definition",
            Self::ContainerService => "container-service",
            Self::LoadBalancer => "load-balancer",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown resource kind '{s}'"))
    }
}

/// A declared unit of infrastructure.
///
/// Properties are fixed at declaration. Outputs live in a write-once slot that
/// the resolver fills exactly once; readers on other tasks only see it after
/// publication completes.
#[derive(Debug)]
pub struct ResourceNode {
    id: NodeId,
    kind: ResourceKind,
    properties: Properties,
    position: usize,
    outputs: OnceLock<Outputs>,
}

impl ResourceNode {
    pub(crate) fn new(id: NodeId, kind: ResourceKind, properties: Properties, position: usize) -> Self {
        Self {
            id,
            kind,
            properties,
            position,
            outputs: OnceLock::new(),
        }
    }

    /// Returns the node identity.
    #[must_use]
    pub const fn id(&self) -> &NodeId {
        &self.id
    }

    /// Returns the node kind.
    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Returns the declared property bag.
    #[must_use]
    pub const fn properties(&self) -> &Properties {
        &self.properties
    }

    /// Returns the declaration position within the stack.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.position
    }

    /// Returns true once outputs have been published.
    #[must_use]
    pub fn is_realized(&self) -> bool {
        self.outputs.get().is_some()
    }

    /// Returns the published outputs.
    ///
    /// # Errors
    ///
    /// Returns `NotRealized` if the node has not been realized yet.
    pub fn outputs(&self) -> std::result::Result<&Outputs, ResolveError> {
        self.outputs.get().ok_or_else(|| ResolveError::NotRealized {
            node: self.id.clone(),
        })
    }

    /// Publishes outputs, marking the node realized.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyRealized` if outputs were published before.
    pub(crate) fn publish(&self, outputs: Outputs) -> std::result::Result<(), ResolveError> {
        self.outputs.set(outputs).map_err(|_| ResolveError::AlreadyRealized {
            node: self.id.clone(),
        })
    }
}

/// Handle returned by a declaration, used to reference the node's outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeHandle {
    id: NodeId,
    kind: ResourceKind,
}

impl NodeHandle {
    pub(crate) const fn new(id: NodeId, kind: ResourceKind) -> Self {
        Self { id, kind }
    }

    /// Returns the identity of the referenced node.
    #[must_use]
    pub const fn id(&self) -> &NodeId {
        &self.id
    }

    /// Returns the kind of the referenced node.
    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Returns a placeholder for one of this node's outputs.
    #[must_use]
    pub fn output(&self, name: &str) -> Value {
        Value::Deferred(self.deferred(name))
    }

    /// Returns a deferred reference that can carry a transform.
    #[must_use]
    pub fn deferred(&self, name: &str) -> Deferred {
        Deferred::new(self.id.clone(), name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_outputs_fail_before_realization() {
        let node = ResourceNode::new(NodeId::from("vpc"), ResourceKind::Network, Properties::new(), 0);
        let err = node.outputs().unwrap_err();
        assert!(matches!(err, ResolveError::NotRealized { ref node } if node.as_str() == "vpc"));
    }

    #[test]
    fn test_publish_is_write_once() {
        let node = ResourceNode::new(NodeId::from("vpc"), ResourceKind::Network, Properties::new(), 0);
        let mut outputs = Outputs::new();
        outputs.insert(String::from("vpc_id"), json!("vpc-1"));

        node.publish(outputs.clone()).unwrap();
        assert!(node.is_realized());
        assert_eq!(node.outputs().unwrap()["vpc_id"], json!("vpc-1"));

        let err = node.publish(outputs).unwrap_err();
        assert!(matches!(err, ResolveError::AlreadyRealized { .. }));
    }

    #[test]
    fn test_kind_round_trips_through_wire_name() {
        for kind in ResourceKind::ALL {
            assert_eq!(kind.as_str().parse::<ResourceKind>().unwrap(), kind);
        }
        assert!("mainframe".parse::<ResourceKind>().is_err());
    }

    #[test]
    fn test_handle_output_is_deferred() {
        let handle = NodeHandle::new(NodeId::from("database"), ResourceKind::DatabaseCluster);
        let value = handle.output("endpoint");
        assert_eq!(value, Value::Deferred(Deferred::new(NodeId::from("database"), "endpoint")));
    }
}
