//! The stack: an explicit declaration context collecting nodes and rules.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::config::Parameters;
use crate::error::{GraphError, Result};

use super::access::{AccessRule, Permission};
use super::node::{NodeHandle, NodeId, Outputs, ResourceKind, ResourceNode};
use super::value::Properties;

/// A set of declared resources, explicit edges, and access rules.
///
/// Declarations go through this object rather than any ambient registry, so
/// two stacks never share nodes.
#[derive(Debug)]
pub struct Stack {
    name: String,
    environment: String,
    parameters: Parameters,
    nodes: Vec<Arc<ResourceNode>>,
    index: HashMap<NodeId, usize>,
    explicit_edges: Vec<(NodeId, NodeId)>,
    access_rules: Vec<AccessRule>,
}

impl Stack {
    /// Creates an empty stack.
    #[must_use]
    pub fn new(name: impl Into<String>, parameters: Parameters) -> Self {
        Self {
            name: name.into(),
            environment: String::from("dev"),
            parameters,
            nodes: Vec::new(),
            index: HashMap::new(),
            explicit_edges: Vec::new(),
            access_rules: Vec::new(),
        }
    }

    /// Sets the environment name.
    #[must_use]
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    /// Returns the stack name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the environment name.
    #[must_use]
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Returns the configuration parameters.
    #[must_use]
    pub const fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    /// Reads a configuration parameter.
    ///
    /// # Errors
    ///
    /// Returns `MissingConfiguration` if the parameter is absent or empty.
    pub fn parameter(&self, name: &str) -> Result<&str> {
        self.parameters.get_required(name)
    }

    /// Declares a node and returns a handle to it.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateIdentity` if the identity is taken, or
    /// `InvalidIdentity` if it is empty or contains whitespace.
    pub fn declare(
        &mut self,
        kind: ResourceKind,
        identity: impl Into<String>,
        properties: Properties,
    ) -> Result<NodeHandle> {
        let identity = identity.into();
        validate_identity(&identity)?;

        let id = NodeId::new(identity);
        if self.index.contains_key(&id) {
            return Err(GraphError::DuplicateIdentity { identity: id }.into());
        }

        debug!("Declaring {kind} '{id}' with {} properties", properties.len());

        let position = self.nodes.len();
        self.index.insert(id.clone(), position);
        self.nodes
            .push(Arc::new(ResourceNode::new(id.clone(), kind, properties, position)));

        Ok(NodeHandle::new(id, kind))
    }

    /// Declares that `dependent` must be realized after `dependency`.
    ///
    /// Used for side-effect-only relationships that no property expresses.
    pub fn depends_on(&mut self, dependent: &NodeHandle, dependency: &NodeHandle) {
        self.explicit_edges
            .push((dependent.id().clone(), dependency.id().clone()));
    }

    /// Declares an access rule allowing `source` to reach `target`.
    pub fn allow_from(&mut self, target: &NodeHandle, source: &NodeHandle, permission: Permission) {
        self.access_rules.push(AccessRule {
            target: target.id().clone(),
            source: source.id().clone(),
            permission,
        });
    }

    /// Returns the property bag of a node.
    ///
    /// # Errors
    ///
    /// Returns `NotDeclared` if the handle does not belong to this stack.
    pub fn properties_of(&self, handle: &NodeHandle) -> Result<&Properties> {
        Ok(self.lookup(handle.id())?.properties())
    }

    /// Returns the published outputs of a node.
    ///
    /// # Errors
    ///
    /// Returns `NotRealized` if the node has not been realized yet.
    pub fn outputs_of(&self, handle: &NodeHandle) -> Result<Outputs> {
        Ok(self.lookup(handle.id())?.outputs()?.clone())
    }

    /// Returns a node by identity.
    #[must_use]
    pub fn node(&self, id: &NodeId) -> Option<&Arc<ResourceNode>> {
        self.index.get(id).and_then(|&i| self.nodes.get(i))
    }

    /// Returns all nodes in declaration order.
    #[must_use]
    pub fn nodes(&self) -> &[Arc<ResourceNode>] {
        &self.nodes
    }

    /// Returns the explicit `(dependent, dependency)` edges.
    #[must_use]
    pub fn explicit_edges(&self) -> &[(NodeId, NodeId)] {
        &self.explicit_edges
    }

    /// Returns the declared access rules.
    #[must_use]
    pub fn access_rules(&self) -> &[AccessRule] {
        &self.access_rules
    }

    /// Returns the number of declared nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if nothing has been declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn lookup(&self, id: &NodeId) -> Result<&Arc<ResourceNode>> {
        self.node(id).ok_or_else(|| {
            GraphError::NotDeclared {
                identity: id.clone(),
                stack: self.name.clone(),
            }
            .into()
        })
    }
}

fn validate_identity(identity: &str) -> std::result::Result<(), GraphError> {
    let reason = if identity.is_empty() {
        "identity cannot be empty"
    } else if identity.chars().any(char::is_whitespace) {
        "identity cannot contain whitespace"
    } else if identity.contains(['.', '{', '}', '|']) {
        "identity cannot contain '.', '{', '}' or '|'"
    } else {
        return Ok(());
    };

    Err(GraphError::InvalidIdentity {
        identity: identity.to_string(),
        reason: reason.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ResolveError, StackError};

    fn stack() -> Stack {
        Stack::new("test", Parameters::default())
    }

    #[test]
    fn test_declare_registers_in_order() {
        let mut stack = stack();
        let vpc = stack.declare(ResourceKind::Network, "vpc", Properties::new()).unwrap();
        let db = stack
            .declare(ResourceKind::DatabaseCluster, "database", Properties::new())
            .unwrap();

        assert_eq!(stack.len(), 2);
        assert_eq!(stack.nodes()[0].id(), vpc.id());
        assert_eq!(stack.nodes()[1].id(), db.id());
        assert_eq!(stack.node(db.id()).unwrap().position(), 1);
    }

    #[test]
    fn test_duplicate_identity_rejected() {
        let mut stack = stack();
        stack.declare(ResourceKind::Network, "vpc", Properties::new()).unwrap();
        let err = stack
            .declare(ResourceKind::SecurityGroup, "vpc", Properties::new())
            .unwrap_err();

        assert!(matches!(
            err,
            StackError::Graph(GraphError::DuplicateIdentity { ref identity }) if identity.as_str() == "vpc"
        ));
        assert_eq!(stack.len(), 1);
    }

    #[test]
    fn test_invalid_identity_rejected() {
        let mut stack = stack();
        for bad in ["", "my vpc", "vpc.main"] {
            let err = stack.declare(ResourceKind::Network, bad, Properties::new()).unwrap_err();
            assert!(matches!(err, StackError::Graph(GraphError::InvalidIdentity { .. })));
        }
    }

    #[test]
    fn test_outputs_of_before_realization() {
        let mut stack = stack();
        let vpc = stack.declare(ResourceKind::Network, "vpc", Properties::new()).unwrap();
        let err = stack.outputs_of(&vpc).unwrap_err();
        assert!(matches!(err, StackError::Resolve(ResolveError::NotRealized { .. })));
        assert!(stack.properties_of(&vpc).unwrap().is_empty());
    }

    #[test]
    fn test_access_rules_and_explicit_edges_recorded() {
        let mut stack = stack();
        let db = stack
            .declare(ResourceKind::DatabaseCluster, "database", Properties::new())
            .unwrap();
        let svc = stack
            .declare(ResourceKind::ContainerService, "service", Properties::new())
            .unwrap();

        stack.allow_from(&db, &svc, Permission::all_traffic());
        stack.depends_on(&svc, &db);

        assert_eq!(stack.access_rules().len(), 1);
        assert_eq!(stack.access_rules()[0].target.as_str(), "database");
        assert_eq!(stack.explicit_edges()[0].0.as_str(), "service");
    }
}
