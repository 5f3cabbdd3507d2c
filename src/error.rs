//! Error types for the stackweave engine.
//!
//! This module provides the error hierarchy for every phase of a deployment:
//! configuration, graph construction, planning, resolution, realization by an
//! external provider, and plan persistence.
//!
//! Every variant that concerns a resource carries the node identity (or the
//! cycle participants) so a failure can be traced back to its declaration.

use std::path::PathBuf;
use thiserror::Error;

use crate::model::NodeId;

/// The main error type for the stackweave engine.
#[derive(Debug, Error)]
pub enum StackError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Graph construction and planning errors.
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// Resolution and realization errors.
    #[error("Resolution error: {0}")]
    Resolve(#[from] ResolveError),

    /// Plan persistence errors.
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required external parameter is absent or empty.
    #[error("Missing required configuration parameter: {name}")]
    MissingConfiguration {
        /// Name of the missing parameter.
        name: String,
    },

    /// The stack file was not found.
    #[error("Stack file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The stack file could not be parsed.
    #[error("Failed to parse stack file: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Stack validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// A `${...}` reference in a property could not be parsed.
    #[error("Invalid reference '{reference}' in resource '{node}': {message}")]
    InvalidReference {
        /// Node whose properties contain the reference.
        node: String,
        /// The reference text.
        reference: String,
        /// What is wrong with it.
        message: String,
    },
}

/// Graph construction and planning errors.
#[derive(Debug, Error)]
pub enum GraphError {
    /// Two nodes were declared with the same identity.
    #[error("Duplicate resource identity: {identity}")]
    DuplicateIdentity {
        /// The duplicated identity.
        identity: NodeId,
    },

    /// A node identity is not usable.
    #[error("Invalid resource identity '{identity}': {reason}")]
    InvalidIdentity {
        /// The rejected identity.
        identity: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A node depends on itself.
    #[error("Resource '{node}' depends on itself")]
    SelfDependency {
        /// The self-referencing node.
        node: NodeId,
    },

    /// A node references an identity that was never declared.
    #[error("Resource '{node}' references undeclared resource '{missing}'")]
    UnknownNode {
        /// The referencing node.
        node: NodeId,
        /// The undeclared identity.
        missing: NodeId,
    },

    /// A handle was used with a stack that never declared it.
    #[error("Resource '{identity}' is not declared in stack '{stack}'")]
    NotDeclared {
        /// The unknown identity.
        identity: NodeId,
        /// The stack that was asked.
        stack: String,
    },

    /// The dependency graph contains a cycle.
    #[error("Cyclic dependency detected: {}", format_cycle(.cycle))]
    CyclicDependency {
        /// Participating identities in cycle order.
        cycle: Vec<NodeId>,
    },
}

/// Resolution and realization errors.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Outputs were read before the node was realized.
    #[error("Resource '{node}' has not been realized yet")]
    NotRealized {
        /// The unrealized node.
        node: NodeId,
    },

    /// A node was realized a second time.
    #[error("Resource '{node}' has already been realized")]
    AlreadyRealized {
        /// The node realized twice.
        node: NodeId,
    },

    /// A deferred value was resolved before its source was realized.
    ///
    /// This indicates an ordering defect inside the engine and is never retryable.
    #[error("Internal ordering defect: '{node}' resolved before its dependency '{source_node}' was realized")]
    UnresolvedDependency {
        /// The node being resolved.
        node: NodeId,
        /// The unrealized source.
        source_node: NodeId,
    },

    /// A deferred value names an output its source never published.
    #[error("Resource '{node}' references output '{output}' which '{source_node}' did not publish")]
    MissingOutput {
        /// The node being resolved.
        node: NodeId,
        /// The source node.
        source_node: NodeId,
        /// The missing output name.
        output: String,
    },

    /// A transform could not be applied to a published output.
    #[error("Resource '{node}' cannot transform '{source_node}.{output}': {message}")]
    TransformFailed {
        /// The node being resolved.
        node: NodeId,
        /// The source node.
        source_node: NodeId,
        /// The output being transformed.
        output: String,
        /// Description of the failure.
        message: String,
    },

    /// The realization collaborator failed for a node.
    #[error("Failed to realize resource '{node}': {source}")]
    RealizationFailed {
        /// The node that failed.
        node: NodeId,
        /// The collaborator's error.
        #[source]
        source: ProviderError,
    },

    /// A realization task was cancelled or panicked.
    #[error("Realization task for '{node}' aborted: {message}")]
    TaskAborted {
        /// The node whose task aborted.
        node: NodeId,
        /// Description of the abort.
        message: String,
    },
}

/// Errors reported by a realization collaborator.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The backend refused to provision the resource.
    #[error("Provider rejected request ({status}): {message}")]
    Rejected {
        /// HTTP status code (or 0 for non-HTTP providers).
        status: u16,
        /// Message from the backend.
        message: String,
    },

    /// Network error.
    #[error("Network error communicating with provider: {message}")]
    Network {
        /// Description of the network error.
        message: String,
    },

    /// Invalid response from the backend.
    #[error("Invalid response from provider: {message}")]
    InvalidResponse {
        /// Description of the response issue.
        message: String,
    },
}

/// Plan persistence errors.
#[derive(Debug, Error)]
pub enum StateError {
    /// Stored record is corrupted.
    #[error("Stored deployment record is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// Filesystem error in the state directory.
    #[error("State storage error: {message}")]
    Storage {
        /// Description of the failure.
        message: String,
    },

    /// Serialization error.
    #[error("State serialization error: {message}")]
    SerializationError {
        /// Description of the serialization error.
        message: String,
    },

    /// State lock is held by another process.
    #[error("State is locked by another process (lock holder: {holder}, since: {since})")]
    LockedByOther {
        /// Identifier of the lock holder.
        holder: String,
        /// When the lock was acquired.
        since: String,
    },
}

/// Result type alias for stackweave operations.
pub type Result<T> = std::result::Result<T, StackError>;

fn format_cycle(cycle: &[NodeId]) -> String {
    let mut names: Vec<&str> = cycle.iter().map(NodeId::as_str).collect();
    if let Some(first) = cycle.first() {
        names.push(first.as_str());
    }
    names.join(" -> ")
}

impl StackError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if the error was detected before any resource was touched.
    #[must_use]
    pub const fn is_structural(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Graph(_))
    }

    /// Returns the identity of the node this error concerns, if any.
    #[must_use]
    pub const fn node(&self) -> Option<&NodeId> {
        match self {
            Self::Graph(
                GraphError::DuplicateIdentity { identity: node }
                | GraphError::NotDeclared { identity: node, .. }
                | GraphError::SelfDependency { node }
                | GraphError::UnknownNode { node, .. },
            )
            | Self::Resolve(
                ResolveError::NotRealized { node }
                | ResolveError::AlreadyRealized { node }
                | ResolveError::UnresolvedDependency { node, .. }
                | ResolveError::MissingOutput { node, .. }
                | ResolveError::TransformFailed { node, .. }
                | ResolveError::RealizationFailed { node, .. }
                | ResolveError::TaskAborted { node, .. },
            ) => Some(node),
            _ => None,
        }
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates a missing-configuration error for a parameter.
    #[must_use]
    pub fn missing(name: impl Into<String>) -> Self {
        Self::MissingConfiguration { name: name.into() }
    }
}

impl ResolveError {
    /// Returns true if this error signals a defect inside the engine itself.
    #[must_use]
    pub const fn is_internal_defect(&self) -> bool {
        matches!(self, Self::UnresolvedDependency { .. } | Self::AlreadyRealized { .. })
    }
}

impl ProviderError {
    /// Creates a rejection error.
    #[must_use]
    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        Self::Rejected {
            status,
            message: message.into(),
        }
    }

    /// Creates a network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Creates an invalid-response error.
    #[must_use]
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }
}

impl StateError {
    /// Creates a storage error with the given message.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_names_participants() {
        let err = GraphError::CyclicDependency {
            cycle: vec![NodeId::from("a"), NodeId::from("b")],
        };
        assert_eq!(err.to_string(), "Cyclic dependency detected: a -> b -> a");
    }

    #[test]
    fn test_node_accessor() {
        let err = StackError::from(ResolveError::RealizationFailed {
            node: NodeId::from("database"),
            source: ProviderError::network("timeout"),
        });
        assert_eq!(err.node().map(NodeId::as_str), Some("database"));
        assert!(!err.is_structural());

        let err = StackError::from(ConfigError::missing("DOMAIN_NAME"));
        assert!(err.node().is_none());
        assert!(err.is_structural());
    }
}
