//! Declaration hashing for change detection.
//!
//! A plan records the hash of the declarations it was produced from, so two
//! plans can be compared without diffing every property.

use sha2::{Digest, Sha256};

use crate::model::{ResourceNode, Stack};

/// Hasher for computing declaration hashes.
#[derive(Debug, Default)]
pub struct ConfigHasher;

impl ConfigHasher {
    /// Creates a new hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes a hash of every declaration in a stack.
    ///
    /// Changes whenever a node, property, explicit edge or access rule
    /// changes. Declaration order matters since it drives the creation order.
    #[must_use]
    pub fn hash_stack(&self, stack: &Stack) -> String {
        let mut hasher = Sha256::new();

        field(&mut hasher, stack.name().as_bytes());
        field(&mut hasher, stack.environment().as_bytes());

        for node in stack.nodes() {
            field(&mut hasher, self.hash_node(node).as_bytes());
        }

        for (dependent, dependency) in stack.explicit_edges() {
            field(&mut hasher, dependent.as_str().as_bytes());
            field(&mut hasher, dependency.as_str().as_bytes());
        }

        for rule in stack.access_rules() {
            field(&mut hasher, rule.to_string().as_bytes());
        }

        hex::encode(hasher.finalize())
    }

    /// Computes a hash for a single node declaration.
    #[must_use]
    pub fn hash_node(&self, node: &ResourceNode) -> String {
        let mut hasher = Sha256::new();

        field(&mut hasher, node.id().as_str().as_bytes());
        field(&mut hasher, node.kind().as_str().as_bytes());

        // Properties are a BTreeMap, so the serialized form is already sorted.
        field(&mut hasher, &serde_json::to_vec(node.properties()).unwrap_or_default());

        hex::encode(hasher.finalize())
    }
}

/// Feeds one length-prefixed field, so adjacent fields cannot run together.
fn field(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}
