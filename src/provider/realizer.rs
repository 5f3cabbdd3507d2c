//! The realization collaborator interface.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::ProviderError;
use crate::model::{NodeId, Outputs, ResourceKind};

/// Fully concrete properties handed to a realizer.
pub type ResolvedProperties = BTreeMap<String, serde_json::Value>;

/// Turns a node's concrete properties into provisioned infrastructure.
///
/// Called exactly once per node, only after every node it depends on has
/// published its outputs. Implementations must not retry internally on behalf
/// of the engine; retry policy belongs to the caller of the engine.
#[async_trait]
pub trait Realizer: Send + Sync {
    /// Provisions one resource and returns its outputs.
    async fn realize(
        &self,
        identity: &NodeId,
        kind: ResourceKind,
        properties: &ResolvedProperties,
    ) -> Result<Outputs, ProviderError>;

    /// Gets the provider name, for logs and plan metadata.
    fn provider_name(&self) -> &'static str;

    /// Where the provider provisions, if it is more than the provider name.
    fn provider_target(&self) -> Option<String> {
        None
    }
}

#[async_trait]
impl<R: Realizer + ?Sized> Realizer for Arc<R> {
    async fn realize(
        &self,
        identity: &NodeId,
        kind: ResourceKind,
        properties: &ResolvedProperties,
    ) -> Result<Outputs, ProviderError> {
        (**self).realize(identity, kind, properties).await
    }

    fn provider_name(&self) -> &'static str {
        (**self).provider_name()
    }

    fn provider_target(&self) -> Option<String> {
        (**self).provider_target()
    }
}
