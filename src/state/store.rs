//! Plan store trait definition.

use async_trait::async_trait;

use super::lock::LockInfo;
use super::types::DeploymentRecord;
use crate::error::Result;

/// Trait for plan persistence backends.
#[async_trait]
pub trait PlanStore: Send + Sync {
    /// Loads the deployment record.
    ///
    /// Returns `None` if nothing was stored yet.
    async fn load(&self) -> Result<Option<DeploymentRecord>>;

    /// Saves the deployment record.
    async fn save(&self, record: &DeploymentRecord) -> Result<()>;

    /// Checks if a record exists.
    async fn exists(&self) -> Result<bool>;

    /// Acquires the store lock.
    async fn acquire_lock(&self, holder: &str) -> Result<LockInfo>;

    /// Releases the store lock if `lock_id` still holds it.
    async fn release_lock(&self, lock_id: &str) -> Result<()>;

    /// Gets current lock information if locked.
    async fn get_lock_info(&self) -> Result<Option<LockInfo>>;

    /// Checks if the store is locked by a live holder.
    async fn is_locked(&self) -> Result<bool>;

    /// Gets the backend type name.
    fn backend_type(&self) -> &'static str;
}
