//! Local file-based plan store.
//!
//! Records live as pretty-printed JSON under `.stackweave/` in the working
//! directory, one file per stack and environment, next to a lock file.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{Result, StateError};

use super::lock::{LOCK_EXPIRY_SECS, LockInfo, generate_holder_id};
use super::store::PlanStore;
use super::types::DeploymentRecord;

/// Default state directory name.
pub const STATE_DIR: &str = ".stackweave";

/// Local file-based plan store.
#[derive(Debug)]
pub struct LocalPlanStore {
    base_dir: PathBuf,
    record_path: PathBuf,
    lock_path: PathBuf,
}

impl LocalPlanStore {
    /// Creates a store for `stack` in `environment` under a custom directory.
    #[must_use]
    pub fn with_base_dir(base_dir: impl Into<PathBuf>, stack: &str, environment: &str) -> Self {
        let base_dir = base_dir.into();
        let record_path = base_dir.join(format!("{stack}.{environment}.json"));
        let lock_path = base_dir.join(format!("{stack}.{environment}.lock"));

        Self {
            base_dir,
            record_path,
            lock_path,
        }
    }

    /// Path of the record file.
    #[must_use]
    pub fn record_path(&self) -> &Path {
        &self.record_path
    }

    async fn ensure_dir(&self) -> Result<()> {
        if !self.base_dir.exists() {
            debug!("Creating state directory: {}", self.base_dir.display());
            fs::create_dir_all(&self.base_dir)
                .await
                .map_err(|e| StateError::storage(format!("Failed to create state directory: {e}")))?;
        }
        Ok(())
    }

    /// Writes `content` to `path` through a temporary file and a rename.
    async fn write_atomic(&self, path: &Path, content: &str) -> Result<()> {
        self.ensure_dir().await?;
        let temp_path = path.with_extension("tmp");

        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| StateError::storage(format!("Failed to create {}: {e}", temp_path.display())))?;
        file.write_all(content.as_bytes())
            .await
            .map_err(|e| StateError::storage(format!("Failed to write {}: {e}", temp_path.display())))?;
        file.sync_all()
            .await
            .map_err(|e| StateError::storage(format!("Failed to sync {}: {e}", temp_path.display())))?;

        fs::rename(&temp_path, path)
            .await
            .map_err(|e| StateError::storage(format!("Failed to rename {}: {e}", temp_path.display())))?;
        Ok(())
    }

    async fn read_lock_file(&self) -> Result<Option<LockInfo>> {
        if !self.lock_path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.lock_path).await.map_err(|e| StateError::Corrupted {
            message: format!("Failed to read lock file: {e}"),
        })?;

        let lock_info = serde_json::from_str(&content).map_err(|e| StateError::Corrupted {
            message: format!("Failed to parse lock file: {e}"),
        })?;

        Ok(Some(lock_info))
    }

    async fn delete_lock_file(&self) -> Result<()> {
        if self.lock_path.exists() {
            fs::remove_file(&self.lock_path)
                .await
                .map_err(|e| StateError::storage(format!("Failed to delete lock file: {e}")))?;
        }
        Ok(())
    }
}

#[async_trait]
impl PlanStore for LocalPlanStore {
    async fn load(&self) -> Result<Option<DeploymentRecord>> {
        if !self.record_path.exists() {
            debug!("Record file does not exist: {}", self.record_path.display());
            return Ok(None);
        }

        info!("Loading deployment record from: {}", self.record_path.display());

        let content = fs::read_to_string(&self.record_path).await.map_err(|e| StateError::Corrupted {
            message: format!("Failed to read record file: {e}"),
        })?;

        let record = serde_json::from_str(&content).map_err(|e| StateError::Corrupted {
            message: format!("Failed to parse record file: {e}"),
        })?;

        Ok(Some(record))
    }

    async fn save(&self, record: &DeploymentRecord) -> Result<()> {
        info!("Saving deployment record to: {}", self.record_path.display());

        let content = serde_json::to_string_pretty(record)
            .map_err(|e| StateError::serialization(format!("Failed to serialize record: {e}")))?;
        self.write_atomic(&self.record_path, &content).await?;

        debug!("Deployment record saved");
        Ok(())
    }

    async fn exists(&self) -> Result<bool> {
        Ok(self.record_path.exists())
    }

    async fn acquire_lock(&self, holder: &str) -> Result<LockInfo> {
        if let Some(existing) = self.read_lock_file().await? {
            if !existing.is_expired() {
                return Err(StateError::LockedByOther {
                    holder: existing.holder,
                    since: existing.acquired_at.to_rfc3339(),
                }
                .into());
            }
            debug!("Expired lock held by {} found, taking over", existing.holder);
        }

        let holder_id = if holder.is_empty() {
            generate_holder_id()
        } else {
            holder.to_string()
        };

        let lock_info = LockInfo::new(&holder_id);
        let content = serde_json::to_string_pretty(&lock_info)
            .map_err(|e| StateError::serialization(format!("Failed to serialize lock: {e}")))?;
        self.write_atomic(&self.lock_path, &content).await?;

        info!(
            "Acquired state lock: {} (expires in {}s)",
            lock_info.lock_id, LOCK_EXPIRY_SECS
        );

        Ok(lock_info)
    }

    async fn release_lock(&self, lock_id: &str) -> Result<()> {
        if let Some(existing) = self.read_lock_file().await? {
            if existing.lock_id == lock_id {
                self.delete_lock_file().await?;
                info!("Released state lock: {lock_id}");
            } else {
                debug!("Lock ID mismatch: expected {lock_id}, found {}", existing.lock_id);
            }
        }
        Ok(())
    }

    async fn get_lock_info(&self) -> Result<Option<LockInfo>> {
        self.read_lock_file().await
    }

    async fn is_locked(&self) -> Result<bool> {
        Ok(self
            .read_lock_file()
            .await?
            .is_some_and(|lock| !lock.is_expired()))
    }

    fn backend_type(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StackError;
    use tempfile::TempDir;

    fn create_test_store() -> (LocalPlanStore, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = LocalPlanStore::with_base_dir(temp_dir.path(), "botpress", "dev");
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let (store, _temp) = create_test_store();

        let mut record = DeploymentRecord::new("botpress", "dev");
        record.record_failure("abc", 2, "network unreachable");
        store.save(&record).await.expect("Failed to save record");

        let loaded = store
            .load()
            .await
            .expect("Failed to load record")
            .expect("Record should exist");

        assert_eq!(loaded.stack, "botpress");
        assert_eq!(loaded.environment, "dev");
        assert_eq!(loaded.history.len(), 1);
        assert!(store.record_path().ends_with("botpress.dev.json"));
    }

    #[tokio::test]
    async fn test_load_nonexistent() {
        let (store, _temp) = create_test_store();
        assert!(store.load().await.expect("Load should not fail").is_none());
        assert!(!store.exists().await.expect("exists check failed"));
    }

    #[tokio::test]
    async fn test_corrupted_record() {
        let (store, _temp) = create_test_store();
        std::fs::create_dir_all(store.record_path().parent().unwrap()).unwrap();
        std::fs::write(store.record_path(), "{not json").unwrap();

        let err = store.load().await.unwrap_err();
        assert!(matches!(err, StackError::State(StateError::Corrupted { .. })));
    }

    #[tokio::test]
    async fn test_lock_acquire_release() {
        let (store, _temp) = create_test_store();

        let lock = store
            .acquire_lock("test-holder")
            .await
            .expect("Failed to acquire lock");
        assert!(store.is_locked().await.expect("is_locked failed"));

        store
            .release_lock(&lock.lock_id)
            .await
            .expect("Failed to release lock");
        assert!(!store.is_locked().await.expect("is_locked failed"));
    }

    #[tokio::test]
    async fn test_lock_info_names_holder() {
        let (store, _temp) = create_test_store();
        assert_eq!(store.backend_type(), "local");
        assert!(store.get_lock_info().await.expect("lock info failed").is_none());

        let lock = store.acquire_lock("holder-1").await.expect("Failed to acquire lock");
        let info = store
            .get_lock_info()
            .await
            .expect("lock info failed")
            .expect("lock present");
        assert_eq!(info.holder, "holder-1");
        assert_eq!(info.lock_id, lock.lock_id);
        assert!(info.remaining_secs() > 0);
    }

    #[tokio::test]
    async fn test_lock_conflict() {
        let (store, _temp) = create_test_store();

        let _lock = store
            .acquire_lock("holder-1")
            .await
            .expect("Failed to acquire first lock");

        let err = store.acquire_lock("holder-2").await.unwrap_err();
        assert!(matches!(
            err,
            StackError::State(StateError::LockedByOther { ref holder, .. }) if holder == "holder-1"
        ));
    }

    #[tokio::test]
    async fn test_release_with_wrong_id_keeps_lock() {
        let (store, _temp) = create_test_store();
        store.acquire_lock("").await.expect("Failed to acquire lock");

        store.release_lock("someone-else").await.expect("release failed");
        assert!(store.is_locked().await.expect("is_locked failed"));
    }
}
