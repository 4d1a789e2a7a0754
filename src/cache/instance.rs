//! Configured cache instances.

use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use super::backend::{CacheBackend, DiskBackend, MemoryBackend, TieredBackend};
use super::config::{CacheConfig, StorageMode};
use super::disk::DiskStore;
use super::error::CacheError;
use super::memory::MemoryStore;

/// A named façade over one or both storage tiers.
///
/// Built once at startup and shared (`Arc`) by every consumer.
pub struct CacheInstance {
    name: String,
    storage: StorageMode,
    backend: Box<dyn CacheBackend>,
    memory: Option<Arc<MemoryStore>>,
    disk: Option<Arc<DiskStore>>,
}

impl CacheInstance {
    /// Build an instance; disk-backed modes open their store beneath `base_dir`.
    pub async fn build(
        name: impl Into<String>,
        config: &CacheConfig,
        base_dir: &Path,
    ) -> Result<Self, CacheError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(CacheError::configuration(name, "instance name must not be empty"));
        }

        let memory = config.storage.uses_memory().then(|| {
            Arc::new(MemoryStore::new(
                config.memory_ttl,
                config.max_memory_entries_non_zero(),
            ))
        });

        let disk = if config.storage.uses_disk() {
            let store =
                DiskStore::open(base_dir, config.cache_dir_for(&name), config.disk_ttl).await?;
            Some(Arc::new(store))
        } else {
            None
        };

        let backend: Box<dyn CacheBackend> = match (&memory, &disk) {
            (Some(memory), Some(disk)) => {
                Box::new(TieredBackend::new(Arc::clone(memory), Arc::clone(disk)))
            }
            (Some(memory), None) => Box::new(MemoryBackend::new(Arc::clone(memory))),
            (None, Some(disk)) => Box::new(DiskBackend::new(Arc::clone(disk))),
            (None, None) => {
                return Err(CacheError::configuration(name, "instance has no storage tier"));
            }
        };

        info!(
            instance = %name,
            storage = %config.storage,
            memory_ttl = ?config.memory_ttl,
            disk_ttl = ?config.disk_ttl,
            disk_root = ?disk.as_ref().map(|store| store.root().display().to_string()),
            "Cache instance ready"
        );

        Ok(Self {
            name,
            storage: config.storage,
            backend,
            memory,
            disk,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn storage(&self) -> StorageMode {
        self.storage
    }

    /// The memory tier, when this instance has one.
    pub fn memory(&self) -> Option<&Arc<MemoryStore>> {
        self.memory.as_ref()
    }

    /// The disk tier, when this instance has one.
    pub fn disk(&self) -> Option<&Arc<DiskStore>> {
        self.disk.as_ref()
    }

    pub async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        self.backend.get(key).await
    }

    pub async fn set(&self, key: &str, value: Value) -> Result<(), CacheError> {
        self.backend.set(key, value).await
    }

    pub async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.backend.delete(key).await
    }

    pub async fn clear(&self) -> Result<(), CacheError> {
        self.backend.clear().await
    }

    /// Bucket files in the disk tier; zero for memory-only instances.
    pub async fn disk_key_count(&self) -> Result<usize, CacheError> {
        match &self.disk {
            Some(disk) => disk.count_keys().await,
            None => Ok(0),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_backend(
        name: impl Into<String>,
        storage: StorageMode,
        backend: Box<dyn CacheBackend>,
    ) -> Self {
        Self {
            name: name.into(),
            storage,
            backend,
            memory: None,
            disk: None,
        }
    }
}

impl std::fmt::Debug for CacheInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheInstance")
            .field("name", &self.name)
            .field("storage", &self.storage)
            .field("disk", &self.disk.as_ref().map(|store| store.root()))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    #[tokio::test]
    async fn memory_instance_has_no_disk_tier() {
        let base = TempDir::new().expect("tempdir");
        let instance = CacheInstance::build("memory", &CacheConfig::memory(None), base.path())
            .await
            .expect("build");

        assert_eq!(instance.storage(), StorageMode::Memory);
        assert!(instance.memory().is_some());
        assert!(instance.disk().is_none());
        assert!(!base.path().join("memory").exists());

        instance.set("k", json!([1])).await.expect("set");
        assert_eq!(instance.get("k").await.expect("get"), Some(json!([1])));
        assert_eq!(instance.disk_key_count().await.expect("count"), 0);
    }

    #[tokio::test]
    async fn disk_instance_uses_configured_directory() {
        let base = TempDir::new().expect("tempdir");
        let config = CacheConfig::disk("reports", Some(Duration::from_secs(60)));
        let instance = CacheInstance::build("disk", &config, base.path())
            .await
            .expect("build");

        instance.set("k", json!({"a": 1})).await.expect("set");
        assert!(base.path().join("reports").join("k").is_file());
        assert_eq!(instance.disk_key_count().await.expect("count"), 1);

        instance.delete("k").await.expect("delete");
        assert_eq!(instance.get("k").await.expect("get"), None);
    }

    #[tokio::test]
    async fn disk_dir_defaults_to_instance_name() {
        let base = TempDir::new().expect("tempdir");
        let config = CacheConfig {
            storage: StorageMode::Disk,
            ..Default::default()
        };
        let instance = CacheInstance::build("archive", &config, base.path())
            .await
            .expect("build");

        assert_eq!(
            instance.disk().map(|store| store.root().to_path_buf()),
            Some(base.path().join("archive"))
        );
    }

    #[tokio::test]
    async fn both_instance_wires_tiered_backend() {
        let base = TempDir::new().expect("tempdir");
        let config = CacheConfig::both("tiered", None, None);
        let instance = CacheInstance::build("tiered", &config, base.path())
            .await
            .expect("build");

        instance.set("k", json!("v")).await.expect("set");
        let memory = instance.memory().expect("memory tier");
        assert_eq!(memory.get("k"), Some(json!("v")));

        memory.clear();
        assert_eq!(instance.get("k").await.expect("get"), Some(json!("v")));
        assert_eq!(memory.get("k"), Some(json!("v")), "disk hit promoted");
    }

    #[tokio::test]
    async fn escaping_cache_dir_fails_construction() {
        let base = TempDir::new().expect("tempdir");
        let config = CacheConfig::disk("../outside", None);
        let result = CacheInstance::build("disk", &config, base.path()).await;
        assert!(matches!(result, Err(CacheError::Sandbox { .. })));
    }

    #[tokio::test]
    async fn empty_name_is_rejected() {
        let base = TempDir::new().expect("tempdir");
        let result = CacheInstance::build(" ", &CacheConfig::default(), base.path()).await;
        assert!(matches!(result, Err(CacheError::Configuration { .. })));
    }
}
