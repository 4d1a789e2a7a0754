//! Backend capability shared by every cache instance.
//!
//! A [`CacheInstance`](super::CacheInstance) holds exactly one implementation,
//! chosen once from its storage mode.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::disk::DiskStore;
use super::error::CacheError;
use super::memory::MemoryStore;

/// Uniform `{get, set, delete, clear}` surface over storage tiers.
///
/// Keys are already namespaced storage tokens.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError>;

    async fn set(&self, key: &str, value: Value) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    async fn clear(&self) -> Result<(), CacheError>;
}

/// Memory-only backend.
pub struct MemoryBackend {
    store: Arc<MemoryStore>,
}

impl MemoryBackend {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        Ok(self.store.get(key))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), CacheError> {
        self.store.set(key, value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.store.delete(key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.store.clear();
        Ok(())
    }
}

/// Disk-only backend.
///
/// Writes move the value to the end of the key's bucket and reads surface
/// that last element, so the newest write always wins.
pub struct DiskBackend {
    store: Arc<DiskStore>,
}

impl DiskBackend {
    pub fn new(store: Arc<DiskStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl CacheBackend for DiskBackend {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let bucket = self.store.get(key).await?;
        Ok(bucket.and_then(|mut values| values.pop()))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), CacheError> {
        self.store.set_latest(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.store.delete(key).await
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.store.clear().await
    }
}

/// Memory in front of disk.
///
/// Reads try memory first and promote disk hits into memory. Writes, deletes
/// and clears go to both tiers; they are not atomic across tiers, and the
/// first error is reported only after both tiers were attempted.
pub struct TieredBackend {
    memory: MemoryBackend,
    disk: DiskBackend,
}

impl TieredBackend {
    pub fn new(memory: Arc<MemoryStore>, disk: Arc<DiskStore>) -> Self {
        Self {
            memory: MemoryBackend::new(memory),
            disk: DiskBackend::new(disk),
        }
    }
}

#[async_trait]
impl CacheBackend for TieredBackend {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        if let Some(value) = self.memory.get(key).await? {
            return Ok(Some(value));
        }

        let Some(value) = self.disk.get(key).await? else {
            return Ok(None);
        };
        debug!(key, "Promoting disk hit into memory");
        self.memory.set(key, value.clone()).await?;
        Ok(Some(value))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), CacheError> {
        let memory = self.memory.set(key, value.clone()).await;
        let disk = self.disk.set(key, value).await;
        memory.and(disk)
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let memory = self.memory.delete(key).await;
        let disk = self.disk.delete(key).await;
        memory.and(disk)
    }

    async fn clear(&self) -> Result<(), CacheError> {
        let memory = self.memory.clear().await;
        let disk = self.disk.clear().await;
        memory.and(disk)
    }
}
