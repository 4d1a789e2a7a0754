//! Test doubles for cache backends.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::Value;

use super::backend::{CacheBackend, MemoryBackend};
use super::config::StorageMode;
use super::error::CacheError;
use super::instance::CacheInstance;
use super::memory::MemoryStore;

/// Per-operation failure toggles shared with the test body.
#[derive(Default)]
pub(crate) struct FaultSwitches {
    pub get: AtomicBool,
    pub set: AtomicBool,
    pub delete: AtomicBool,
    pub clear: AtomicBool,
    pub deletes_attempted: AtomicUsize,
}

/// Memory backend whose operations can be switched to fail.
pub(crate) struct FlakyBackend {
    inner: MemoryBackend,
    faults: Arc<FaultSwitches>,
}

fn injected(op: &str) -> CacheError {
    CacheError::io(
        format!("flaky/{op}"),
        std::io::Error::other(format!("injected {op} failure")),
    )
}

#[async_trait]
impl CacheBackend for FlakyBackend {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        if self.faults.get.load(Ordering::SeqCst) {
            return Err(injected("get"));
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), CacheError> {
        if self.faults.set.load(Ordering::SeqCst) {
            return Err(injected("set"));
        }
        self.inner.set(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.faults.deletes_attempted.fetch_add(1, Ordering::SeqCst);
        if self.faults.delete.load(Ordering::SeqCst) {
            return Err(injected("delete"));
        }
        self.inner.delete(key).await
    }

    async fn clear(&self) -> Result<(), CacheError> {
        if self.faults.clear.load(Ordering::SeqCst) {
            return Err(injected("clear"));
        }
        self.inner.clear().await
    }
}

/// An instance over a flaky in-memory backend, plus its fault switches.
pub(crate) fn flaky_instance(name: &str) -> (Arc<CacheInstance>, Arc<FaultSwitches>) {
    let faults = Arc::new(FaultSwitches::default());
    let store = Arc::new(MemoryStore::new(None, NonZeroUsize::new(64).expect("capacity")));
    let backend = FlakyBackend {
        inner: MemoryBackend::new(store),
        faults: Arc::clone(&faults),
    };
    let instance = CacheInstance::with_backend(name, StorageMode::Memory, Box::new(backend));
    (Arc::new(instance), faults)
}
