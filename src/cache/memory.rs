//! Process-local key/value store with lazy expiry.
//!
//! Values are kept as `serde_json::Value` with overwrite semantics. Capacity is
//! bounded with LRU eviction; entries past their TTL read as absent and are
//! dropped on that read.

use std::num::NonZeroUsize;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use lru::LruCache;
use metrics::counter;
use serde_json::Value;

use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::memory";

const METRIC_MEMORY_HIT: &str = "tiercache_memory_hit_total";
const METRIC_MEMORY_MISS: &str = "tiercache_memory_miss_total";
const METRIC_MEMORY_EVICT: &str = "tiercache_memory_evict_total";

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: Value,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| now >= deadline)
    }
}

/// In-memory store shared by every consumer of one cache instance.
pub struct MemoryStore {
    ttl: Option<Duration>,
    entries: RwLock<LruCache<String, MemoryEntry>>,
}

impl MemoryStore {
    /// Create a store. `ttl == None` keeps entries until evicted or deleted.
    pub fn new(ttl: Option<Duration>, capacity: NonZeroUsize) -> Self {
        Self {
            ttl,
            entries: RwLock::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        let mut entries = rw_write(&self.entries, SOURCE, "get");

        let expired = match entries.get(key) {
            Some(entry) if !entry.is_expired(now) => {
                counter!(METRIC_MEMORY_HIT).increment(1);
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            entries.pop(key);
        }
        counter!(METRIC_MEMORY_MISS).increment(1);
        None
    }

    pub fn set(&self, key: &str, value: Value) {
        let entry = MemoryEntry {
            value,
            expires_at: self.ttl.map(|ttl| Instant::now() + ttl),
        };

        let evicted = rw_write(&self.entries, SOURCE, "set").push(key.to_string(), entry);
        // `push` also returns the previous value of an overwritten key.
        if evicted.is_some_and(|(evicted_key, _)| evicted_key != key) {
            counter!(METRIC_MEMORY_EVICT).increment(1);
        }
    }

    /// Remove `key`; returns whether a live or expired entry was present.
    pub fn delete(&self, key: &str) -> bool {
        rw_write(&self.entries, SOURCE, "delete")
            .pop(key)
            .is_some()
    }

    pub fn clear(&self) {
        rw_write(&self.entries, SOURCE, "clear").clear();
    }

    /// Entries currently held, including expired ones not yet read.
    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
