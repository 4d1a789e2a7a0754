//! Cache instance configuration.
//!
//! One `CacheConfig` describes one cache instance: which tiers it uses and how
//! long each tier keeps an entry.

use std::fmt;
use std::num::NonZeroUsize;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

const DEFAULT_MEMORY_TTL_SECS: u64 = 300;
const DEFAULT_MAX_MEMORY_ENTRIES: usize = 1000;

/// Which tiers back a cache instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    Memory,
    Disk,
    Both,
}

impl StorageMode {
    pub fn as_str(self) -> &'static str {
        match self {
            StorageMode::Memory => "memory",
            StorageMode::Disk => "disk",
            StorageMode::Both => "both",
        }
    }

    pub fn uses_memory(self) -> bool {
        matches!(self, StorageMode::Memory | StorageMode::Both)
    }

    pub fn uses_disk(self) -> bool {
        matches!(self, StorageMode::Disk | StorageMode::Both)
    }
}

impl fmt::Display for StorageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageMode {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageMode::Memory),
            "disk" => Ok(StorageMode::Disk),
            "both" => Ok(StorageMode::Both),
            other => Err(format!(
                "unknown storage mode `{other}` (expected memory, disk or both)"
            )),
        }
    }
}

/// Configuration for one cache instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Memory tier time-to-live; `None` keeps entries until evicted.
    pub memory_ttl: Option<Duration>,
    /// Disk tier time-to-live; `None` keeps buckets until deleted.
    pub disk_ttl: Option<Duration>,
    pub storage: StorageMode,
    /// Sub-directory beneath the cache root; defaults to the instance name.
    pub cache_dir: Option<String>,
    /// LRU capacity of the memory tier.
    pub max_memory_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_ttl: Some(Duration::from_secs(DEFAULT_MEMORY_TTL_SECS)),
            disk_ttl: None,
            storage: StorageMode::Memory,
            cache_dir: None,
            max_memory_entries: DEFAULT_MAX_MEMORY_ENTRIES,
        }
    }
}

impl From<&crate::config::CacheInstanceSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheInstanceSettings) -> Self {
        Self {
            memory_ttl: settings.memory_ttl,
            disk_ttl: settings.disk_ttl,
            storage: settings.storage,
            cache_dir: settings.cache_dir.clone(),
            max_memory_entries: settings.max_memory_entries.get(),
        }
    }
}

impl CacheConfig {
    pub fn memory(ttl: Option<Duration>) -> Self {
        Self {
            memory_ttl: ttl,
            storage: StorageMode::Memory,
            ..Default::default()
        }
    }

    pub fn disk(cache_dir: impl Into<String>, ttl: Option<Duration>) -> Self {
        Self {
            memory_ttl: None,
            disk_ttl: ttl,
            storage: StorageMode::Disk,
            cache_dir: Some(cache_dir.into()),
            ..Default::default()
        }
    }

    pub fn both(
        cache_dir: impl Into<String>,
        memory_ttl: Option<Duration>,
        disk_ttl: Option<Duration>,
    ) -> Self {
        Self {
            memory_ttl,
            disk_ttl,
            storage: StorageMode::Both,
            cache_dir: Some(cache_dir.into()),
            ..Default::default()
        }
    }

    /// Returns the memory capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn max_memory_entries_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.max_memory_entries).unwrap_or(NonZeroUsize::MIN)
    }

    /// Disk sub-directory for an instance called `instance`.
    pub fn cache_dir_for<'a>(&'a self, instance: &'a str) -> &'a str {
        self.cache_dir.as_deref().unwrap_or(instance)
    }
}
