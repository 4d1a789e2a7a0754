//! Tiered caching for JSON-serializable results.
//!
//! Each [`CacheInstance`] fronts one or both tiers:
//!
//! - **Memory**: an LRU map with an optional per-entry time-to-live
//! - **Disk**: gzip-compressed JSON buckets under a sandboxed directory
//!
//! Consumers wrap fetch functions with [`with_cache`] (or
//! [`CacheRegistry::with_cache`]) and invalidate after mutations with
//! [`revalidate_cache`]. Cache failures never fail the caller's read.
//!
//! ## Configuration
//!
//! Instances are declared in `tiercache.toml`:
//!
//! ```toml
//! [cache]
//! enabled = true
//! namespace = "app"
//!
//! [[cache.instances]]
//! name = "tiered"
//! storage = "both"
//! memory_ttl_secs = 300
//! disk_ttl_secs = 3600
//! ```

mod backend;
mod config;
mod disk;
mod error;
mod instance;
mod invalidate;
mod keys;
mod lock;
mod memory;
mod read_through;
mod registry;
#[cfg(test)]
pub(crate) mod testing;

pub use backend::{CacheBackend, DiskBackend, MemoryBackend, TieredBackend};
pub use config::{CacheConfig, StorageMode};
pub use disk::{DiskEntry, DiskStore, validate_sub_dir};
pub use error::CacheError;
pub use instance::CacheInstance;
pub use invalidate::{InvalidationError, InvalidationFailure, clear_all_caches, revalidate_cache};
pub use keys::KeyNamespace;
pub use memory::MemoryStore;
pub use read_through::{CachePolicy, CachedFetch, Lookup, is_cacheable, with_cache};
pub use registry::{CacheRegistry, InstanceStats};
