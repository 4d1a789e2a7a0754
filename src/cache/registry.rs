//! Cache registry: the composition root for cache instances.
//!
//! Instances are built once at startup and handed to consumers from here, so
//! nothing in the crate relies on process-global cache state.

use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::config::{CacheConfig, StorageMode};
use super::error::CacheError;
use super::instance::CacheInstance;
use super::invalidate::{InvalidationError, clear_all_caches, revalidate_cache};
use super::keys::KeyNamespace;
use super::read_through::{CachePolicy, CachedFetch, with_cache};

/// Point-in-time view of one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceStats {
    pub name: String,
    pub storage: StorageMode,
    pub memory_entries: Option<usize>,
    pub disk_keys: Option<usize>,
}

/// Owns the configured cache instances and the caching policy.
pub struct CacheRegistry {
    policy: CachePolicy,
    base_dir: PathBuf,
    instances: Vec<Arc<CacheInstance>>,
}

impl CacheRegistry {
    /// Wrap already-built instances.
    pub fn new(
        policy: CachePolicy,
        base_dir: PathBuf,
        instances: Vec<Arc<CacheInstance>>,
    ) -> Self {
        Self {
            policy,
            base_dir,
            instances,
        }
    }

    /// Build every instance described by `settings`.
    pub async fn from_settings(
        settings: &crate::config::CacheSettings,
    ) -> Result<Self, CacheError> {
        let mut seen = HashSet::new();
        let mut instances = Vec::with_capacity(settings.instances.len());

        for instance in &settings.instances {
            if !seen.insert(instance.name.as_str()) {
                return Err(CacheError::configuration(
                    &instance.name,
                    "instance name is declared more than once",
                ));
            }
            let config = CacheConfig::from(instance);
            let built = CacheInstance::build(&instance.name, &config, &settings.base_dir).await?;
            instances.push(Arc::new(built));
        }

        let policy = CachePolicy::new(settings.enabled, KeyNamespace::new(&settings.namespace));
        Ok(Self::new(policy, settings.base_dir.clone(), instances))
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    pub fn is_enabled(&self) -> bool {
        self.policy.enabled
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn instances(&self) -> &[Arc<CacheInstance>] {
        &self.instances
    }

    /// Look up an instance by name.
    pub fn instance(&self, name: &str) -> Option<&Arc<CacheInstance>> {
        self.instances
            .iter()
            .find(|instance| instance.name() == name)
    }

    /// Wrap `fetch` to read through `instance` under this registry's policy.
    pub fn with_cache<F, Fut, T, E>(
        &self,
        cache_key: &str,
        fetch: F,
        instance: &Arc<CacheInstance>,
    ) -> CachedFetch<F>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        T: Serialize + DeserializeOwned,
    {
        with_cache(cache_key, fetch, Arc::clone(instance), &self.policy)
    }

    /// Delete `keys` from every configured instance.
    pub async fn revalidate<I, K>(&self, keys: I) -> Result<(), InvalidationError>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        revalidate_cache(keys, &self.instances, &self.policy).await
    }

    /// Delete `keys` from the given instances only.
    pub async fn revalidate_in<I, K>(
        &self,
        keys: I,
        instances: &[Arc<CacheInstance>],
    ) -> Result<(), InvalidationError>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        revalidate_cache(keys, instances, &self.policy).await
    }

    /// Wipe every configured instance.
    pub async fn clear_all(&self) -> Result<(), InvalidationError> {
        clear_all_caches(&self.instances).await
    }

    pub async fn stats(&self) -> Result<Vec<InstanceStats>, CacheError> {
        let mut stats = Vec::with_capacity(self.instances.len());
        for instance in &self.instances {
            let disk_keys = match instance.disk() {
                Some(disk) => Some(disk.count_keys().await?),
                None => None,
            };
            stats.push(InstanceStats {
                name: instance.name().to_string(),
                storage: instance.storage(),
                memory_entries: instance.memory().map(|memory| memory.len()),
                disk_keys,
            });
        }
        Ok(stats)
    }
}
