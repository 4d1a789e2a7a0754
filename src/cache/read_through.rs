//! Read-through orchestration.
//!
//! [`with_cache`] wraps an async fetch so that results are served from a cache
//! instance when present and stored after a miss. Caching is strictly
//! additive: a read fault is a miss, a write fault is logged and dropped, and
//! a disabled policy calls straight through.

use std::future::Future;
use std::sync::Arc;

use metrics::counter;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use super::error::CacheError;
use super::instance::CacheInstance;
use super::keys::KeyNamespace;

const METRIC_READ_THROUGH: &str = "tiercache_read_through_total";

/// Process-wide caching policy: the global switch plus key namespacing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePolicy {
    pub enabled: bool,
    pub namespace: KeyNamespace,
}

impl CachePolicy {
    pub fn new(enabled: bool, namespace: KeyNamespace) -> Self {
        Self { enabled, namespace }
    }

    pub fn disabled() -> Self {
        Self::new(false, KeyNamespace::unprefixed())
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self::new(true, KeyNamespace::unprefixed())
    }
}

/// Outcome of probing a cache instance.
#[derive(Debug)]
pub enum Lookup {
    Hit(Value),
    Miss,
    BackendError(CacheError),
}

impl Lookup {
    pub async fn probe(instance: &CacheInstance, token: &str) -> Self {
        match instance.get(token).await {
            Ok(Some(value)) => Lookup::Hit(value),
            Ok(None) => Lookup::Miss,
            Err(err) => Lookup::BackendError(err),
        }
    }
}

/// Whether a fetched value is worth storing: not null, not an empty array.
pub fn is_cacheable(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Array(items) => !items.is_empty(),
        _ => true,
    }
}

/// Wrap `fetch` so calls read through `instance` under `cache_key`.
///
/// The fetch takes no arguments; its error type passes through untouched and
/// failed fetches are never cached.
pub fn with_cache<F, Fut, T, E>(
    cache_key: &str,
    fetch: F,
    instance: Arc<CacheInstance>,
    policy: &CachePolicy,
) -> CachedFetch<F>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    T: Serialize + DeserializeOwned,
{
    CachedFetch {
        key: cache_key.to_string(),
        token: policy.namespace.namespace(cache_key),
        enabled: policy.enabled,
        fetch,
        instance,
    }
}

/// A fetch function bound to a cache instance and key.
pub struct CachedFetch<F> {
    key: String,
    token: String,
    enabled: bool,
    fetch: F,
    instance: Arc<CacheInstance>,
}

impl<F> CachedFetch<F> {
    /// The application key this accessor caches under.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The namespaced storage token.
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn instance(&self) -> &Arc<CacheInstance> {
        &self.instance
    }

    fn record(&self, outcome: &'static str) {
        counter!(
            METRIC_READ_THROUGH,
            "instance" => self.instance.name().to_string(),
            "outcome" => outcome
        )
        .increment(1);
    }
}

impl<F, Fut, T, E> CachedFetch<F>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    T: Serialize + DeserializeOwned,
{
    pub async fn call(&self) -> Result<T, E> {
        if !self.enabled {
            self.record("bypass");
            return (self.fetch)().await;
        }

        match Lookup::probe(&self.instance, &self.token).await {
            Lookup::Hit(value) => match serde_json::from_value::<T>(value) {
                Ok(cached) => {
                    self.record("hit");
                    debug!(instance = self.instance.name(), key = %self.key, "Cache hit");
                    return Ok(cached);
                }
                Err(err) => {
                    self.record("error");
                    warn!(
                        instance = self.instance.name(),
                        key = %self.key,
                        error = %err,
                        "Cached value has an unexpected shape; refetching"
                    );
                }
            },
            Lookup::Miss => {
                self.record("miss");
                debug!(instance = self.instance.name(), key = %self.key, "Cache miss");
            }
            Lookup::BackendError(err) => {
                self.record("error");
                warn!(
                    instance = self.instance.name(),
                    key = %self.key,
                    error = %err,
                    "Cache read failed; treating as miss"
                );
            }
        }

        let fetched = (self.fetch)().await?;
        self.store(&fetched).await;
        Ok(fetched)
    }

    async fn store(&self, fetched: &T) {
        let value = match serde_json::to_value(fetched) {
            Ok(value) => value,
            Err(err) => {
                warn!(
                    instance = self.instance.name(),
                    key = %self.key,
                    error = %err,
                    "Fetched value is not serializable; not caching"
                );
                return;
            }
        };

        if !is_cacheable(&value) {
            debug!(instance = self.instance.name(), key = %self.key, "Empty result not cached");
            return;
        }

        if let Err(err) = self.instance.set(&self.token, value).await {
            warn!(
                instance = self.instance.name(),
                key = %self.key,
                error = %err,
                "Cache write failed; result returned uncached"
            );
        }
    }
}
