//! Cross-instance invalidation.
//!
//! Every deletion is issued up front and awaited together, so one failing
//! instance or key never stops the others from being attempted. Failures are
//! collected into a single [`InvalidationError`] once everything has settled.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use metrics::histogram;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::error::CacheError;
use super::instance::CacheInstance;
use super::read_through::CachePolicy;

const METRIC_INVALIDATION_MS: &str = "tiercache_invalidation_ms";

/// One failed deletion or clear.
#[derive(Debug)]
pub struct InvalidationFailure {
    pub instance: String,
    /// Namespaced key, or `None` for a whole-instance clear.
    pub key: Option<String>,
    pub error: CacheError,
}

impl fmt::Display for InvalidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            Some(key) => write!(f, "{}/{}: {}", self.instance, key, self.error),
            None => write!(f, "{}: {}", self.instance, self.error),
        }
    }
}

/// Aggregate failure of an invalidation fan-out.
#[derive(Debug, Error)]
#[error("{} cache invalidation(s) failed: {}", .failures.len(), summarize(.failures))]
pub struct InvalidationError {
    pub failures: Vec<InvalidationFailure>,
}

fn summarize(failures: &[InvalidationFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Delete `keys` from every instance in `instances`.
///
/// No-op when caching is disabled. Call after a successful mutation, never
/// before.
pub async fn revalidate_cache<I, K>(
    keys: I,
    instances: &[Arc<CacheInstance>],
    policy: &CachePolicy,
) -> Result<(), InvalidationError>
where
    I: IntoIterator<Item = K>,
    K: AsRef<str>,
{
    if !policy.enabled {
        debug!("Cache revalidation skipped: caching disabled");
        return Ok(());
    }

    let started_at = Instant::now();
    let tokens: Vec<String> = keys
        .into_iter()
        .map(|key| policy.namespace.namespace(key.as_ref()))
        .collect();

    let deletions = instances.iter().flat_map(|instance| {
        tokens.iter().map(move |token| async move {
            instance
                .delete(token)
                .await
                .map_err(|error| InvalidationFailure {
                    instance: instance.name().to_string(),
                    key: Some(token.clone()),
                    error,
                })
        })
    });

    let failures = settle(join_all(deletions).await);
    histogram!(METRIC_INVALIDATION_MS, "op" => "revalidate")
        .record(started_at.elapsed().as_secs_f64() * 1000.0);

    debug!(
        keys = tokens.len(),
        instances = instances.len(),
        failed = failures.len(),
        "Cache revalidation complete"
    );
    into_result(failures)
}

/// Wipe every entry from every instance in `instances`.
///
/// Runs regardless of the caching switch; an explicit purge always clears.
pub async fn clear_all_caches(instances: &[Arc<CacheInstance>]) -> Result<(), InvalidationError> {
    let started_at = Instant::now();

    let clears = instances.iter().map(|instance| async move {
        instance
            .clear()
            .await
            .map_err(|error| InvalidationFailure {
                instance: instance.name().to_string(),
                key: None,
                error,
            })
    });

    let failures = settle(join_all(clears).await);
    histogram!(METRIC_INVALIDATION_MS, "op" => "clear_all")
        .record(started_at.elapsed().as_secs_f64() * 1000.0);

    info!(
        instances = instances.len(),
        failed = failures.len(),
        "Cleared cache instances"
    );
    into_result(failures)
}

fn settle(results: Vec<Result<(), InvalidationFailure>>) -> Vec<InvalidationFailure> {
    results
        .into_iter()
        .filter_map(Result::err)
        .inspect(|failure| warn!(failure = %failure, "Cache invalidation failed"))
        .collect()
}

fn into_result(failures: Vec<InvalidationFailure>) -> Result<(), InvalidationError> {
    if failures.is_empty() {
        Ok(())
    } else {
        Err(InvalidationError { failures })
    }
}
