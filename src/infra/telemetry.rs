use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

/// Register descriptions for every metric the cache emits.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "tiercache_memory_hit_total",
            Unit::Count,
            "Total number of memory-tier hits."
        );
        describe_counter!(
            "tiercache_memory_miss_total",
            Unit::Count,
            "Total number of memory-tier misses, expired entries included."
        );
        describe_counter!(
            "tiercache_memory_evict_total",
            Unit::Count,
            "Total number of memory-tier evictions due to capacity."
        );
        describe_counter!(
            "tiercache_disk_write_total",
            Unit::Count,
            "Disk bucket writes, labelled appended, reordered or duplicate."
        );
        describe_counter!(
            "tiercache_read_through_total",
            Unit::Count,
            "Read-through calls by instance and outcome (hit, miss, error, bypass)."
        );
        describe_histogram!(
            "tiercache_invalidation_ms",
            Unit::Milliseconds,
            "Invalidation fan-out latency in milliseconds."
        );
    });
}
