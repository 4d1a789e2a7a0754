use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::Arc;

use metrics_util::debugging::DebuggingRecorder;
use serde_json::json;
use tempfile::TempDir;
use tiercache::cache::{
    CacheConfig, CacheInstance, CachePolicy, DiskStore, MemoryStore, clear_all_caches,
    revalidate_cache, with_cache,
};

#[tokio::test]
async fn cache_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    // Memory hit/miss/evict
    let memory = MemoryStore::new(None, NonZeroUsize::new(1).expect("capacity"));
    assert!(memory.get("first").is_none());
    memory.set("first", json!(1));
    assert!(memory.get("first").is_some());
    memory.set("second", json!(2));

    // Disk appended + duplicate writes
    let base = TempDir::new().expect("tempdir");
    let disk = DiskStore::open(base.path(), "metrics", None)
        .await
        .expect("open");
    disk.set("k", json!("v")).await.expect("append");
    disk.set("k", json!("v")).await.expect("duplicate");

    // Read-through miss then hit
    let instance = Arc::new(
        CacheInstance::build("tiered", &CacheConfig::both("tiered", None, None), base.path())
            .await
            .expect("instance"),
    );
    let policy = CachePolicy::default();
    let accessor = with_cache(
        "equipments",
        || async { Ok::<_, std::convert::Infallible>(vec!["drill".to_string()]) },
        Arc::clone(&instance),
        &policy,
    );
    accessor.call().await.expect("miss");
    accessor.call().await.expect("hit");

    // Invalidation latencies
    let instances = vec![instance];
    revalidate_cache(["equipments"], &instances, &policy)
        .await
        .expect("revalidate");
    clear_all_caches(&instances).await.expect("clear");

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "tiercache_memory_hit_total",
        "tiercache_memory_miss_total",
        "tiercache_memory_evict_total",
        "tiercache_disk_write_total",
        "tiercache_read_through_total",
        "tiercache_invalidation_ms",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
