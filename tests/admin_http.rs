use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tempfile::TempDir;
use tiercache::application::admin::AdminCacheService;
use tiercache::cache::{CacheConfig, CacheInstance, CachePolicy, CacheRegistry, KeyNamespace};
use tiercache::infra::http::{AdminState, build_admin_router};
use tower::ServiceExt;

async fn router_with_disk(base: &TempDir) -> (Router, Arc<CacheInstance>) {
    let disk = Arc::new(
        CacheInstance::build("disk", &CacheConfig::disk("disk", None), base.path())
            .await
            .expect("disk instance"),
    );
    let memory = Arc::new(
        CacheInstance::build("memory", &CacheConfig::memory(None), base.path())
            .await
            .expect("memory instance"),
    );
    let registry = CacheRegistry::new(
        CachePolicy::new(true, KeyNamespace::new("app")),
        base.path().to_path_buf(),
        vec![Arc::clone(&disk), memory],
    );
    let state = AdminState {
        cache: Arc::new(AdminCacheService::new(Arc::new(registry))),
    };
    (build_admin_router(state), disk)
}

fn request(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("request should build")
}

#[tokio::test]
async fn purge_returns_no_content_and_empties_disk() {
    let base = TempDir::new().expect("tempdir");
    let (router, disk) = router_with_disk(&base).await;
    disk.set("app.equipments", json!(["drill"])).await.expect("seed");
    disk.set("app.sms%3A42", json!({"id": 42})).await.expect("seed");

    let response = router
        .clone()
        .oneshot(request(Method::POST, "/cache/purge"))
        .await
        .expect("router should respond");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(disk.disk_key_count().await.expect("count"), 0);
}

#[tokio::test]
async fn stats_reports_each_instance() {
    let base = TempDir::new().expect("tempdir");
    let (router, disk) = router_with_disk(&base).await;
    disk.set("app.equipments", json!(["drill"])).await.expect("seed");

    let response = router
        .oneshot(request(Method::GET, "/cache/stats"))
        .await
        .expect("router should respond");
    assert_eq!(response.status(), StatusCode::OK);

    let body = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    let stats: Value = serde_json::from_slice(&body).expect("json body");

    assert_eq!(stats["enabled"], json!(true));
    assert_eq!(stats["instances"][0]["name"], json!("disk"));
    assert_eq!(stats["instances"][0]["storage"], json!("disk"));
    assert_eq!(stats["instances"][0]["disk_keys"], json!(1));
    assert_eq!(stats["instances"][1]["storage"], json!("memory"));
    assert_eq!(stats["instances"][1]["disk_keys"], Value::Null);
}

#[tokio::test]
async fn purge_failure_returns_generic_500() {
    let base = TempDir::new().expect("tempdir");
    let (router, disk) = router_with_disk(&base).await;
    disk.set("k", json!(1)).await.expect("seed");
    // Turning the store root into a file makes listing it fail.
    let root = disk.disk().expect("disk tier").root().to_path_buf();
    std::fs::remove_dir_all(&root).expect("remove root");
    std::fs::write(&root, b"").expect("file in place of root");

    let response = router
        .oneshot(request(Method::POST, "/cache/purge"))
        .await
        .expect("router should respond");
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    assert_eq!(&body[..], b"Cache purge failed");
}

#[tokio::test]
async fn unknown_route_is_not_found() {
    let base = TempDir::new().expect("tempdir");
    let (router, _) = router_with_disk(&base).await;
    let response = router
        .oneshot(request(Method::GET, "/cache/unknown"))
        .await
        .expect("router should respond");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
