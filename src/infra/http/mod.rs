//! Administrative HTTP surface.

mod cache;

use std::sync::Arc;

use axum::{
    Router,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};

use crate::application::admin::AdminCacheService;

#[derive(Clone)]
pub struct AdminState {
    pub cache: Arc<AdminCacheService>,
}

pub fn build_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/health", get(admin_health))
        .route("/cache/purge", post(cache::purge_cache))
        .route("/cache/stats", get(cache::cache_stats))
        .with_state(state)
}

async fn admin_health() -> Response {
    StatusCode::NO_CONTENT.into_response()
}
