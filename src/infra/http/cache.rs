use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use super::AdminState;

pub(super) async fn purge_cache(State(state): State<AdminState>) -> Response {
    match state.cache.purge().await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}

pub(super) async fn cache_stats(State(state): State<AdminState>) -> Response {
    match state.cache.stats().await {
        Ok(view) => Json(view).into_response(),
        Err(err) => err.into_response(),
    }
}
