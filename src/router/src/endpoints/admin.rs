use crate::RouterState;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};

/// GET /health
pub async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

/// GET /metrics
///
/// Purge counters since startup
#[tracing::instrument]
pub async fn metrics<S: RouterState>(state: State<S>) -> impl IntoResponse {
    Json(state.purge().metrics().snapshot())
}
