use super::state::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};

/// GET /sessions
/// Statistics for every connected call session
pub async fn list_sessions(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.stats().await))
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
