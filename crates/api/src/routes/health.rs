//! Health and readiness probes.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/registry", get(registry_health))
}

/// Liveness plus database connectivity.
async fn health(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    match markbatch_db::health_check(&state.pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "status": "ok", "database": "up" })),
        ),
        Err(e) => {
            tracing::error!(error = %e, "Database health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "degraded", "database": "down" })),
            )
        }
    }
}

/// Upstream registry reachability. Consumes one paced request, so this
/// is meant for operators, not automated high-frequency probes.
async fn registry_health(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    match state.registry.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "status": "ok", "registry": "up" })),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "Registry health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "degraded", "registry": "down", "error": e.to_string() })),
            )
        }
    }
}
