//! Health check endpoints

use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::state::AppState;

/// Basic health check
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Liveness probe: the process is up
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// Readiness probe: the database is reachable
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    match sqlx::query("SELECT 1").execute(&state.pool).await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
