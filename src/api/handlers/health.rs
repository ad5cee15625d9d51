//! Health and readiness endpoints.

use axum::{extract::State, Json};
use serde_json::json;

use crate::api::SharedState;
use crate::error::{AppError, Result};

/// GET /health - process liveness
pub async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /ready - database reachability
pub async fn readiness_check(State(state): State<SharedState>) -> Result<Json<serde_json::Value>> {
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(&state.db)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

    Ok(Json(json!({ "status": "ready" })))
}
