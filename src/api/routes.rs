//! Route definitions for the API.

use axum::{routing::get, Json, Router};

use super::handlers;
use super::SharedState;

/// Create the main API router
pub fn create_router(state: SharedState) -> Router {
    // Build OpenAPI spec once at startup
    let openapi = super::openapi::build_openapi();

    Router::new()
        // Health endpoints
        .route("/health", get(handlers::health::health_check))
        .route("/ready", get(handlers::health::readiness_check))
        .route(
            "/api/v1/openapi.json",
            get(move || async move { Json(openapi) }),
        )
        .nest("/api/v1/backups", handlers::backups::router())
        .nest("/api/v1/restores", handlers::restores::router())
        .nest("/api/v1/schedules", handlers::schedules::router())
        .with_state(state)
}
