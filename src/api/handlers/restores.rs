//! Restore API handlers.

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use utoipa::OpenApi;
use uuid::Uuid;

use crate::api::dto::{CreateRestoreDto, ListRestoresQuery};
use crate::api::SharedState;
use crate::error::Result;
use crate::models::restore::{RestoreDrill, RestoreLogEntry, RestoreRecord};
use crate::services::restore_service::CreateRestoreRequest;

#[derive(OpenApi)]
#[openapi(
    paths(
        create_restore,
        list_restores,
        get_restore,
        get_restore_logs,
        get_drill,
        cleanup_drill,
        rollback_restore,
        cancel_restore,
    ),
    components(schemas(RestoreRecord, RestoreDrill, RestoreLogEntry, CreateRestoreDto))
)]
pub struct RestoreApiDoc;

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_restores).post(create_restore))
        .route("/:id", get(get_restore))
        .route("/:id/logs", get(get_restore_logs))
        .route("/:id/drill", get(get_drill))
        .route("/:id/drill/cleanup", post(cleanup_drill))
        .route("/:id/rollback", post(rollback_restore))
        .route("/:id/cancel", post(cancel_restore))
}

/// POST /api/v1/restores
///
/// Confirmation-phrase or prerequisite failures are rejected before any
/// side effect. The pipeline continues in the background.
#[utoipa::path(
    post,
    path = "",
    context_path = "/api/v1/restores",
    tag = "restores",
    operation_id = "create_restore",
    request_body = CreateRestoreDto,
    responses(
        (status = 200, description = "Restore created and started", body = RestoreRecord),
        (status = 400, description = "Validation failed (confirmation phrase, incomplete backup)"),
        (status = 409, description = "A restore of this backup is already running"),
    ),
)]
pub async fn create_restore(
    State(state): State<SharedState>,
    Json(payload): Json<CreateRestoreDto>,
) -> Result<Json<RestoreRecord>> {
    let restore = state
        .restore_service
        .create(CreateRestoreRequest {
            backup_id: payload.backup_id,
            restore_type: payload.restore_type,
            scope: payload.scope,
            selected_tables: payload.selected_tables,
            selected_files: payload.selected_files,
            confirmation_text: payload.confirmation_text,
        })
        .await?;
    Ok(Json(restore))
}

/// GET /api/v1/restores
#[utoipa::path(
    get,
    path = "",
    context_path = "/api/v1/restores",
    tag = "restores",
    operation_id = "list_restores",
    params(ListRestoresQuery),
    responses(
        (status = 200, description = "List restores", body = Vec<RestoreRecord>),
    ),
)]
pub async fn list_restores(
    State(state): State<SharedState>,
    Query(query): Query<ListRestoresQuery>,
) -> Result<Json<Vec<RestoreRecord>>> {
    let restores = state
        .restore_service
        .list(query.limit.unwrap_or(50), query.offset.unwrap_or(0))
        .await?;
    Ok(Json(restores))
}

/// GET /api/v1/restores/:id
#[utoipa::path(
    get,
    path = "/{id}",
    context_path = "/api/v1/restores",
    tag = "restores",
    operation_id = "get_restore",
    params(("id" = Uuid, Path, description = "Restore ID")),
    responses(
        (status = 200, description = "Restore details", body = RestoreRecord),
        (status = 404, description = "Restore not found"),
    ),
)]
pub async fn get_restore(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RestoreRecord>> {
    Ok(Json(state.restore_service.get_by_id(id).await?))
}

/// GET /api/v1/restores/:id/logs
#[utoipa::path(
    get,
    path = "/{id}/logs",
    context_path = "/api/v1/restores",
    tag = "restores",
    operation_id = "get_restore_logs",
    params(("id" = Uuid, Path, description = "Restore ID")),
    responses(
        (status = 200, description = "Ordered audit trail", body = Vec<RestoreLogEntry>),
    ),
)]
pub async fn get_restore_logs(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<RestoreLogEntry>>> {
    Ok(Json(state.restore_service.logs(id).await?))
}

/// GET /api/v1/restores/:id/drill
#[utoipa::path(
    get,
    path = "/{id}/drill",
    context_path = "/api/v1/restores",
    tag = "restores",
    operation_id = "get_drill",
    params(("id" = Uuid, Path, description = "Restore ID")),
    responses(
        (status = 200, description = "Drill report", body = RestoreDrill),
        (status = 404, description = "No drill record for this restore"),
    ),
)]
pub async fn get_drill(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RestoreDrill>> {
    Ok(Json(state.restore_service.drill_for(id).await?))
}

/// POST /api/v1/restores/:id/drill/cleanup
#[utoipa::path(
    post,
    path = "/{id}/drill/cleanup",
    context_path = "/api/v1/restores",
    tag = "restores",
    operation_id = "cleanup_drill",
    params(("id" = Uuid, Path, description = "Restore ID")),
    responses(
        (status = 200, description = "Drill environment torn down (idempotent)", body = RestoreDrill),
    ),
)]
pub async fn cleanup_drill(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RestoreDrill>> {
    Ok(Json(state.restore_service.cleanup_drill(id).await?))
}

/// POST /api/v1/restores/:id/rollback
#[utoipa::path(
    post,
    path = "/{id}/rollback",
    context_path = "/api/v1/restores",
    tag = "restores",
    operation_id = "rollback_restore",
    params(("id" = Uuid, Path, description = "Restore ID")),
    responses(
        (status = 200, description = "Rollback restore started", body = RestoreRecord),
        (status = 400, description = "No safety-net backup, or the restore was a drill"),
    ),
)]
pub async fn rollback_restore(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RestoreRecord>> {
    Ok(Json(state.restore_service.rollback(id).await?))
}

/// POST /api/v1/restores/:id/cancel
#[utoipa::path(
    post,
    path = "/{id}/cancel",
    context_path = "/api/v1/restores",
    tag = "restores",
    operation_id = "cancel_restore",
    params(("id" = Uuid, Path, description = "Restore ID")),
    responses(
        (status = 200, description = "Restore cancelled", body = RestoreRecord),
        (status = 409, description = "Execution has begun; no longer cancellable"),
    ),
)]
pub async fn cancel_restore(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RestoreRecord>> {
    Ok(Json(state.restore_service.cancel(id).await?))
}
