//! Backup API handlers.

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use utoipa::OpenApi;
use uuid::Uuid;

use crate::api::dto::{CreateBackupDto, ListBackupsQuery};
use crate::api::SharedState;
use crate::error::Result;
use crate::models::backup::{Backup, BackupTrigger};
use crate::services::backup_service::CreateBackupRequest;

#[derive(OpenApi)]
#[openapi(
    paths(create_backup, list_backups, get_backup, cancel_backup, delete_backup),
    components(schemas(Backup, CreateBackupDto))
)]
pub struct BackupApiDoc;

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_backups).post(create_backup))
        .route("/:id", get(get_backup).delete(delete_backup))
        .route("/:id/cancel", post(cancel_backup))
}

/// POST /api/v1/backups
///
/// Creates the record and returns immediately; the pipeline continues in
/// the background. Poll the record for progress.
#[utoipa::path(
    post,
    path = "",
    context_path = "/api/v1/backups",
    tag = "backups",
    operation_id = "create_backup",
    request_body = CreateBackupDto,
    responses(
        (status = 200, description = "Backup created and started", body = Backup),
    ),
)]
pub async fn create_backup(
    State(state): State<SharedState>,
    Json(payload): Json<CreateBackupDto>,
) -> Result<Json<Backup>> {
    let backup = state
        .backup_service
        .create(CreateBackupRequest {
            backup_type: payload.backup_type,
            source: payload.source,
            trigger_kind: BackupTrigger::Manual,
            description: payload.description,
            schedule_id: None,
        })
        .await?;
    Ok(Json(backup))
}

/// GET /api/v1/backups
#[utoipa::path(
    get,
    path = "",
    context_path = "/api/v1/backups",
    tag = "backups",
    operation_id = "list_backups",
    params(ListBackupsQuery),
    responses(
        (status = 200, description = "List backups", body = Vec<Backup>),
    ),
)]
pub async fn list_backups(
    State(state): State<SharedState>,
    Query(query): Query<ListBackupsQuery>,
) -> Result<Json<Vec<Backup>>> {
    let backups = state
        .backup_service
        .list(
            query.status,
            query.schedule_id,
            query.limit.unwrap_or(50),
            query.offset.unwrap_or(0),
        )
        .await?;
    Ok(Json(backups))
}

/// GET /api/v1/backups/:id
#[utoipa::path(
    get,
    path = "/{id}",
    context_path = "/api/v1/backups",
    tag = "backups",
    operation_id = "get_backup",
    params(("id" = Uuid, Path, description = "Backup ID")),
    responses(
        (status = 200, description = "Backup details", body = Backup),
        (status = 404, description = "Backup not found"),
    ),
)]
pub async fn get_backup(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Backup>> {
    Ok(Json(state.backup_service.get_by_id(id).await?))
}

/// POST /api/v1/backups/:id/cancel
#[utoipa::path(
    post,
    path = "/{id}/cancel",
    context_path = "/api/v1/backups",
    tag = "backups",
    operation_id = "cancel_backup",
    params(("id" = Uuid, Path, description = "Backup ID")),
    responses(
        (status = 200, description = "Backup cancelled", body = Backup),
        (status = 409, description = "Backup is no longer cancellable"),
    ),
)]
pub async fn cancel_backup(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Backup>> {
    Ok(Json(state.backup_service.cancel(id).await?))
}

/// DELETE /api/v1/backups/:id
#[utoipa::path(
    delete,
    path = "/{id}",
    context_path = "/api/v1/backups",
    tag = "backups",
    operation_id = "delete_backup",
    params(("id" = Uuid, Path, description = "Backup ID")),
    responses(
        (status = 204, description = "Backup and stored artifact deleted"),
        (status = 409, description = "Backup is still running"),
    ),
)]
pub async fn delete_backup(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<axum::http::StatusCode> {
    state.backup_service.delete(id).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}
