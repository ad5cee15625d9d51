//! Backup schedule API handlers.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use utoipa::OpenApi;
use uuid::Uuid;

use crate::api::dto::{CreateScheduleDto, UpdateScheduleDto};
use crate::api::SharedState;
use crate::error::Result;
use crate::models::schedule::BackupSchedule;
use crate::services::scheduler_service::{CreateScheduleRequest, UpdateScheduleRequest};

#[derive(OpenApi)]
#[openapi(
    paths(list_schedules, create_schedule, get_schedule, update_schedule, delete_schedule),
    components(schemas(BackupSchedule, CreateScheduleDto, UpdateScheduleDto))
)]
pub struct ScheduleApiDoc;

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_schedules).post(create_schedule))
        .route(
            "/:id",
            get(get_schedule).patch(update_schedule).delete(delete_schedule),
        )
}

/// GET /api/v1/schedules
#[utoipa::path(
    get,
    path = "",
    context_path = "/api/v1/schedules",
    tag = "schedules",
    operation_id = "list_schedules",
    responses(
        (status = 200, description = "List backup schedules", body = Vec<BackupSchedule>),
    ),
)]
pub async fn list_schedules(
    State(state): State<SharedState>,
) -> Result<Json<Vec<BackupSchedule>>> {
    Ok(Json(state.scheduler.list_schedules().await?))
}

/// POST /api/v1/schedules
#[utoipa::path(
    post,
    path = "",
    context_path = "/api/v1/schedules",
    tag = "schedules",
    operation_id = "create_schedule",
    request_body = CreateScheduleDto,
    responses(
        (status = 200, description = "Schedule created and armed", body = BackupSchedule),
        (status = 400, description = "Invalid recurrence expression or timezone"),
    ),
)]
pub async fn create_schedule(
    State(state): State<SharedState>,
    Json(payload): Json<CreateScheduleDto>,
) -> Result<Json<BackupSchedule>> {
    let schedule = state
        .scheduler
        .create_schedule(CreateScheduleRequest {
            name: payload.name,
            cron_expression: payload.cron_expression,
            timezone: payload.timezone,
            backup_type: payload.backup_type,
            source: payload.source,
            retention_days: payload.retention_days,
            max_backups: payload.max_backups,
            enabled: payload.enabled,
        })
        .await?;
    Ok(Json(schedule))
}

/// GET /api/v1/schedules/:id
#[utoipa::path(
    get,
    path = "/{id}",
    context_path = "/api/v1/schedules",
    tag = "schedules",
    operation_id = "get_schedule",
    params(("id" = Uuid, Path, description = "Schedule ID")),
    responses(
        (status = 200, description = "Schedule details", body = BackupSchedule),
        (status = 404, description = "Schedule not found"),
    ),
)]
pub async fn get_schedule(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<BackupSchedule>> {
    Ok(Json(state.scheduler.get_schedule(id).await?))
}

/// PATCH /api/v1/schedules/:id
#[utoipa::path(
    patch,
    path = "/{id}",
    context_path = "/api/v1/schedules",
    tag = "schedules",
    operation_id = "update_schedule",
    params(("id" = Uuid, Path, description = "Schedule ID")),
    request_body = UpdateScheduleDto,
    responses(
        (status = 200, description = "Schedule updated; timer re-armed or disarmed", body = BackupSchedule),
    ),
)]
pub async fn update_schedule(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateScheduleDto>,
) -> Result<Json<BackupSchedule>> {
    let schedule = state
        .scheduler
        .update_schedule(
            id,
            UpdateScheduleRequest {
                name: payload.name,
                cron_expression: payload.cron_expression,
                timezone: payload.timezone,
                backup_type: payload.backup_type,
                source: payload.source,
                retention_days: payload.retention_days,
                max_backups: payload.max_backups,
                enabled: payload.enabled,
            },
        )
        .await?;
    Ok(Json(schedule))
}

/// DELETE /api/v1/schedules/:id
#[utoipa::path(
    delete,
    path = "/{id}",
    context_path = "/api/v1/schedules",
    tag = "schedules",
    operation_id = "delete_schedule",
    params(("id" = Uuid, Path, description = "Schedule ID")),
    responses(
        (status = 204, description = "Schedule deleted and disarmed"),
    ),
)]
pub async fn delete_schedule(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<axum::http::StatusCode> {
    state.scheduler.delete_schedule(id).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}
