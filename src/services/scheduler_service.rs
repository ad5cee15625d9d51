//! Backup schedule management and execution.
//!
//! An owned `SchedulerService` arms one timer task per enabled schedule,
//! keyed by schedule id, with explicit arm/disarm/rearm operations and a
//! start/stop lifecycle. On each fire it triggers the backup orchestrator
//! with the schedule's configured type/source, records the run, and enforces
//! max-count retention for the schedule. Recurrence expressions and
//! timezones are validated before a schedule is persisted.

use chrono::{DateTime, Utc};
use cron::Schedule as CronSchedule;
use sqlx::PgPool;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::backup::{BackupStatus, BackupTrigger};
use crate::models::schedule::BackupSchedule;
use crate::services::backup_service::{BackupService, CreateBackupRequest};
use crate::services::restore_service::BoundedWait;

/// Ceiling on how long a fire waits for its backup before enforcing
/// retention anyway.
const FIRE_WAIT_CEILING: Duration = Duration::from_secs(30 * 60);
const FIRE_POLL_INTERVAL: Duration = Duration::from_secs(10);

const SCHEDULE_COLUMNS: &str = "id, name, cron_expression, timezone, backup_type, source, \
     retention_days, max_backups, enabled, last_run_at, next_run_at, created_at, updated_at";

/// Request to create a schedule
#[derive(Debug, Clone)]
pub struct CreateScheduleRequest {
    pub name: String,
    pub cron_expression: String,
    pub timezone: Option<String>,
    pub backup_type: crate::models::backup::BackupType,
    pub source: crate::models::backup::BackupSource,
    pub retention_days: i32,
    pub max_backups: i32,
    pub enabled: bool,
}

/// Request to update a schedule
#[derive(Debug, Clone, Default)]
pub struct UpdateScheduleRequest {
    pub name: Option<String>,
    pub cron_expression: Option<String>,
    pub timezone: Option<String>,
    pub backup_type: Option<crate::models::backup::BackupType>,
    pub source: Option<crate::models::backup::BackupSource>,
    pub retention_days: Option<i32>,
    pub max_backups: Option<i32>,
    pub enabled: Option<bool>,
}

/// Scheduler service owning the armed timers.
#[derive(Clone)]
pub struct SchedulerService {
    db: PgPool,
    backups: Arc<BackupService>,
    timers: Arc<Mutex<HashMap<Uuid, JoinHandle<()>>>>,
}

impl SchedulerService {
    pub fn new(db: PgPool, backups: Arc<BackupService>) -> Self {
        Self {
            db,
            backups,
            timers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Load all enabled schedules and arm a timer for each.
    pub async fn start(&self) -> Result<()> {
        let schedules = sqlx::query_as::<_, BackupSchedule>(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM backup_schedules WHERE enabled = true"
        ))
        .fetch_all(&self.db)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        for schedule in &schedules {
            self.arm(schedule.id).await;
        }

        tracing::info!(armed = schedules.len(), "scheduler started");
        Ok(())
    }

    /// Disarm every timer.
    pub async fn stop(&self) {
        let mut timers = self.timers.lock().await;
        for (_, handle) in timers.drain() {
            handle.abort();
        }
        tracing::info!("scheduler stopped");
    }

    /// Arm (or re-arm) the timer for a schedule.
    pub async fn arm(&self, schedule_id: Uuid) {
        self.disarm(schedule_id).await;

        let service = self.clone();
        let handle = tokio::spawn(async move {
            service.timer_loop(schedule_id).await;
        });
        self.timers.lock().await.insert(schedule_id, handle);
        tracing::debug!(schedule_id = %schedule_id, "schedule armed");
    }

    /// Disarm the timer for a schedule, if armed.
    pub async fn disarm(&self, schedule_id: Uuid) {
        if let Some(handle) = self.timers.lock().await.remove(&schedule_id) {
            handle.abort();
            tracing::debug!(schedule_id = %schedule_id, "schedule disarmed");
        }
    }

    /// Create a schedule; the recurrence expression and timezone are
    /// validated before anything is persisted.
    pub async fn create_schedule(&self, req: CreateScheduleRequest) -> Result<BackupSchedule> {
        let timezone = req.timezone.unwrap_or_else(|| "UTC".into());
        let next = next_run(&req.cron_expression, &timezone)?;
        if req.retention_days <= 0 || req.max_backups <= 0 {
            return Err(AppError::Validation(
                "retention_days and max_backups must be positive".into(),
            ));
        }

        let schedule = sqlx::query_as::<_, BackupSchedule>(&format!(
            "INSERT INTO backup_schedules \
             (name, cron_expression, timezone, backup_type, source, retention_days, max_backups, enabled, next_run_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING {SCHEDULE_COLUMNS}"
        ))
        .bind(&req.name)
        .bind(&req.cron_expression)
        .bind(&timezone)
        .bind(req.backup_type)
        .bind(req.source)
        .bind(req.retention_days)
        .bind(req.max_backups)
        .bind(req.enabled)
        .bind(next)
        .fetch_one(&self.db)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        if schedule.enabled {
            self.arm(schedule.id).await;
        }
        Ok(schedule)
    }

    /// Update a schedule; its timer is re-armed or disarmed immediately.
    pub async fn update_schedule(
        &self,
        id: Uuid,
        req: UpdateScheduleRequest,
    ) -> Result<BackupSchedule> {
        let current = self.get_schedule(id).await?;
        let expression = req
            .cron_expression
            .clone()
            .unwrap_or_else(|| current.cron_expression.clone());
        let timezone = req.timezone.clone().unwrap_or_else(|| current.timezone.clone());
        let next = next_run(&expression, &timezone)?;

        let schedule = sqlx::query_as::<_, BackupSchedule>(&format!(
            "UPDATE backup_schedules SET \
             name = COALESCE($2, name), \
             cron_expression = $3, \
             timezone = $4, \
             backup_type = COALESCE($5, backup_type), \
             source = COALESCE($6, source), \
             retention_days = COALESCE($7, retention_days), \
             max_backups = COALESCE($8, max_backups), \
             enabled = COALESCE($9, enabled), \
             next_run_at = $10, \
             updated_at = NOW() \
             WHERE id = $1 RETURNING {SCHEDULE_COLUMNS}"
        ))
        .bind(id)
        .bind(&req.name)
        .bind(&expression)
        .bind(&timezone)
        .bind(req.backup_type)
        .bind(req.source)
        .bind(req.retention_days)
        .bind(req.max_backups)
        .bind(req.enabled)
        .bind(next)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?
        .ok_or_else(|| AppError::NotFound(format!("schedule {} not found", id)))?;

        if schedule.enabled {
            self.arm(schedule.id).await;
        } else {
            self.disarm(schedule.id).await;
        }
        Ok(schedule)
    }

    /// Delete a schedule and disarm its timer.
    pub async fn delete_schedule(&self, id: Uuid) -> Result<()> {
        self.disarm(id).await;
        let result = sqlx::query("DELETE FROM backup_schedules WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("schedule {} not found", id)));
        }
        Ok(())
    }

    /// Get schedule by ID
    pub async fn get_schedule(&self, id: Uuid) -> Result<BackupSchedule> {
        sqlx::query_as::<_, BackupSchedule>(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM backup_schedules WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?
        .ok_or_else(|| AppError::NotFound(format!("schedule {} not found", id)))
    }

    /// List all schedules
    pub async fn list_schedules(&self) -> Result<Vec<BackupSchedule>> {
        sqlx::query_as::<_, BackupSchedule>(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM backup_schedules ORDER BY name"
        ))
        .fetch_all(&self.db)
        .await
        .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Timer loop for one schedule: sleep until the next occurrence, fire,
    /// repeat. Exits when the schedule is gone, disabled, or has no further
    /// occurrence.
    async fn timer_loop(&self, schedule_id: Uuid) {
        loop {
            let schedule = match self.get_schedule(schedule_id).await {
                Ok(s) if s.enabled => s,
                Ok(_) => break,
                Err(AppError::NotFound(_)) => break,
                Err(e) => {
                    tracing::warn!(schedule_id = %schedule_id, "scheduler read failed: {}", e);
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    continue;
                }
            };

            let next = match next_run(&schedule.cron_expression, &schedule.timezone) {
                Ok(Some(next)) => next,
                Ok(None) => {
                    tracing::warn!(schedule_id = %schedule_id, "schedule has no future occurrence");
                    break;
                }
                Err(e) => {
                    tracing::error!(schedule_id = %schedule_id, "schedule became invalid: {}", e);
                    break;
                }
            };

            let _ = sqlx::query("UPDATE backup_schedules SET next_run_at = $2 WHERE id = $1")
                .bind(schedule_id)
                .bind(next)
                .execute(&self.db)
                .await;

            let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            tokio::time::sleep(wait).await;

            if let Err(e) = self.fire(schedule_id).await {
                tracing::warn!(schedule_id = %schedule_id, "scheduled backup failed to start: {}", e);
            }
        }
    }

    /// Fire a schedule: trigger a backup, record the run, enforce retention.
    async fn fire(&self, schedule_id: Uuid) -> Result<()> {
        let schedule = self.get_schedule(schedule_id).await?;
        if !schedule.enabled {
            return Ok(());
        }

        tracing::info!(schedule = %schedule.name, "executing scheduled backup");
        let backup = self
            .backups
            .create(CreateBackupRequest {
                backup_type: schedule.backup_type,
                source: schedule.source,
                trigger_kind: BackupTrigger::Scheduled,
                description: Some(format!("scheduled by '{}'", schedule.name)),
                schedule_id: Some(schedule.id),
            })
            .await?;

        sqlx::query("UPDATE backup_schedules SET last_run_at = NOW() WHERE id = $1")
            .bind(schedule_id)
            .execute(&self.db)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        // Let the backup finish (bounded) so retention sees it, then prune.
        let wait = BoundedWait {
            interval: FIRE_POLL_INTERVAL,
            timeout: FIRE_WAIT_CEILING,
        };
        let outcome = wait
            .wait_until("scheduled backup", || {
                let backups = self.backups.clone();
                let id = backup.id;
                async move {
                    let b = backups.get_by_id(id).await?;
                    Ok(b.status.is_terminal().then_some(b))
                }
            })
            .await;
        if let Err(e) = outcome {
            tracing::warn!(backup_id = %backup.id, "scheduled backup still running: {}", e);
        }

        let pruned = self.enforce_retention(&schedule).await?;
        if pruned > 0 {
            tracing::info!(schedule = %schedule.name, pruned, "retention pruned backups");
        }
        Ok(())
    }

    /// Keep the newest `max_backups` completed backups for the schedule,
    /// deleting both the artifact and the record of every older one.
    pub async fn enforce_retention(&self, schedule: &BackupSchedule) -> Result<u64> {
        let completed = self
            .backups
            .list(Some(BackupStatus::Completed), Some(schedule.id), 10_000, 0)
            .await?;

        let mut removed = 0u64;
        for backup in excess_beyond_max(&completed, schedule.max_backups as usize) {
            match self.backups.delete_with_artifact(backup).await {
                Ok(()) => removed += 1,
                Err(e) => {
                    tracing::warn!(backup_id = %backup.id, "retention delete failed: {}", e);
                }
            }
        }
        Ok(removed)
    }
}

/// Parse a recurrence expression, accepting the common 5-field form by
/// prepending a seconds column.
pub fn parse_expression(expr: &str) -> Result<CronSchedule> {
    let normalized = if expr.split_whitespace().count() == 5 {
        format!("0 {}", expr)
    } else {
        expr.to_string()
    };
    CronSchedule::from_str(&normalized)
        .map_err(|e| AppError::Validation(format!("invalid cron expression '{}': {}", expr, e)))
}

/// Resolve an IANA timezone name.
pub fn parse_timezone(name: &str) -> Result<chrono_tz::Tz> {
    name.parse::<chrono_tz::Tz>()
        .map_err(|_| AppError::Validation(format!("invalid timezone '{}'", name)))
}

/// Next occurrence of the expression in the given timezone, as UTC.
pub fn next_run(expr: &str, timezone: &str) -> Result<Option<DateTime<Utc>>> {
    let schedule = parse_expression(expr)?;
    let tz = parse_timezone(timezone)?;
    Ok(schedule.upcoming(tz).next().map(|dt| dt.with_timezone(&Utc)))
}

/// The items beyond the newest `max`, given a newest-first slice.
fn excess_beyond_max<T>(items: &[T], max: usize) -> &[T] {
    if items.len() > max {
        &items[max..]
    } else {
        &[]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_field_expressions_are_accepted() {
        assert!(parse_expression("0 3 * * *").is_ok());
        assert!(parse_expression("*/15 * * * *").is_ok());
    }

    #[test]
    fn six_field_expressions_are_accepted() {
        assert!(parse_expression("0 0 3 * * *").is_ok());
    }

    #[test]
    fn malformed_expressions_are_rejected_as_validation_errors() {
        let err = parse_expression("every day at noon").unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(parse_expression("99 99 * * *").is_err());
    }

    #[test]
    fn timezone_names_are_validated() {
        assert!(parse_timezone("UTC").is_ok());
        assert!(parse_timezone("Europe/Oslo").is_ok());
        let err = parse_timezone("Mars/Olympus_Mons").unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn next_run_is_in_the_future() {
        let next = next_run("0 3 * * *", "America/New_York").unwrap().unwrap();
        assert!(next > Utc::now());
    }

    #[test]
    fn timezone_shifts_the_next_occurrence() {
        // 03:00 in Tokyo and 03:00 in UTC are different instants.
        let tokyo = next_run("0 3 * * *", "Asia/Tokyo").unwrap().unwrap();
        let utc = next_run("0 3 * * *", "UTC").unwrap().unwrap();
        assert_ne!(tokyo, utc);
    }

    #[test]
    fn excess_beyond_max_takes_the_oldest() {
        // Newest-first, as retention queries order them.
        let ids = ["d", "c", "b", "a"];
        assert_eq!(excess_beyond_max(&ids, 3), ["a"]);
        assert!(excess_beyond_max(&ids, 4).is_empty());
        assert_eq!(excess_beyond_max(&ids, 1), ["c", "b", "a"]);
    }
}
