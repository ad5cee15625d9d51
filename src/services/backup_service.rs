//! Backup orchestrator.
//!
//! Drives the end-to-end backup pipeline: record lifecycle, source capture,
//! sealing, upload, retention bookkeeping. `create` persists a pending
//! record and returns immediately; the pipeline continues on a background
//! task and reports progress through the record. Backups are never retried
//! automatically.

use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::backup::{
    Backup, BackupSource, BackupStatus, BackupTrigger, BackupType, SourceSummary,
};
use crate::services::archive_service::ArchiveCodec;
use crate::services::config_extractor::ConfigExtractor;
use crate::services::database_extractor::DatabaseExtractor;
use crate::services::file_extractor::FileExtractor;
use crate::services::notification_service::{NotificationService, PipelineKind};
use crate::storage::StorageService;

/// Retention applied to backups that do not belong to a schedule.
pub const DEFAULT_RETENTION_DAYS: i64 = 30;

/// Optional in-process progress observer for embedding callers; the
/// persisted record remains the source of truth.
pub type ProgressCallback = Arc<dyn Fn(i32, &str) + Send + Sync>;

const BACKUP_COLUMNS: &str = "id, backup_type, source, trigger_kind, status, progress, \
     storage_locator, size_bytes, checksum, contents, schedule_id, description, \
     error_message, started_at, completed_at, expires_at, created_at";

/// Request to create a backup
#[derive(Debug, Clone)]
pub struct CreateBackupRequest {
    pub backup_type: BackupType,
    pub source: BackupSource,
    pub trigger_kind: BackupTrigger,
    pub description: Option<String>,
    pub schedule_id: Option<Uuid>,
}

/// Backup orchestrator service
#[derive(Clone)]
pub struct BackupService {
    db: PgPool,
    storage: Arc<StorageService>,
    config: Config,
    notifications: Arc<NotificationService>,
    database_extractor: Arc<DatabaseExtractor>,
    file_extractor: Arc<FileExtractor>,
    config_extractor: Arc<ConfigExtractor>,
    /// Advisory guard: one running pipeline per backup id in this process
    active: Arc<Mutex<HashSet<Uuid>>>,
}

impl BackupService {
    pub fn new(
        db: PgPool,
        storage: Arc<StorageService>,
        config: Config,
        notifications: Arc<NotificationService>,
    ) -> Self {
        let database_extractor = Arc::new(DatabaseExtractor::new(
            db.clone(),
            config.database_url.clone(),
            config.pg_dump_path.clone(),
            config.pg_restore_path.clone(),
        ));
        let file_extractor = Arc::new(FileExtractor::new(config.upload_dir.clone()));
        let config_extractor = Arc::new(ConfigExtractor::new(db.clone()));

        Self {
            db,
            storage,
            config,
            notifications,
            database_extractor,
            file_extractor,
            config_extractor,
            active: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Create a backup record and start its pipeline on a background task.
    ///
    /// The returned record is the caller's handle; observe progress by
    /// re-reading it.
    pub async fn create(&self, req: CreateBackupRequest) -> Result<Backup> {
        self.create_with_progress(req, None).await
    }

    /// As [`create`](Self::create), with an in-process progress callback.
    pub async fn create_with_progress(
        &self,
        req: CreateBackupRequest,
        progress: Option<ProgressCallback>,
    ) -> Result<Backup> {
        if let Some(schedule_id) = req.schedule_id {
            let running: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM backups WHERE schedule_id = $1 AND status IN ('pending', 'in_progress')",
            )
            .bind(schedule_id)
            .fetch_one(&self.db)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
            if running > 0 {
                return Err(AppError::Conflict(format!(
                    "a backup for schedule {} is already running",
                    schedule_id
                )));
            }
        }

        let backup = sqlx::query_as::<_, Backup>(&format!(
            "INSERT INTO backups (backup_type, source, trigger_kind, description, schedule_id) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {BACKUP_COLUMNS}"
        ))
        .bind(req.backup_type)
        .bind(req.source)
        .bind(req.trigger_kind)
        .bind(&req.description)
        .bind(req.schedule_id)
        .fetch_one(&self.db)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        let service = self.clone();
        let backup_id = backup.id;
        tokio::spawn(async move {
            service.run(backup_id, progress).await;
        });

        Ok(backup)
    }

    /// Get backup by ID
    pub async fn get_by_id(&self, id: Uuid) -> Result<Backup> {
        sqlx::query_as::<_, Backup>(&format!(
            "SELECT {BACKUP_COLUMNS} FROM backups WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?
        .ok_or_else(|| AppError::NotFound(format!("backup {} not found", id)))
    }

    /// List backups, newest first
    pub async fn list(
        &self,
        status: Option<BackupStatus>,
        schedule_id: Option<Uuid>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Backup>> {
        sqlx::query_as::<_, Backup>(&format!(
            "SELECT {BACKUP_COLUMNS} FROM backups \
             WHERE ($1::backup_status IS NULL OR status = $1) \
               AND ($2::uuid IS NULL OR schedule_id = $2) \
             ORDER BY created_at DESC LIMIT $3 OFFSET $4"
        ))
        .bind(status)
        .bind(schedule_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await
        .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Cancel a backup. Only legal while it is still pending; once the
    /// pipeline has claimed the record it runs to completion or failure.
    pub async fn cancel(&self, id: Uuid) -> Result<Backup> {
        let cancelled = sqlx::query_as::<_, Backup>(&format!(
            "UPDATE backups SET status = 'cancelled', completed_at = NOW() \
             WHERE id = $1 AND status = 'pending' RETURNING {BACKUP_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        match cancelled {
            Some(backup) => Ok(backup),
            None => {
                let backup = self.get_by_id(id).await?;
                Err(AppError::Conflict(format!(
                    "backup {} cannot be cancelled in status {}",
                    id, backup.status
                )))
            }
        }
    }

    /// Delete a terminal backup: the stored artifact first, then the record.
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        let backup = self.get_by_id(id).await?;
        if !backup.status.is_terminal() {
            return Err(AppError::Conflict(format!(
                "backup {} is still running",
                id
            )));
        }
        self.delete_with_artifact(&backup).await
    }

    /// Remove the stored artifact (if any) and the record.
    pub(crate) async fn delete_with_artifact(&self, backup: &Backup) -> Result<()> {
        if let Some(locator) = &backup.storage_locator {
            if self.storage.exists(locator).await? {
                self.storage.delete(locator).await?;
            }
        }
        sqlx::query("DELETE FROM backups WHERE id = $1")
            .bind(backup.id)
            .execute(&self.db)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Delete completed backups whose expiry date has passed, regardless of
    /// schedule. Runs opportunistically after each pipeline.
    pub async fn cleanup_expired(&self) -> Result<u64> {
        let expired = sqlx::query_as::<_, Backup>(&format!(
            "SELECT {BACKUP_COLUMNS} FROM backups \
             WHERE status = 'completed' AND expires_at IS NOT NULL AND expires_at < NOW()"
        ))
        .fetch_all(&self.db)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        let mut removed = 0u64;
        for backup in &expired {
            match self.delete_with_artifact(backup).await {
                Ok(()) => removed += 1,
                Err(e) => {
                    tracing::warn!(backup_id = %backup.id, "expiry cleanup failed: {}", e);
                }
            }
        }

        if removed > 0 {
            tracing::info!(removed, "expired backups pruned");
        }
        Ok(removed)
    }

    /// Run the pipeline for a created backup.
    async fn run(&self, backup_id: Uuid, progress: Option<ProgressCallback>) {
        {
            let mut active = self.active.lock().await;
            if !active.insert(backup_id) {
                tracing::warn!(backup_id = %backup_id, "backup pipeline already running, skipping");
                return;
            }
        }

        let result = self.execute_pipeline(backup_id, &progress).await;

        self.active.lock().await.remove(&backup_id);

        match result {
            Ok(Some(backup)) => {
                tracing::info!(
                    backup_id = %backup_id,
                    size_bytes = backup.size_bytes.unwrap_or(0),
                    "backup completed"
                );
                self.notifications.notify_success(
                    PipelineKind::Backup,
                    backup_id.to_string(),
                    format!("backup completed ({} bytes)", backup.size_bytes.unwrap_or(0)),
                );
            }
            Ok(None) => {
                tracing::info!(backup_id = %backup_id, "backup was cancelled before it started");
            }
            Err(e) => {
                tracing::error!(backup_id = %backup_id, "backup failed: {}", e);
                if let Err(update_err) = self.mark_failed(backup_id, &e.to_string()).await {
                    tracing::error!(
                        backup_id = %backup_id,
                        "failed to record backup failure: {}",
                        update_err
                    );
                }
                self.notifications.notify_failure(
                    PipelineKind::Backup,
                    backup_id.to_string(),
                    e.to_string(),
                );
            }
        }
    }

    /// Execute the capture -> seal -> upload -> finalize sequence.
    ///
    /// Returns `Ok(None)` when the record was cancelled before the pipeline
    /// could claim it. The temp workspace is dropped on every exit path.
    async fn execute_pipeline(
        &self,
        backup_id: Uuid,
        progress: &Option<ProgressCallback>,
    ) -> Result<Option<Backup>> {
        // Claim pending -> in_progress; loses to a concurrent cancel.
        let claimed = sqlx::query_as::<_, Backup>(&format!(
            "UPDATE backups SET status = 'in_progress', started_at = NOW() \
             WHERE id = $1 AND status = 'pending' RETURNING {BACKUP_COLUMNS}"
        ))
        .bind(backup_id)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        let backup = match claimed {
            Some(b) => b,
            None => return Ok(None),
        };

        let workspace = tempfile::tempdir()?;
        let capture_dir = workspace.path().join("capture");
        std::fs::create_dir_all(&capture_dir)?;

        let data_only = backup.backup_type != BackupType::Full;
        let mut contents: BTreeMap<String, SourceSummary> = BTreeMap::new();

        for source in backup.source.expand() {
            let (checkpoint, step) = capture_checkpoint(source);
            self.set_progress(backup_id, checkpoint, step, progress).await?;

            let summary = match source {
                BackupSource::Database => {
                    self.database_extractor.capture(&capture_dir, data_only).await?
                }
                BackupSource::Files => self.file_extractor.capture(&capture_dir)?,
                BackupSource::Config => self.config_extractor.capture(&capture_dir).await?,
                BackupSource::All => unreachable!("expand() never yields All"),
            };
            contents.insert(source_key(source).to_string(), summary);
        }

        self.set_progress(backup_id, 80, "sealing archive", progress).await?;
        let artifact_path = workspace.path().join(format!("{}.svlt", backup_id));
        let codec = ArchiveCodec::from_passphrase(&self.config.encryption_key);
        let sealed = codec.seal(&capture_dir, &artifact_path)?;

        self.set_progress(backup_id, 90, "uploading artifact", progress).await?;
        let locator = artifact_locator(backup_id, Utc::now());
        self.storage.put_file(&locator, &artifact_path).await?;

        let retention_days = match backup.schedule_id {
            Some(schedule_id) => sqlx::query_scalar::<_, i32>(
                "SELECT retention_days FROM backup_schedules WHERE id = $1",
            )
            .bind(schedule_id)
            .fetch_optional(&self.db)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
            .map(i64::from),
            None => None,
        };
        let expires_at = expiry_for(retention_days, Utc::now());

        let completed = sqlx::query_as::<_, Backup>(&format!(
            "UPDATE backups SET status = 'completed', progress = 100, storage_locator = $2, \
             size_bytes = $3, checksum = $4, contents = $5, expires_at = $6, completed_at = NOW() \
             WHERE id = $1 RETURNING {BACKUP_COLUMNS}"
        ))
        .bind(backup_id)
        .bind(&locator)
        .bind(sealed.size_bytes)
        .bind(&sealed.checksum)
        .bind(serde_json::to_value(&contents)?)
        .bind(expires_at)
        .fetch_one(&self.db)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        if let Some(cb) = progress {
            cb(100, "completed");
        }

        // Opportunistic expiry sweep; never fails the completed backup.
        if let Err(e) = self.cleanup_expired().await {
            tracing::warn!("post-backup expiry sweep failed: {}", e);
        }

        Ok(Some(completed))
    }

    async fn set_progress(
        &self,
        backup_id: Uuid,
        percent: i32,
        step: &str,
        progress: &Option<ProgressCallback>,
    ) -> Result<()> {
        sqlx::query("UPDATE backups SET progress = $2 WHERE id = $1")
            .bind(backup_id)
            .bind(percent)
            .execute(&self.db)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        if let Some(cb) = progress {
            cb(percent, step);
        }
        tracing::debug!(backup_id = %backup_id, percent, step, "backup progress");
        Ok(())
    }

    async fn mark_failed(&self, backup_id: Uuid, message: &str) -> Result<()> {
        sqlx::query(
            "UPDATE backups SET status = 'failed', error_message = $2, completed_at = NOW() \
             WHERE id = $1",
        )
        .bind(backup_id)
        .bind(message)
        .execute(&self.db)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }
}

/// Progress checkpoint reached before capturing a source.
fn capture_checkpoint(source: BackupSource) -> (i32, &'static str) {
    match source {
        BackupSource::Database => (10, "capturing database"),
        BackupSource::Files => (40, "capturing files"),
        BackupSource::Config => (70, "capturing configuration"),
        BackupSource::All => (10, "capturing"),
    }
}

fn source_key(source: BackupSource) -> &'static str {
    match source {
        BackupSource::Database => "database",
        BackupSource::Files => "files",
        BackupSource::Config => "config",
        BackupSource::All => "all",
    }
}

/// Time-partitioned storage locator for a sealed artifact.
fn artifact_locator(backup_id: Uuid, at: DateTime<Utc>) -> String {
    format!("backups/{}/{}.svlt", at.format("%Y/%m/%d"), backup_id)
}

/// When a backup expires: the owning schedule's retention, or the manual
/// default of 30 days.
fn expiry_for(retention_days: Option<i64>, created_at: DateTime<Utc>) -> DateTime<Utc> {
    created_at + Duration::days(retention_days.unwrap_or(DEFAULT_RETENTION_DAYS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn manual_backup_expires_thirty_days_after_creation() {
        let created = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(
            expiry_for(None, created),
            Utc.with_ymd_and_hms(2026, 3, 31, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn scheduled_backup_expiry_follows_retention_days() {
        let created = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        assert_eq!(
            expiry_for(Some(7), created),
            Utc.with_ymd_and_hms(2026, 3, 8, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn locator_is_time_partitioned() {
        let id = Uuid::nil();
        let at = Utc.with_ymd_and_hms(2026, 7, 4, 3, 0, 0).unwrap();
        assert_eq!(
            artifact_locator(id, at),
            "backups/2026/07/04/00000000-0000-0000-0000-000000000000.svlt"
        );
    }

    #[test]
    fn capture_checkpoints_are_monotonic() {
        let order = BackupSource::All.expand();
        let mut last = 0;
        for source in order {
            let (pct, _) = capture_checkpoint(source);
            assert!(pct > last);
            last = pct;
        }
        assert!(last < 80, "source checkpoints stay below the archive step");
    }
}
