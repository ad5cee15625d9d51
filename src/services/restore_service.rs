//! Restore orchestrator.
//!
//! Drives the end-to-end restore pipeline: confirmation gating, artifact
//! validation, the pre-restore safety-net backup, download/decrypt/verify,
//! selective apply through the source extractors, post-restore verification,
//! drills against disposable targets, and rollback to the safety-net backup.
//!
//! The pipeline runs on a background task; callers observe progress through
//! the persisted record. The safety-net wait is the only place one pipeline
//! blocks on another: a bounded poll against a monotonic deadline.

use serde_json::json;
use sqlx::PgPool;
use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::backup::{BackupSource, BackupStatus, BackupTrigger, BackupType};
use crate::models::restore::{
    RestoreDrill, RestoreLogEntry, RestoreLogLevel, RestoreRecord, RestoreScope, RestoreStatus,
    RestoreType,
};
use crate::services::archive_service::ArchiveCodec;
use crate::services::backup_service::{BackupService, CreateBackupRequest};
use crate::services::config_extractor::ConfigExtractor;
use crate::services::database_extractor::DatabaseExtractor;
use crate::services::file_extractor::FileExtractor;
use crate::services::notification_service::{NotificationService, PipelineKind};
use crate::storage::StorageService;

/// Confirmation phrase required for restores that touch production state.
pub const RESTORE_CONFIRMATION_PHRASE: &str = "RESTORE PRODUCTION DATA";

/// Confirmation phrase required for isolated drill restores.
pub const DRILL_CONFIRMATION_PHRASE: &str = "RUN RESTORE DRILL";

/// How often the safety-net backup is polled.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

const RESTORE_COLUMNS: &str = "id, backup_id, restore_type, scope, status, progress, \
     current_step, estimated_seconds_remaining, selected_tables, selected_files, \
     pre_restore_backup_id, restored_records, restored_files, restored_configs, \
     validation_passed, validation_detail, error_message, started_at, completed_at, created_at";

/// Request to start a restore
#[derive(Debug, Clone)]
pub struct CreateRestoreRequest {
    pub backup_id: Uuid,
    pub restore_type: RestoreType,
    pub scope: Vec<RestoreScope>,
    pub selected_tables: Option<Vec<String>>,
    pub selected_files: Option<Vec<String>>,
    pub confirmation_text: String,
}

/// The confirmation phrase a restore type requires.
pub fn required_phrase(restore_type: RestoreType) -> &'static str {
    if restore_type.is_drill() {
        DRILL_CONFIRMATION_PHRASE
    } else {
        RESTORE_CONFIRMATION_PHRASE
    }
}

/// Bounded poll of an asynchronous condition against a monotonic deadline.
///
/// The one cross-pipeline coordination point in the subsystem; interval and
/// timeout are injectable so the wait is testable under a paused clock.
pub(crate) struct BoundedWait {
    pub interval: Duration,
    pub timeout: Duration,
}

impl BoundedWait {
    pub async fn wait_until<T, F, Fut>(&self, what: &str, mut poll: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        let deadline = tokio::time::Instant::now() + self.timeout;
        loop {
            if let Some(value) = poll().await? {
                return Ok(value);
            }
            if tokio::time::Instant::now() + self.interval >= deadline {
                return Err(AppError::Timeout(format!(
                    "{} did not finish within {:?}",
                    what, self.timeout
                )));
            }
            tokio::time::sleep(self.interval).await;
        }
    }
}

/// Restore orchestrator service
#[derive(Clone)]
pub struct RestoreService {
    db: PgPool,
    storage: Arc<StorageService>,
    config: Config,
    notifications: Arc<NotificationService>,
    backups: Arc<BackupService>,
    database_extractor: Arc<DatabaseExtractor>,
    file_extractor: Arc<FileExtractor>,
    config_extractor: Arc<ConfigExtractor>,
    /// Advisory guard: one running restore per source backup in this process
    active: Arc<Mutex<HashSet<Uuid>>>,
    poll_interval: Duration,
    pre_backup_timeout: Duration,
}

impl RestoreService {
    pub fn new(
        db: PgPool,
        storage: Arc<StorageService>,
        config: Config,
        notifications: Arc<NotificationService>,
        backups: Arc<BackupService>,
    ) -> Self {
        let database_extractor = Arc::new(DatabaseExtractor::new(
            db.clone(),
            config.database_url.clone(),
            config.pg_dump_path.clone(),
            config.pg_restore_path.clone(),
        ));
        let file_extractor = Arc::new(FileExtractor::new(config.upload_dir.clone()));
        let config_extractor = Arc::new(ConfigExtractor::new(db.clone()));
        let pre_backup_timeout = Duration::from_secs(config.pre_restore_timeout_secs);

        Self {
            db,
            storage,
            config,
            notifications,
            backups,
            database_extractor,
            file_extractor,
            config_extractor,
            active: Arc::new(Mutex::new(HashSet::new())),
            poll_interval: DEFAULT_POLL_INTERVAL,
            pre_backup_timeout,
        }
    }

    /// Override the safety-net wait parameters (tests).
    pub fn with_wait_params(mut self, interval: Duration, timeout: Duration) -> Self {
        self.poll_interval = interval;
        self.pre_backup_timeout = timeout;
        self
    }

    /// Validate a restore request and start its pipeline on a background
    /// task. Confirmation mismatch or an incomplete source backup is
    /// rejected here, before any side effect.
    pub async fn create(&self, req: CreateRestoreRequest) -> Result<RestoreRecord> {
        if req.scope.is_empty() {
            return Err(AppError::Validation("restore scope must not be empty".into()));
        }

        let phrase = required_phrase(req.restore_type);
        if req.confirmation_text != phrase {
            return Err(AppError::Validation(format!(
                "confirmation text does not match the required phrase for a {:?} restore",
                req.restore_type
            )));
        }

        let backup = self.backups.get_by_id(req.backup_id).await?;
        if backup.status != BackupStatus::Completed {
            return Err(AppError::Validation(format!(
                "backup {} is {}; only completed backups can be restored",
                backup.id, backup.status
            )));
        }

        {
            let mut active = self.active.lock().await;
            if !active.insert(req.backup_id) {
                return Err(AppError::Conflict(format!(
                    "a restore of backup {} is already running",
                    req.backup_id
                )));
            }
        }

        let inserted = sqlx::query_as::<_, RestoreRecord>(&format!(
            "INSERT INTO restores (backup_id, restore_type, scope, selected_tables, selected_files) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {RESTORE_COLUMNS}"
        ))
        .bind(req.backup_id)
        .bind(req.restore_type)
        .bind(&req.scope)
        .bind(&req.selected_tables)
        .bind(&req.selected_files)
        .fetch_one(&self.db)
        .await
        .map_err(|e| AppError::Database(e.to_string()));

        let record = match inserted {
            Ok(r) => r,
            Err(e) => {
                self.active.lock().await.remove(&req.backup_id);
                return Err(e);
            }
        };

        let service = self.clone();
        let restore_id = record.id;
        let backup_id = req.backup_id;
        tokio::spawn(async move {
            service.run(restore_id).await;
            service.active.lock().await.remove(&backup_id);
        });

        Ok(record)
    }

    /// Get restore by ID
    pub async fn get_by_id(&self, id: Uuid) -> Result<RestoreRecord> {
        sqlx::query_as::<_, RestoreRecord>(&format!(
            "SELECT {RESTORE_COLUMNS} FROM restores WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?
        .ok_or_else(|| AppError::NotFound(format!("restore {} not found", id)))
    }

    /// List restores, newest first
    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<RestoreRecord>> {
        sqlx::query_as::<_, RestoreRecord>(&format!(
            "SELECT {RESTORE_COLUMNS} FROM restores ORDER BY created_at DESC LIMIT $1 OFFSET $2"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await
        .map_err(|e| AppError::Database(e.to_string()))
    }

    /// The operator-facing audit trail for one restore, in append order.
    pub async fn logs(&self, restore_id: Uuid) -> Result<Vec<RestoreLogEntry>> {
        sqlx::query_as::<_, RestoreLogEntry>(
            "SELECT id, restore_id, level, step, message, created_at \
             FROM restore_logs WHERE restore_id = $1 ORDER BY id",
        )
        .bind(restore_id)
        .fetch_all(&self.db)
        .await
        .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Cancel a restore. Only legal while it is pending or validating; once
    /// execution mutates external state it runs to completion or failure.
    pub async fn cancel(&self, id: Uuid) -> Result<RestoreRecord> {
        let cancelled = sqlx::query_as::<_, RestoreRecord>(&format!(
            "UPDATE restores SET status = 'failed', error_message = 'cancelled by operator', \
             current_step = 'cancelled', completed_at = NOW() \
             WHERE id = $1 AND status IN ('pending', 'validating') RETURNING {RESTORE_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        match cancelled {
            Some(record) => Ok(record),
            None => {
                let record = self.get_by_id(id).await?;
                Err(AppError::Conflict(format!(
                    "restore {} cannot be cancelled in status {}",
                    id, record.status
                )))
            }
        }
    }

    /// Roll a restore back to its safety-net backup.
    ///
    /// Rejected when no safety-net backup was recorded or the restore was a
    /// drill. The rollback is a brand-new full restore of the safety-net
    /// backup through the same pipeline, not a special code path.
    pub async fn rollback(&self, restore_id: Uuid) -> Result<RestoreRecord> {
        let record = self.get_by_id(restore_id).await?;

        if record.restore_type.is_drill() {
            return Err(AppError::Validation(
                "drill restores cannot be rolled back".into(),
            ));
        }
        let anchor = record.pre_restore_backup_id.ok_or_else(|| {
            AppError::Validation("restore has no safety-net backup to roll back to".into())
        })?;
        if !matches!(
            record.status,
            RestoreStatus::Completed | RestoreStatus::Failed
        ) {
            return Err(AppError::Conflict(format!(
                "restore {} is still running",
                restore_id
            )));
        }

        let rollback = self
            .create(CreateRestoreRequest {
                backup_id: anchor,
                restore_type: RestoreType::Full,
                scope: vec![RestoreScope::All],
                selected_tables: None,
                selected_files: None,
                confirmation_text: RESTORE_CONFIRMATION_PHRASE.to_string(),
            })
            .await?;

        sqlx::query(
            "UPDATE restores SET status = 'rolled_back' \
             WHERE id = $1 AND status IN ('completed', 'failed')",
        )
        .bind(restore_id)
        .execute(&self.db)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        self.log(
            rollback.id,
            RestoreLogLevel::Info,
            "rollback",
            &format!("rolling back restore {} to safety-net backup {}", restore_id, anchor),
        )
        .await?;

        Ok(rollback)
    }

    /// The drill record attached to a drill restore.
    pub async fn drill_for(&self, restore_id: Uuid) -> Result<RestoreDrill> {
        sqlx::query_as::<_, RestoreDrill>(
            "SELECT id, restore_id, environment, passed, report, cleaned_up, created_at \
             FROM restore_drills WHERE restore_id = $1",
        )
        .bind(restore_id)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?
        .ok_or_else(|| AppError::NotFound(format!("no drill record for restore {}", restore_id)))
    }

    /// Tear down a drill's disposable environment. Idempotent: the second
    /// and later calls are no-ops.
    pub async fn cleanup_drill(&self, restore_id: Uuid) -> Result<RestoreDrill> {
        let drill = self.drill_for(restore_id).await?;
        if drill.cleaned_up {
            return Ok(drill);
        }

        self.database_extractor
            .drop_drill_database(&drill.environment)
            .await?;

        let files_dir = drill_files_dir(&drill.environment);
        if files_dir.exists() {
            tokio::fs::remove_dir_all(&files_dir).await?;
        }

        let updated = sqlx::query_as::<_, RestoreDrill>(
            "UPDATE restore_drills SET cleaned_up = true WHERE id = $1 \
             RETURNING id, restore_id, environment, passed, report, cleaned_up, created_at",
        )
        .bind(drill.id)
        .fetch_one(&self.db)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        tracing::info!(environment = %updated.environment, "drill environment torn down");
        Ok(updated)
    }

    /// Run the pipeline for a created restore.
    async fn run(&self, restore_id: Uuid) {
        let result = self.execute_pipeline(restore_id).await;

        match result {
            Ok(true) => {
                tracing::info!(restore_id = %restore_id, "restore completed");
                self.notifications.notify_success(
                    PipelineKind::Restore,
                    restore_id.to_string(),
                    "restore completed".to_string(),
                );
            }
            Ok(false) => {
                tracing::info!(restore_id = %restore_id, "restore stopped before execution");
            }
            Err(e) => {
                tracing::error!(restore_id = %restore_id, "restore failed: {}", e);
                if let Err(log_err) = self
                    .log(restore_id, RestoreLogLevel::Error, "failed", &e.to_string())
                    .await
                {
                    tracing::error!("failed to append restore log: {}", log_err);
                }
                if let Err(update_err) = self.mark_failed(restore_id, &e.to_string()).await {
                    tracing::error!(
                        restore_id = %restore_id,
                        "failed to record restore failure: {}",
                        update_err
                    );
                }
                self.notifications.notify_failure(
                    PipelineKind::Restore,
                    restore_id.to_string(),
                    e.to_string(),
                );
            }
        }
    }

    /// Execute validate -> pre-backup -> apply -> verify -> finalize.
    ///
    /// Returns `Ok(false)` when a transition was lost to a concurrent
    /// cancel. Temp files are dropped on every exit path.
    async fn execute_pipeline(&self, restore_id: Uuid) -> Result<bool> {
        let record = self.get_by_id(restore_id).await?;
        let is_drill = record.restore_type.is_drill();

        // -- Validate -----------------------------------------------------
        if !self
            .transition(restore_id, RestoreStatus::Pending, RestoreStatus::Validating)
            .await?
        {
            return Ok(false);
        }
        self.log(restore_id, RestoreLogLevel::Info, "validate", "validating backup artifact")
            .await?;

        let backup = self.backups.get_by_id(record.backup_id).await?;
        let locator = backup.storage_locator.clone().ok_or_else(|| {
            AppError::Validation(format!("backup {} has no stored artifact", backup.id))
        })?;
        let checksum = backup.checksum.clone().ok_or_else(|| {
            AppError::Validation(format!("backup {} has no recorded checksum", backup.id))
        })?;
        if !self.storage.exists(&locator).await? {
            return Err(AppError::Storage(format!(
                "backup artifact {} is missing from storage",
                locator
            )));
        }
        self.set_step(restore_id, 10, "artifact validated").await?;

        // -- Safety-net backup (skipped for drills) -----------------------
        if !is_drill {
            if !self
                .transition(restore_id, RestoreStatus::Validating, RestoreStatus::PreBackup)
                .await?
            {
                return Ok(false);
            }
            self.log(
                restore_id,
                RestoreLogLevel::Info,
                "pre_backup",
                "starting safety-net backup",
            )
            .await?;

            let pre = self
                .backups
                .create(CreateBackupRequest {
                    backup_type: BackupType::Full,
                    source: BackupSource::All,
                    trigger_kind: BackupTrigger::PreRestore,
                    description: Some(format!("safety-net backup before restore {}", restore_id)),
                    schedule_id: None,
                })
                .await?;

            let wait = BoundedWait {
                interval: self.poll_interval,
                timeout: self.pre_backup_timeout,
            };
            let finished = wait
                .wait_until("safety-net backup", || {
                    let backups = self.backups.clone();
                    let id = pre.id;
                    async move {
                        let b = backups.get_by_id(id).await?;
                        Ok(b.status.is_terminal().then_some(b))
                    }
                })
                .await?;

            if finished.status != BackupStatus::Completed {
                return Err(AppError::Internal(format!(
                    "safety-net backup {} ended {}: {}",
                    finished.id,
                    finished.status,
                    finished.error_message.as_deref().unwrap_or("no error recorded")
                )));
            }

            sqlx::query("UPDATE restores SET pre_restore_backup_id = $2 WHERE id = $1")
                .bind(restore_id)
                .bind(finished.id)
                .execute(&self.db)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
            self.log(
                restore_id,
                RestoreLogLevel::Info,
                "pre_backup",
                &format!("safety-net backup {} completed", finished.id),
            )
            .await?;
            self.set_step(restore_id, 30, "safety-net backup completed").await?;
        }

        // -- Download & decrypt -------------------------------------------
        let entry_status = if is_drill {
            RestoreStatus::Validating
        } else {
            RestoreStatus::PreBackup
        };
        if !self
            .transition(restore_id, entry_status, RestoreStatus::InProgress)
            .await?
        {
            return Ok(false);
        }

        let workspace = tempfile::tempdir()?;
        let artifact_path = workspace.path().join("artifact.svlt");
        self.set_step(restore_id, 40, "downloading artifact").await?;
        self.storage.fetch_file(&locator, &artifact_path).await?;

        let content_dir = workspace.path().join("content");
        let codec = ArchiveCodec::from_passphrase(&self.config.encryption_key);
        codec.open(&artifact_path, &content_dir, &checksum)?;
        self.log(
            restore_id,
            RestoreLogLevel::Info,
            "decrypt",
            "artifact decrypted and checksum verified",
        )
        .await?;

        // -- Selective apply, database -> files -> config -----------------
        let drill_env = is_drill
            .then(|| format!("snapvault_drill_{}", hex::encode(rand::random::<[u8; 4]>())));
        let scopes = RestoreScope::expand_set(&record.scope);

        let mut restored_records: BTreeMap<String, i64> = BTreeMap::new();
        let mut restored_files: Option<i32> = None;
        let mut restored_configs: Option<i32> = None;
        let mut drill_db_url: Option<String> = None;
        let mut applied_files_dir: Option<PathBuf> = None;

        for scope in &scopes {
            let (pct, step) = apply_checkpoint(*scope);
            self.set_step(restore_id, pct, step).await?;

            match scope {
                RestoreScope::Database => {
                    let outcome = self
                        .database_extractor
                        .apply(
                            &content_dir,
                            drill_env.as_deref(),
                            record.selected_tables.as_deref(),
                        )
                        .await?;
                    self.log(
                        restore_id,
                        RestoreLogLevel::Info,
                        "apply",
                        &format!("restored {} tables", outcome.restored_tables.len()),
                    )
                    .await?;
                    restored_records = outcome.restored_tables;
                    drill_db_url = outcome.drill_url;
                }
                RestoreScope::Files => {
                    let drill_dir = drill_env.as_deref().map(drill_files_dir);
                    let outcome = self.file_extractor.apply(
                        &content_dir,
                        drill_dir.as_deref(),
                        record.selected_files.as_deref(),
                    )?;
                    self.log(
                        restore_id,
                        RestoreLogLevel::Info,
                        "apply",
                        &format!("restored {} files", outcome.restored_files),
                    )
                    .await?;
                    restored_files = Some(outcome.restored_files);
                    applied_files_dir = Some(outcome.target_dir);
                }
                RestoreScope::Config => {
                    let count = self.config_extractor.apply(&content_dir, is_drill).await?;
                    self.log(
                        restore_id,
                        RestoreLogLevel::Info,
                        "apply",
                        &format!("restored {} configuration records", count),
                    )
                    .await?;
                    restored_configs = Some(count);
                }
                RestoreScope::All => unreachable!("expand_set never yields All"),
            }
        }

        // -- Verify -------------------------------------------------------
        if !self
            .transition(restore_id, RestoreStatus::InProgress, RestoreStatus::Verifying)
            .await?
        {
            return Ok(false);
        }
        self.set_step(restore_id, 85, "verifying restored data").await?;

        let mut validation_detail = serde_json::Map::new();
        for scope in &scopes {
            let passed = match scope {
                RestoreScope::Database => {
                    self.database_extractor.probe(drill_db_url.as_deref()).await.is_ok()
                }
                RestoreScope::Files => self
                    .file_extractor
                    .probe(applied_files_dir.as_deref()),
                RestoreScope::Config => self.config_extractor.probe().await.is_ok(),
                RestoreScope::All => unreachable!("expand_set never yields All"),
            };
            validation_detail.insert(scope_key(*scope).to_string(), json!(passed));
        }
        let validation_passed = validation_detail.values().all(|v| v == &json!(true));

        // -- Finalize -----------------------------------------------------
        let finished = sqlx::query_as::<_, RestoreRecord>(&format!(
            "UPDATE restores SET status = 'completed', progress = 100, current_step = 'completed', \
             estimated_seconds_remaining = 0, restored_records = $2, restored_files = $3, \
             restored_configs = $4, validation_passed = $5, validation_detail = $6, \
             completed_at = NOW() WHERE id = $1 RETURNING {RESTORE_COLUMNS}"
        ))
        .bind(restore_id)
        .bind(serde_json::to_value(&restored_records)?)
        .bind(restored_files)
        .bind(restored_configs)
        .bind(validation_passed)
        .bind(serde_json::Value::Object(validation_detail.clone()))
        .fetch_one(&self.db)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        if let Some(environment) = drill_env {
            let report = json!({
                "scopes": scopes.iter().map(|s| scope_key(*s)).collect::<Vec<_>>(),
                "validation": validation_detail,
                "restored_records": restored_records,
                "restored_files": restored_files,
                "restored_configs": restored_configs,
            });
            sqlx::query(
                "INSERT INTO restore_drills (restore_id, environment, passed, report) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(restore_id)
            .bind(&environment)
            .bind(finished.validation_passed.unwrap_or(false))
            .bind(report)
            .execute(&self.db)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
            self.log(
                restore_id,
                RestoreLogLevel::Info,
                "drill",
                &format!("drill environment {} awaiting cleanup", environment),
            )
            .await?;
        }

        self.log(restore_id, RestoreLogLevel::Info, "finalize", "restore completed")
            .await?;

        Ok(true)
    }

    /// Conditional status transition; false when the record is no longer in
    /// the expected state (e.g. a concurrent cancel won).
    async fn transition(&self, id: Uuid, from: RestoreStatus, to: RestoreStatus) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE restores SET status = $3, started_at = COALESCE(started_at, NOW()) \
             WHERE id = $1 AND status = $2",
        )
        .bind(id)
        .bind(from)
        .bind(to)
        .execute(&self.db)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(result.rows_affected() == 1)
    }

    async fn set_step(&self, id: Uuid, percent: i32, step: &str) -> Result<()> {
        sqlx::query(
            "UPDATE restores SET progress = $2, current_step = $3, \
             estimated_seconds_remaining = CASE WHEN $2 > 0 AND started_at IS NOT NULL \
                 THEN (EXTRACT(EPOCH FROM (NOW() - started_at)) * (100 - $2) / $2)::INT \
                 ELSE NULL END \
             WHERE id = $1",
        )
        .bind(id)
        .bind(percent)
        .bind(step)
        .execute(&self.db)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;
        tracing::debug!(restore_id = %id, percent, step, "restore progress");
        Ok(())
    }

    /// Append to the restore's audit trail. Never mutated, only appended.
    async fn log(
        &self,
        restore_id: Uuid,
        level: RestoreLogLevel,
        step: &str,
        message: &str,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO restore_logs (restore_id, level, step, message) VALUES ($1, $2, $3, $4)",
        )
        .bind(restore_id)
        .bind(level)
        .bind(step)
        .bind(message)
        .execute(&self.db)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn mark_failed(&self, restore_id: Uuid, message: &str) -> Result<()> {
        sqlx::query(
            "UPDATE restores SET status = 'failed', error_message = $2, \
             current_step = 'failed', completed_at = NOW() WHERE id = $1",
        )
        .bind(restore_id)
        .bind(message)
        .execute(&self.db)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }
}

/// Disposable directory file-scope drills unpack into.
fn drill_files_dir(environment: &str) -> PathBuf {
    std::env::temp_dir().join(environment)
}

fn scope_key(scope: RestoreScope) -> &'static str {
    match scope {
        RestoreScope::Database => "database",
        RestoreScope::Files => "files",
        RestoreScope::Config => "config",
        RestoreScope::All => "all",
    }
}

/// Progress checkpoint reached before applying a scope.
fn apply_checkpoint(scope: RestoreScope) -> (i32, &'static str) {
    match scope {
        RestoreScope::Database => (50, "restoring database"),
        RestoreScope::Files => (65, "restoring files"),
        RestoreScope::Config => (75, "restoring configuration"),
        RestoreScope::All => (50, "restoring"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn required_phrase_differs_per_type() {
        assert_eq!(required_phrase(RestoreType::Full), RESTORE_CONFIRMATION_PHRASE);
        assert_eq!(required_phrase(RestoreType::Partial), RESTORE_CONFIRMATION_PHRASE);
        assert_eq!(
            required_phrase(RestoreType::PointInTime),
            RESTORE_CONFIRMATION_PHRASE
        );
        assert_eq!(required_phrase(RestoreType::Drill), DRILL_CONFIRMATION_PHRASE);
        assert_ne!(RESTORE_CONFIRMATION_PHRASE, DRILL_CONFIRMATION_PHRASE);
    }

    #[test]
    fn ordinary_phrase_never_authorizes_a_drill() {
        // A drill requested with the ordinary restore phrase must mismatch.
        assert_ne!(required_phrase(RestoreType::Drill), RESTORE_CONFIRMATION_PHRASE);
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_wait_returns_once_condition_holds() {
        let wait = BoundedWait {
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(60),
        };
        let calls = AtomicU32::new(0);

        let value = wait
            .wait_until("test condition", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move { Ok((n >= 3).then_some("done")) }
            })
            .await
            .unwrap();

        assert_eq!(value, "done");
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_wait_times_out_at_the_deadline() {
        let wait = BoundedWait {
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(30),
        };
        let calls = AtomicU32::new(0);

        let err = wait
            .wait_until::<(), _, _>("safety-net backup", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Ok(None) }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Timeout(_)));
        // Polled at t=0,5,...,25; the poll that would cross the deadline
        // is never slept for.
        assert_eq!(calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_wait_propagates_poll_errors() {
        let wait = BoundedWait {
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(10),
        };

        let err = wait
            .wait_until::<(), _, _>("probe", || async {
                Err(AppError::Database("connection lost".into()))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Database(_)));
    }

    #[test]
    fn apply_checkpoints_follow_scope_order() {
        let scopes = RestoreScope::expand_set(&[RestoreScope::All]);
        let mut last = 40;
        for scope in scopes {
            let (pct, _) = apply_checkpoint(scope);
            assert!(pct > last);
            last = pct;
        }
        assert!(last < 85, "apply checkpoints stay below the verify step");
    }

    #[test]
    fn drill_files_dir_is_under_tmp() {
        let dir = drill_files_dir("snapvault_drill_ab12cd34");
        assert!(dir.ends_with("snapvault_drill_ab12cd34"));
    }
}
