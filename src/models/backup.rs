//! Backup records: one row per snapshot attempt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Backup type enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "backup_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BackupType {
    Full,
    Incremental,
    Differential,
}

/// Which sources a backup captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "backup_source", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BackupSource {
    Database,
    Files,
    Config,
    All,
}

/// What started a backup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "backup_trigger", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BackupTrigger {
    Scheduled,
    Manual,
    PreRestore,
}

/// Backup status enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "backup_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BackupStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl BackupStatus {
    /// A terminal record is never mutated again except by retention cleanup.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BackupStatus::Completed | BackupStatus::Failed | BackupStatus::Cancelled
        )
    }
}

impl std::fmt::Display for BackupStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackupStatus::Pending => write!(f, "pending"),
            BackupStatus::InProgress => write!(f, "in_progress"),
            BackupStatus::Completed => write!(f, "completed"),
            BackupStatus::Failed => write!(f, "failed"),
            BackupStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Backup entity: one snapshot attempt.
///
/// `storage_locator` and `checksum` are non-null exactly when the backup
/// completed; the pipeline that created a backup is the only writer until it
/// reaches a terminal status.
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct Backup {
    pub id: Uuid,
    pub backup_type: BackupType,
    pub source: BackupSource,
    #[serde(rename = "trigger")]
    pub trigger_kind: BackupTrigger,
    pub status: BackupStatus,
    pub progress: i32,
    pub storage_locator: Option<String>,
    pub size_bytes: Option<i64>,
    pub checksum: Option<String>,
    /// Per-source capture summaries (bytes, row/file counts)
    #[schema(value_type = Option<Object>)]
    pub contents: Option<serde_json::Value>,
    pub schedule_id: Option<Uuid>,
    pub description: Option<String>,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// What one Source Extractor captured, recorded per source under
/// `Backup.contents`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceSummary {
    /// Bytes captured for this source
    pub bytes: i64,
    /// Rows, files, or config records captured
    pub items: i64,
    /// Per-table live row counts (database source only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tables: Option<std::collections::BTreeMap<String, i64>>,
}

impl BackupSource {
    /// Expand `all` to the concrete capture order used by the pipelines.
    pub fn expand(&self) -> Vec<BackupSource> {
        match self {
            BackupSource::All => vec![
                BackupSource::Database,
                BackupSource::Files,
                BackupSource::Config,
            ],
            other => vec![*other],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_expands_in_database_files_config_order() {
        assert_eq!(
            BackupSource::All.expand(),
            vec![
                BackupSource::Database,
                BackupSource::Files,
                BackupSource::Config
            ]
        );
        assert_eq!(BackupSource::Files.expand(), vec![BackupSource::Files]);
    }

    #[test]
    fn terminal_statuses() {
        assert!(BackupStatus::Completed.is_terminal());
        assert!(BackupStatus::Failed.is_terminal());
        assert!(BackupStatus::Cancelled.is_terminal());
        assert!(!BackupStatus::Pending.is_terminal());
        assert!(!BackupStatus::InProgress.is_terminal());
    }
}
