//! Request payloads for the triggering layer.

use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::models::backup::{BackupSource, BackupStatus, BackupType};
use crate::models::restore::{RestoreScope, RestoreType};

/// Create a manual backup.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateBackupDto {
    pub backup_type: BackupType,
    pub source: BackupSource,
    pub description: Option<String>,
}

/// Backup list filters.
#[derive(Debug, Deserialize, IntoParams)]
pub struct ListBackupsQuery {
    pub status: Option<BackupStatus>,
    pub schedule_id: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Start a restore. `confirmation_text` must exactly match the phrase for
/// the requested restore type.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateRestoreDto {
    pub backup_id: Uuid,
    pub restore_type: RestoreType,
    pub scope: Vec<RestoreScope>,
    pub selected_tables: Option<Vec<String>>,
    pub selected_files: Option<Vec<String>>,
    pub confirmation_text: String,
}

/// Restore list pagination.
#[derive(Debug, Deserialize, IntoParams)]
pub struct ListRestoresQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Create a backup schedule.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateScheduleDto {
    pub name: String,
    pub cron_expression: String,
    pub timezone: Option<String>,
    pub backup_type: BackupType,
    pub source: BackupSource,
    #[serde(default = "default_retention_days")]
    pub retention_days: i32,
    #[serde(default = "default_max_backups")]
    pub max_backups: i32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// Update a backup schedule.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateScheduleDto {
    pub name: Option<String>,
    pub cron_expression: Option<String>,
    pub timezone: Option<String>,
    pub backup_type: Option<BackupType>,
    pub source: Option<BackupSource>,
    pub retention_days: Option<i32>,
    pub max_backups: Option<i32>,
    pub enabled: Option<bool>,
}

fn default_retention_days() -> i32 {
    30
}

fn default_max_backups() -> i32 {
    10
}

fn default_enabled() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn schedule_dto_fills_defaults() {
        let dto: CreateScheduleDto = serde_json::from_str(
            r#"{"name":"nightly","cron_expression":"0 3 * * *","backup_type":"full","source":"all"}"#,
        )
        .unwrap();
        assert_eq!(dto.retention_days, 30);
        assert_eq!(dto.max_backups, 10);
        assert!(dto.enabled);
        assert!(dto.timezone.is_none());
    }

    #[test]
    fn restore_dto_parses_scope_set() {
        let dto: CreateRestoreDto = serde_json::from_str(
            r#"{
                "backup_id": "00000000-0000-0000-0000-000000000001",
                "restore_type": "partial",
                "scope": ["database", "config"],
                "selected_tables": ["documents"],
                "confirmation_text": "RESTORE PRODUCTION DATA"
            }"#,
        )
        .unwrap();
        assert_eq!(dto.scope, vec![RestoreScope::Database, RestoreScope::Config]);
        assert_eq!(dto.selected_tables.as_deref(), Some(&["documents".to_string()][..]));
        assert!(dto.selected_files.is_none());
    }
}
