//! Backup schedule entity.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use super::backup::{BackupSource, BackupType};

/// A named cron-like recurrence that produces backups and bounds how many
/// of them are kept.
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct BackupSchedule {
    pub id: Uuid,
    pub name: String,
    pub cron_expression: String,
    /// IANA timezone name the expression is evaluated in
    pub timezone: String,
    pub backup_type: BackupType,
    pub source: BackupSource,
    pub retention_days: i32,
    pub max_backups: i32,
    pub enabled: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
