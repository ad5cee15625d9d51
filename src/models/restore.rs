//! Restore records, drills, and the per-restore audit log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Restore type enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "restore_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RestoreType {
    Full,
    Partial,
    Drill,
    PointInTime,
}

impl RestoreType {
    pub fn is_drill(&self) -> bool {
        matches!(self, RestoreType::Drill)
    }
}

/// One element of a restore's scope set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "restore_scope", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RestoreScope {
    Database,
    Files,
    Config,
    All,
}

impl RestoreScope {
    /// Expand a scope set, resolving `all`, into database -> files -> config
    /// apply order with duplicates removed.
    pub fn expand_set(scopes: &[RestoreScope]) -> Vec<RestoreScope> {
        let wants = |s: RestoreScope| {
            scopes.contains(&RestoreScope::All) || scopes.contains(&s)
        };
        [
            RestoreScope::Database,
            RestoreScope::Files,
            RestoreScope::Config,
        ]
        .into_iter()
        .filter(|s| wants(*s))
        .collect()
    }
}

/// Restore status enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "restore_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RestoreStatus {
    Pending,
    Validating,
    PreBackup,
    InProgress,
    Verifying,
    Completed,
    Failed,
    RolledBack,
}

impl RestoreStatus {
    /// Cancellation is only legal before external state has been touched.
    pub fn is_cancellable(&self) -> bool {
        matches!(self, RestoreStatus::Pending | RestoreStatus::Validating)
    }
}

impl std::fmt::Display for RestoreStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RestoreStatus::Pending => write!(f, "pending"),
            RestoreStatus::Validating => write!(f, "validating"),
            RestoreStatus::PreBackup => write!(f, "pre_backup"),
            RestoreStatus::InProgress => write!(f, "in_progress"),
            RestoreStatus::Verifying => write!(f, "verifying"),
            RestoreStatus::Completed => write!(f, "completed"),
            RestoreStatus::Failed => write!(f, "failed"),
            RestoreStatus::RolledBack => write!(f, "rolled_back"),
        }
    }
}

/// Restore entity: one restore attempt against a completed backup.
///
/// A non-drill restore that reached `in_progress` always carries
/// `pre_restore_backup_id` pointing at a completed safety-net backup.
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct RestoreRecord {
    pub id: Uuid,
    pub backup_id: Uuid,
    pub restore_type: RestoreType,
    pub scope: Vec<RestoreScope>,
    pub status: RestoreStatus,
    pub progress: i32,
    pub current_step: Option<String>,
    pub estimated_seconds_remaining: Option<i32>,
    pub selected_tables: Option<Vec<String>>,
    pub selected_files: Option<Vec<String>>,
    pub pre_restore_backup_id: Option<Uuid>,
    /// Rows restored per table
    #[schema(value_type = Option<Object>)]
    pub restored_records: Option<serde_json::Value>,
    pub restored_files: Option<i32>,
    pub restored_configs: Option<i32>,
    pub validation_passed: Option<bool>,
    #[schema(value_type = Option<Object>)]
    pub validation_detail: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Child record of a drill restore: names the disposable environment the
/// drill ran against and whether it verified.
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct RestoreDrill {
    pub id: Uuid,
    pub restore_id: Uuid,
    pub environment: String,
    pub passed: bool,
    #[schema(value_type = Object)]
    pub report: serde_json::Value,
    pub cleaned_up: bool,
    pub created_at: DateTime<Utc>,
}

/// Restore log severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "restore_log_level", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RestoreLogLevel {
    Info,
    Warn,
    Error,
}

/// Append-only operator-facing audit trail entry for one restore.
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct RestoreLogEntry {
    pub id: i64,
    pub restore_id: Uuid,
    pub level: RestoreLogLevel,
    pub step: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_set_expands_all() {
        assert_eq!(
            RestoreScope::expand_set(&[RestoreScope::All]),
            vec![
                RestoreScope::Database,
                RestoreScope::Files,
                RestoreScope::Config
            ]
        );
    }

    #[test]
    fn scope_set_preserves_apply_order_and_dedupes() {
        assert_eq!(
            RestoreScope::expand_set(&[
                RestoreScope::Config,
                RestoreScope::Database,
                RestoreScope::Database
            ]),
            vec![RestoreScope::Database, RestoreScope::Config]
        );
    }

    #[test]
    fn cancellable_only_before_side_effects() {
        assert!(RestoreStatus::Pending.is_cancellable());
        assert!(RestoreStatus::Validating.is_cancellable());
        assert!(!RestoreStatus::PreBackup.is_cancellable());
        assert!(!RestoreStatus::InProgress.is_cancellable());
        assert!(!RestoreStatus::Completed.is_cancellable());
    }
}
