//! Configuration source extractor.
//!
//! Serializes all non-secret configuration records plus a fixed allow-list
//! of environment values into a single structured document, and upserts them
//! back on restore. Drill restores write nothing but still report how many
//! records would be restored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{AppError, Result};
use crate::models::backup::SourceSummary;

/// Document file name inside a capture directory.
pub const CONFIG_FILE: &str = "config.json";

/// Environment values captured alongside configuration records. Secrets
/// never belong on this list.
const ENV_ALLOW_LIST: &[&str] = &["TZ", "LOG_LEVEL", "STORAGE_BACKEND", "UPLOAD_DIR"];

#[derive(Debug, sqlx::FromRow)]
struct SettingRow {
    key: String,
    value: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct SettingEntry {
    key: String,
    value: serde_json::Value,
}

/// The captured configuration document.
#[derive(Debug, Serialize, Deserialize)]
struct ConfigDocument {
    version: u32,
    captured_at: DateTime<Utc>,
    settings: Vec<SettingEntry>,
    environment: BTreeMap<String, String>,
}

/// Configuration extractor bound to the settings table.
pub struct ConfigExtractor {
    db: PgPool,
}

impl ConfigExtractor {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Serialize non-secret settings and allow-listed environment values
    /// into `dest_dir`.
    pub async fn capture(&self, dest_dir: &Path) -> Result<SourceSummary> {
        let rows = sqlx::query_as::<_, SettingRow>(
            "SELECT key, value FROM settings WHERE is_secret = false ORDER BY key",
        )
        .fetch_all(&self.db)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        let document = ConfigDocument {
            version: 1,
            captured_at: Utc::now(),
            settings: rows
                .into_iter()
                .map(|r| SettingEntry {
                    key: r.key,
                    value: r.value,
                })
                .collect(),
            environment: ENV_ALLOW_LIST
                .iter()
                .filter_map(|name| std::env::var(name).ok().map(|v| (name.to_string(), v)))
                .collect(),
        };

        let path = dest_dir.join(CONFIG_FILE);
        let json = serde_json::to_vec_pretty(&document)?;
        tokio::fs::write(&path, &json).await?;

        Ok(SourceSummary {
            bytes: json.len() as i64,
            items: document.settings.len() as i64,
            tables: None,
        })
    }

    /// Upsert each captured record by key. In drill mode nothing is written;
    /// the return value still reports how many records would be restored.
    pub async fn apply(&self, source_dir: &Path, drill: bool) -> Result<i32> {
        let path = source_dir.join(CONFIG_FILE);
        if !path.exists() {
            return Err(AppError::Validation(format!(
                "backup artifact contains no {}",
                CONFIG_FILE
            )));
        }

        let bytes = tokio::fs::read(&path).await?;
        let document: ConfigDocument = serde_json::from_slice(&bytes)?;
        let count = document.settings.len() as i32;

        if drill {
            tracing::info!(records = count, "drill restore: configuration apply skipped");
            return Ok(count);
        }

        for entry in document.settings {
            sqlx::query(
                r#"
                INSERT INTO settings (key, value, is_secret)
                VALUES ($1, $2, false)
                ON CONFLICT (key) DO UPDATE
                SET value = EXCLUDED.value, updated_at = NOW()
                "#,
            )
            .bind(&entry.key)
            .bind(&entry.value)
            .execute(&self.db)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        }

        Ok(count)
    }

    /// Post-restore probe: count configuration records.
    pub async fn probe(&self) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM settings")
            .fetch_one(&self.db)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_document_roundtrips() {
        let doc = ConfigDocument {
            version: 1,
            captured_at: Utc::now(),
            settings: vec![SettingEntry {
                key: "retention.default_days".into(),
                value: serde_json::json!(30),
            }],
            environment: BTreeMap::from([("TZ".to_string(), "UTC".to_string())]),
        };

        let json = serde_json::to_vec(&doc).unwrap();
        let parsed: ConfigDocument = serde_json::from_slice(&json).unwrap();
        assert_eq!(parsed.version, 1);
        assert_eq!(parsed.settings.len(), 1);
        assert_eq!(parsed.settings[0].key, "retention.default_days");
        assert_eq!(parsed.environment.get("TZ").unwrap(), "UTC");
    }

    #[test]
    fn env_allow_list_holds_no_secret_names() {
        for name in ENV_ALLOW_LIST {
            let lower = name.to_lowercase();
            assert!(!lower.contains("key") && !lower.contains("secret") && !lower.contains("password"));
        }
    }
}
