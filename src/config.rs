//! Application configuration loaded from environment variables.

use crate::error::{AppError, Result};
use std::env;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Server bind address (host:port)
    pub bind_address: String,

    /// Log level
    pub log_level: String,

    /// Storage backend: "filesystem" or "s3"
    pub storage_backend: String,

    /// Filesystem storage path (when storage_backend = "filesystem")
    pub storage_path: String,

    /// S3 bucket name (when storage_backend = "s3")
    pub s3_bucket: Option<String>,

    /// S3 region
    pub s3_region: Option<String>,

    /// S3 endpoint URL (for MinIO or other S3-compatible services)
    pub s3_endpoint: Option<String>,

    /// Passphrase backups are sealed with. The encryption key is derived
    /// from it once per process.
    pub encryption_key: String,

    /// Directory of uploaded file content captured by file backups
    pub upload_dir: String,

    /// Path to the pg_dump binary
    pub pg_dump_path: String,

    /// Path to the pg_restore binary
    pub pg_restore_path: String,

    /// Emit a notification event when a backup or restore succeeds
    pub notify_on_success: bool,

    /// Emit a notification event when a backup or restore fails
    pub notify_on_failure: bool,

    /// Hard ceiling on the pre-restore safety backup wait, in seconds
    pub pre_restore_timeout_secs: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .map_err(|_| AppError::Config("DATABASE_URL not set".into()))?,
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            storage_backend: env::var("STORAGE_BACKEND").unwrap_or_else(|_| "filesystem".into()),
            storage_path: env::var("STORAGE_PATH")
                .unwrap_or_else(|_| "/var/lib/snapvault/artifacts".into()),
            s3_bucket: env::var("S3_BUCKET").ok(),
            s3_region: env::var("S3_REGION").ok(),
            s3_endpoint: env::var("S3_ENDPOINT").ok(),
            encryption_key: env::var("SNAPVAULT_ENCRYPTION_KEY")
                .map_err(|_| AppError::Config("SNAPVAULT_ENCRYPTION_KEY not set".into()))?,
            upload_dir: env::var("UPLOAD_DIR").unwrap_or_else(|_| "/var/lib/snapvault/uploads".into()),
            pg_dump_path: env::var("PG_DUMP_PATH").unwrap_or_else(|_| "pg_dump".into()),
            pg_restore_path: env::var("PG_RESTORE_PATH").unwrap_or_else(|_| "pg_restore".into()),
            notify_on_success: env_flag("NOTIFY_ON_SUCCESS", true),
            notify_on_failure: env_flag("NOTIFY_ON_FAILURE", true),
            pre_restore_timeout_secs: env::var("PRE_RESTORE_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1800),
        })
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    env::var(name)
        .map(|v| v.to_lowercase() == "true" || v == "1")
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_flag_parses_truthy_values() {
        std::env::set_var("SNAPVAULT_TEST_FLAG_A", "true");
        std::env::set_var("SNAPVAULT_TEST_FLAG_B", "1");
        std::env::set_var("SNAPVAULT_TEST_FLAG_C", "no");
        assert!(env_flag("SNAPVAULT_TEST_FLAG_A", false));
        assert!(env_flag("SNAPVAULT_TEST_FLAG_B", false));
        assert!(!env_flag("SNAPVAULT_TEST_FLAG_C", true));
        assert!(env_flag("SNAPVAULT_TEST_FLAG_MISSING", true));
    }
}
