//! S3 storage backend using rust-s3 crate.
//!
//! Supports AWS S3 and S3-compatible services (MinIO, etc.).
//! Configuration via environment variables:
//! - S3_BUCKET: Bucket name (required)
//! - S3_REGION: AWS region (default: us-east-1)
//! - S3_ENDPOINT: Custom endpoint URL for S3-compatible services
//! - AWS_ACCESS_KEY_ID / AWS_SECRET_ACCESS_KEY: optional if using instance roles
//!
//! Artifacts are uploaded with multipart streaming and downloaded straight to
//! disk, so a sealed artifact is never held in memory whole.

use async_trait::async_trait;
use s3::bucket::Bucket;
use s3::creds::Credentials;
use s3::region::Region;
use std::path::Path;

use crate::config::Config;
use crate::error::{AppError, Result};

/// S3 storage backend configuration
#[derive(Debug, Clone)]
pub struct S3Config {
    /// S3 bucket name
    pub bucket: String,
    /// AWS region
    pub region: String,
    /// Custom endpoint URL (for MinIO compatibility)
    pub endpoint: Option<String>,
}

impl S3Config {
    /// Build from the application config
    pub fn from_config(config: &Config) -> Result<Self> {
        let bucket = config
            .s3_bucket
            .clone()
            .ok_or_else(|| AppError::Config("S3_BUCKET not set".into()))?;
        let region = config
            .s3_region
            .clone()
            .unwrap_or_else(|| "us-east-1".into());
        Ok(Self {
            bucket,
            region,
            endpoint: config.s3_endpoint.clone(),
        })
    }
}

/// S3-compatible storage backend
pub struct S3Backend {
    bucket: Box<Bucket>,
}

impl S3Backend {
    /// Create new S3 backend from configuration
    pub async fn new(config: S3Config) -> Result<Self> {
        // Load credentials using the default credential chain:
        // env vars -> ~/.aws/credentials -> container credentials -> instance metadata
        let credentials = Credentials::default()
            .map_err(|e| AppError::Config(format!("Failed to load AWS credentials: {}", e)))?;

        // Create region (with optional custom endpoint)
        let region = match &config.endpoint {
            Some(endpoint) => Region::Custom {
                region: config.region.clone(),
                endpoint: endpoint.clone(),
            },
            None => config
                .region
                .parse()
                .map_err(|_| AppError::Config(format!("Invalid S3 region: {}", config.region)))?,
        };

        let use_path_style = config.endpoint.is_some();

        let bucket = Bucket::new(&config.bucket, region, credentials)
            .map_err(|e| AppError::Config(format!("Failed to create S3 bucket: {}", e)))?;

        // Enable path-style access for MinIO compatibility
        let bucket = if use_path_style {
            bucket.with_path_style()
        } else {
            bucket
        };

        Ok(Self { bucket })
    }

    fn is_not_found(err: &str) -> bool {
        err.contains("404") || err.contains("NoSuchKey") || err.contains("Not Found")
    }
}

#[async_trait]
impl super::StorageBackend for S3Backend {
    async fn put_file(&self, locator: &str, path: &Path) -> Result<()> {
        let mut file = tokio::fs::File::open(path).await?;

        self.bucket
            .put_object_stream(&mut file, locator)
            .await
            .map_err(|e| {
                AppError::Storage(format!("Failed to put object '{}': {}", locator, e))
            })?;

        tracing::debug!(locator = %locator, "S3 put object successful");
        Ok(())
    }

    async fn fetch_file(&self, locator: &str, dest: &Path) -> Result<u64> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::File::create(dest).await?;

        let status = self
            .bucket
            .get_object_to_writer(locator, &mut file)
            .await
            .map_err(|e| {
                let err_str = e.to_string();
                if Self::is_not_found(&err_str) {
                    AppError::NotFound(format!("storage locator not found: {}", locator))
                } else {
                    AppError::Storage(format!("Failed to get object '{}': {}", locator, e))
                }
            })?;

        if status == 404 {
            return Err(AppError::NotFound(format!(
                "storage locator not found: {}",
                locator
            )));
        }
        if !(200..300).contains(&status) {
            return Err(AppError::Storage(format!(
                "Failed to get object '{}': HTTP {}",
                locator, status
            )));
        }

        let size = tokio::fs::metadata(dest).await?.len();
        tracing::debug!(locator = %locator, size, "S3 get object successful");
        Ok(size)
    }

    async fn exists(&self, locator: &str) -> Result<bool> {
        match self.bucket.head_object(locator).await {
            Ok((_, code)) if code == 404 => Ok(false),
            Ok(_) => Ok(true),
            Err(e) => {
                let err_str = e.to_string();
                if Self::is_not_found(&err_str) {
                    Ok(false)
                } else {
                    Err(AppError::Storage(format!(
                        "Failed to check existence of '{}': {}",
                        locator, e
                    )))
                }
            }
        }
    }

    async fn delete(&self, locator: &str) -> Result<()> {
        self.bucket.delete_object(locator).await.map_err(|e| {
            AppError::Storage(format!("Failed to delete object '{}': {}", locator, e))
        })?;

        tracing::debug!(locator = %locator, "S3 delete object successful");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_classification() {
        assert!(S3Backend::is_not_found("HTTP 404: object missing"));
        assert!(S3Backend::is_not_found("NoSuchKey"));
        assert!(!S3Backend::is_not_found("connection refused"));
    }

    #[test]
    fn s3_config_requires_bucket() {
        let config = Config {
            database_url: "postgres://localhost/app".into(),
            bind_address: "0.0.0.0:8080".into(),
            log_level: "info".into(),
            storage_backend: "s3".into(),
            storage_path: "/tmp".into(),
            s3_bucket: None,
            s3_region: None,
            s3_endpoint: None,
            encryption_key: "k".into(),
            upload_dir: "/tmp".into(),
            pg_dump_path: "pg_dump".into(),
            pg_restore_path: "pg_restore".into(),
            notify_on_success: true,
            notify_on_failure: true,
            pre_restore_timeout_secs: 1800,
        };
        assert!(S3Config::from_config(&config).is_err());
    }
}
