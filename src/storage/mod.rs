//! Storage backends for sealed backup artifacts.

pub mod filesystem;
pub mod s3;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Config;
use crate::error::{AppError, Result};

/// Storage backend trait.
///
/// Artifacts are moved as files, streamed in fixed-size chunks; backends
/// never buffer a whole artifact in memory.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Upload the file at `path` under the given locator
    async fn put_file(&self, locator: &str, path: &Path) -> Result<()>;

    /// Download the object at the locator into `dest`, returning its size
    async fn fetch_file(&self, locator: &str, dest: &Path) -> Result<u64>;

    /// Check if the locator exists
    async fn exists(&self, locator: &str) -> Result<bool>;

    /// Delete the object at the locator
    async fn delete(&self, locator: &str) -> Result<()>;
}

/// Storage service facade over the configured backend.
pub struct StorageService {
    backend: Arc<dyn StorageBackend>,
}

impl StorageService {
    /// Create storage service from config
    pub async fn from_config(config: &Config) -> Result<Self> {
        let backend: Arc<dyn StorageBackend> = match config.storage_backend.as_str() {
            "filesystem" => {
                let path = PathBuf::from(&config.storage_path);
                tokio::fs::create_dir_all(&path).await?;
                Arc::new(filesystem::FilesystemBackend::new(path))
            }
            "s3" => {
                let s3_config = self::s3::S3Config::from_config(config)?;
                Arc::new(self::s3::S3Backend::new(s3_config).await?)
            }
            other => {
                return Err(AppError::Config(format!(
                    "Unknown storage backend: {}",
                    other
                )))
            }
        };

        Ok(Self { backend })
    }

    /// Create with a specific backend (for testing)
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    pub async fn put_file(&self, locator: &str, path: &Path) -> Result<()> {
        self.backend.put_file(locator, path).await
    }

    pub async fn fetch_file(&self, locator: &str, dest: &Path) -> Result<u64> {
        self.backend.fetch_file(locator, dest).await
    }

    pub async fn exists(&self, locator: &str) -> Result<bool> {
        self.backend.exists(locator).await
    }

    pub async fn delete(&self, locator: &str) -> Result<()> {
        self.backend.delete(locator).await
    }
}
