//! Filesystem storage backend.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::{AppError, Result};

/// Copy chunk size for streamed transfers.
const CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// Filesystem storage backend rooted at a base directory.
pub struct FilesystemBackend {
    base_path: PathBuf,
}

impl FilesystemBackend {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn locator_to_path(&self, locator: &str) -> PathBuf {
        self.base_path.join(locator)
    }
}

/// Chunked file-to-file copy so large artifacts never sit in memory whole.
async fn copy_chunked(src: &Path, dest: &Path) -> Result<u64> {
    let mut reader = fs::File::open(src).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            AppError::NotFound(format!("file not found: {}", src.display()))
        } else {
            AppError::Storage(e.to_string())
        }
    })?;
    let mut writer = fs::File::create(dest).await?;

    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n]).await?;
        total += n as u64;
    }
    writer.sync_all().await?;
    Ok(total)
}

#[async_trait]
impl super::StorageBackend for FilesystemBackend {
    async fn put_file(&self, locator: &str, path: &Path) -> Result<()> {
        let dest = self.locator_to_path(locator);

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Write via temp file, then rename into place
        let temp_path = dest.with_extension("tmp");
        copy_chunked(path, &temp_path).await?;
        fs::rename(&temp_path, &dest).await?;

        tracing::debug!(locator = %locator, "filesystem put successful");
        Ok(())
    }

    async fn fetch_file(&self, locator: &str, dest: &Path) -> Result<u64> {
        let src = self.locator_to_path(locator);
        if !src.exists() {
            return Err(AppError::NotFound(format!(
                "storage locator not found: {}",
                locator
            )));
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }
        let size = copy_chunked(&src, dest).await?;
        tracing::debug!(locator = %locator, size, "filesystem fetch successful");
        Ok(size)
    }

    async fn exists(&self, locator: &str) -> Result<bool> {
        Ok(self.locator_to_path(locator).exists())
    }

    async fn delete(&self, locator: &str) -> Result<()> {
        let path = self.locator_to_path(locator);
        if path.exists() {
            fs::remove_file(&path).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageBackend;
    use tempfile::TempDir;

    async fn backend() -> (FilesystemBackend, TempDir, TempDir) {
        let store = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        (
            FilesystemBackend::new(store.path().to_path_buf()),
            store,
            work,
        )
    }

    #[tokio::test]
    async fn put_fetch_roundtrip() {
        let (backend, _store, work) = backend().await;

        let src = work.path().join("artifact.bin");
        fs::write(&src, b"sealed artifact bytes").await.unwrap();

        backend
            .put_file("backups/2026/01/a.svlt", &src)
            .await
            .unwrap();
        assert!(backend.exists("backups/2026/01/a.svlt").await.unwrap());

        let dest = work.path().join("fetched.bin");
        let size = backend
            .fetch_file("backups/2026/01/a.svlt", &dest)
            .await
            .unwrap();
        assert_eq!(size, 21);
        assert_eq!(fs::read(&dest).await.unwrap(), b"sealed artifact bytes");
    }

    #[tokio::test]
    async fn fetch_missing_locator_is_not_found() {
        let (backend, _store, work) = backend().await;
        let dest = work.path().join("out.bin");
        let err = backend.fetch_file("missing", &dest).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let (backend, _store, work) = backend().await;
        let src = work.path().join("a.bin");
        fs::write(&src, b"x").await.unwrap();

        backend.put_file("a", &src).await.unwrap();
        backend.delete("a").await.unwrap();
        assert!(!backend.exists("a").await.unwrap());
        // Second delete of the same locator is a no-op
        backend.delete("a").await.unwrap();
    }
}
