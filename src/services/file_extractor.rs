//! File-tree source extractor.
//!
//! Captures the configured upload directory into a plain tar archive (the
//! archive codec compresses and encrypts the whole capture directory later)
//! and restores it back. Drill restores unpack into a disposable temp
//! directory; a selector of relative paths restores only those entries.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tar::{Archive, Builder};
use walkdir::WalkDir;

use crate::error::Result;
use crate::models::backup::SourceSummary;

/// Archive file name inside a capture directory.
pub const FILES_ARCHIVE: &str = "files.tar";

/// Outcome of applying a file-tree archive.
#[derive(Debug, Clone)]
pub struct FileApplyOutcome {
    /// Number of entries restored
    pub restored_files: i32,
    /// Directory the entries landed in
    pub target_dir: PathBuf,
}

/// File-tree extractor bound to the upload directory.
pub struct FileExtractor {
    upload_dir: PathBuf,
}

impl FileExtractor {
    pub fn new(upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
        }
    }

    /// Archive the upload directory into `dest_dir`.
    ///
    /// A missing or empty upload directory yields a zero summary, not an
    /// error.
    pub fn capture(&self, dest_dir: &Path) -> Result<SourceSummary> {
        if !self.upload_dir.is_dir() {
            tracing::debug!(dir = %self.upload_dir.display(), "upload directory absent, capturing nothing");
            return Ok(SourceSummary::default());
        }

        let archive_path = dest_dir.join(FILES_ARCHIVE);
        let file = std::fs::File::create(&archive_path)?;
        let mut tar = Builder::new(file);
        tar.append_dir_all(".", &self.upload_dir)?;
        tar.into_inner()?.sync_all()?;

        let mut items = 0i64;
        for entry in WalkDir::new(&self.upload_dir) {
            let entry = entry.map_err(|e| std::io::Error::other(e))?;
            if entry.file_type().is_file() {
                items += 1;
            }
        }
        let bytes = std::fs::metadata(&archive_path)?.len() as i64;

        Ok(SourceSummary {
            bytes,
            items,
            tables: None,
        })
    }

    /// Unpack the archive in `source_dir` into the upload directory, or into
    /// the given disposable directory for drills. A `selector` of relative
    /// paths restores only those entries.
    pub fn apply(
        &self,
        source_dir: &Path,
        drill_dir: Option<&Path>,
        selector: Option<&[String]>,
    ) -> Result<FileApplyOutcome> {
        let target: PathBuf = match drill_dir {
            Some(dir) => dir.to_path_buf(),
            None => self.upload_dir.clone(),
        };

        let archive_path = source_dir.join(FILES_ARCHIVE);
        if !archive_path.exists() {
            // The backup captured an absent upload directory
            return Ok(FileApplyOutcome {
                restored_files: 0,
                target_dir: target,
            });
        }

        std::fs::create_dir_all(&target)?;

        let selected: Option<HashSet<PathBuf>> = selector
            .map(|paths| paths.iter().map(|p| PathBuf::from(p.trim_start_matches("./"))).collect());

        let file = std::fs::File::open(&archive_path)?;
        let mut archive = Archive::new(file);
        let mut restored = 0i32;

        for entry in archive.entries()? {
            let mut entry = entry?;
            let path = entry.path()?.into_owned();
            let relative = path.strip_prefix(".").unwrap_or(&path).to_path_buf();

            if let Some(ref wanted) = selected {
                if !wanted.contains(&relative) {
                    continue;
                }
            }

            if entry.unpack_in(&target)? && entry.header().entry_type().is_file() {
                restored += 1;
            }
        }

        Ok(FileApplyOutcome {
            restored_files: restored,
            target_dir: target,
        })
    }

    /// Post-restore probe: the target directory exists.
    pub fn probe(&self, drill_dir: Option<&Path>) -> bool {
        match drill_dir {
            Some(dir) => dir.is_dir(),
            None => self.upload_dir.is_dir(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn populated_uploads() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("report.pdf"), b"pdf bytes").unwrap();
        std::fs::create_dir(dir.path().join("images")).unwrap();
        std::fs::write(dir.path().join("images/scan.png"), b"png bytes").unwrap();
        dir
    }

    #[test]
    fn capture_then_apply_roundtrip() {
        let uploads = populated_uploads();
        let capture_dir = TempDir::new().unwrap();

        let extractor = FileExtractor::new(uploads.path());
        let summary = extractor.capture(capture_dir.path()).unwrap();
        assert_eq!(summary.items, 2);
        assert!(summary.bytes > 0);

        let restore_target = TempDir::new().unwrap();
        let outcome = extractor
            .apply(capture_dir.path(), Some(restore_target.path()), None)
            .unwrap();
        assert_eq!(outcome.restored_files, 2);
        assert_eq!(
            std::fs::read(restore_target.path().join("images/scan.png")).unwrap(),
            b"png bytes"
        );
    }

    #[test]
    fn empty_upload_dir_captures_zero_summary() {
        let uploads = TempDir::new().unwrap();
        let capture_dir = TempDir::new().unwrap();

        let extractor = FileExtractor::new(uploads.path());
        let summary = extractor.capture(capture_dir.path()).unwrap();
        assert_eq!(summary.items, 0);
    }

    #[test]
    fn missing_upload_dir_is_not_an_error() {
        let capture_dir = TempDir::new().unwrap();
        let extractor = FileExtractor::new("/nonexistent/snapvault/uploads");
        let summary = extractor.capture(capture_dir.path()).unwrap();
        assert_eq!(summary, SourceSummary::default());

        // Applying that capture restores nothing
        let target = TempDir::new().unwrap();
        let outcome = extractor
            .apply(capture_dir.path(), Some(target.path()), None)
            .unwrap();
        assert_eq!(outcome.restored_files, 0);
    }

    #[test]
    fn selector_restores_only_matching_entries() {
        let uploads = populated_uploads();
        let capture_dir = TempDir::new().unwrap();
        let extractor = FileExtractor::new(uploads.path());
        extractor.capture(capture_dir.path()).unwrap();

        let target = TempDir::new().unwrap();
        let selector = vec!["images/scan.png".to_string()];
        let outcome = extractor
            .apply(capture_dir.path(), Some(target.path()), Some(&selector))
            .unwrap();

        assert_eq!(outcome.restored_files, 1);
        assert!(target.path().join("images/scan.png").exists());
        assert!(!target.path().join("report.pdf").exists());
    }

    #[test]
    fn probe_checks_target_directory() {
        let uploads = populated_uploads();
        let extractor = FileExtractor::new(uploads.path());
        assert!(extractor.probe(None));
        assert!(!extractor.probe(Some(Path::new("/nonexistent/drill"))));
    }
}
