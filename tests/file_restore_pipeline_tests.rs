//! File-scope pipeline tests: upload dir -> capture -> seal -> open ->
//! selective apply into a disposable target, the way a drill restore runs.

use snapvault_backend::services::archive_service::ArchiveCodec;
use snapvault_backend::services::file_extractor::FileExtractor;
use tempfile::TempDir;

fn uploads() -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("claims/2026")).unwrap();
    std::fs::write(dir.path().join("claims/2026/intake.pdf"), b"intake form").unwrap();
    std::fs::write(dir.path().join("claims/2026/evidence.jpg"), b"photo").unwrap();
    std::fs::write(dir.path().join("readme.txt"), b"top level").unwrap();
    dir
}

#[test]
fn full_file_restore_through_sealed_artifact() {
    let uploads = uploads();
    let extractor = FileExtractor::new(uploads.path());
    let codec = ArchiveCodec::with_key([3u8; 32]);

    // Capture, then seal the capture directory
    let capture = TempDir::new().unwrap();
    let summary = extractor.capture(capture.path()).unwrap();
    assert_eq!(summary.items, 3);

    let work = TempDir::new().unwrap();
    let artifact = work.path().join("a.svlt");
    let sealed = codec.seal(capture.path(), &artifact).unwrap();

    // Open and apply into a disposable drill directory
    let content = TempDir::new().unwrap();
    codec.open(&artifact, content.path(), &sealed.checksum).unwrap();

    let drill = TempDir::new().unwrap();
    let outcome = extractor
        .apply(content.path(), Some(drill.path()), None)
        .unwrap();

    assert_eq!(outcome.restored_files, 3);
    assert_eq!(
        std::fs::read(drill.path().join("claims/2026/intake.pdf")).unwrap(),
        b"intake form"
    );
}

#[test]
fn partial_file_restore_honors_selector() {
    let uploads = uploads();
    let extractor = FileExtractor::new(uploads.path());
    let codec = ArchiveCodec::with_key([3u8; 32]);

    let capture = TempDir::new().unwrap();
    extractor.capture(capture.path()).unwrap();

    let work = TempDir::new().unwrap();
    let artifact = work.path().join("a.svlt");
    let sealed = codec.seal(capture.path(), &artifact).unwrap();

    let content = TempDir::new().unwrap();
    codec.open(&artifact, content.path(), &sealed.checksum).unwrap();

    let target = TempDir::new().unwrap();
    let selector = vec!["readme.txt".to_string()];
    let outcome = extractor
        .apply(content.path(), Some(target.path()), Some(&selector))
        .unwrap();

    assert_eq!(outcome.restored_files, 1);
    assert!(target.path().join("readme.txt").exists());
    assert!(!target.path().join("claims/2026/intake.pdf").exists());
}

#[test]
fn restore_is_idempotent_against_populated_target() {
    let uploads = uploads();
    let extractor = FileExtractor::new(uploads.path());

    let capture = TempDir::new().unwrap();
    extractor.capture(capture.path()).unwrap();

    let target = TempDir::new().unwrap();
    // Pre-populate with stale content the restore must overwrite
    std::fs::write(target.path().join("readme.txt"), b"stale").unwrap();

    let first = extractor
        .apply(capture.path(), Some(target.path()), None)
        .unwrap();
    let second = extractor
        .apply(capture.path(), Some(target.path()), None)
        .unwrap();

    assert_eq!(first.restored_files, second.restored_files);
    assert_eq!(
        std::fs::read(target.path().join("readme.txt")).unwrap(),
        b"top level"
    );
}
