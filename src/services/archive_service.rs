//! Sealed artifact codec.
//!
//! Packs a directory of captured source content into a single encrypted,
//! checksummed artifact and reverses the process. Sealing: tar + gzip,
//! SHA-256 over the compressed plaintext, AES-256-CBC with a fresh random
//! 16-byte IV prepended to the ciphertext. The key is derived once per
//! process from a passphrase via scrypt with a fixed salt.
//!
//! The codec never retries and never partially succeeds: either the full
//! artifact opens and verifies against the expected checksum, or the
//! operation fails.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::OnceLock;
use tar::{Archive, Builder};

use crate::error::{AppError, Result};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// IV length in bytes; the first IV_LEN bytes of an artifact are the IV.
const IV_LEN: usize = 16;

/// Fixed application-level scrypt salt; versioned so a future KDF change can
/// re-derive without ambiguity.
const KDF_SALT: &[u8] = b"snapvault/artifact-sealing/v1";

static SEALING_KEY: OnceLock<[u8; 32]> = OnceLock::new();

/// Derive a 32-byte sealing key from a passphrase with scrypt.
///
/// Deliberately slow; production callers go through [`ArchiveCodec::from_passphrase`]
/// which caches the result for the process lifetime.
pub fn derive_key(passphrase: &str) -> [u8; 32] {
    let params =
        scrypt::Params::new(14, 8, 1, 32).expect("static scrypt parameters are valid");
    let mut key = [0u8; 32];
    scrypt::scrypt(passphrase.as_bytes(), KDF_SALT, &params, &mut key)
        .expect("32-byte scrypt output length is valid");
    key
}

/// Result of sealing a directory.
#[derive(Debug, Clone)]
pub struct SealedArtifact {
    /// SHA-256 (hex) of the compressed plaintext, recorded on the Backup and
    /// re-checked on open
    pub checksum: String,
    /// Size of the sealed artifact on disk (IV + ciphertext)
    pub size_bytes: i64,
}

/// Archive codec bound to a sealing key.
pub struct ArchiveCodec {
    key: [u8; 32],
}

impl ArchiveCodec {
    /// Create a codec from the configured passphrase. The scrypt derivation
    /// runs once per process; later calls reuse the cached key.
    pub fn from_passphrase(passphrase: &str) -> Self {
        let key = SEALING_KEY.get_or_init(|| derive_key(passphrase));
        Self { key: *key }
    }

    /// Create a codec with an explicit 32-byte key.
    pub fn with_key(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Seal the contents of `source_dir` into the artifact file at `dest`.
    pub fn seal(&self, source_dir: &Path, dest: &Path) -> Result<SealedArtifact> {
        // tar + gzip the directory contents
        let mut compressed = Vec::new();
        {
            let encoder = GzEncoder::new(&mut compressed, Compression::best());
            let mut tar = Builder::new(encoder);
            tar.append_dir_all(".", source_dir)?;
            tar.into_inner()?.finish()?;
        }

        let checksum = content_hash(&compressed);

        let iv: [u8; IV_LEN] = rand::random();
        let ciphertext = Aes256CbcEnc::new_from_slices(&self.key, &iv)
            .map_err(|e| AppError::Internal(format!("cipher init failed: {}", e)))?
            .encrypt_padded_vec_mut::<Pkcs7>(&compressed);

        let mut sealed = Vec::with_capacity(IV_LEN + ciphertext.len());
        sealed.extend_from_slice(&iv);
        sealed.extend_from_slice(&ciphertext);
        std::fs::write(dest, &sealed)?;

        Ok(SealedArtifact {
            checksum,
            size_bytes: sealed.len() as i64,
        })
    }

    /// Open the artifact at `artifact` into `dest_dir`, verifying the
    /// decrypted plaintext against `expected_checksum` before unpacking.
    pub fn open(&self, artifact: &Path, dest_dir: &Path, expected_checksum: &str) -> Result<()> {
        let sealed = std::fs::read(artifact)?;
        if sealed.len() < IV_LEN {
            return Err(AppError::Integrity(
                "artifact too short to contain an IV".into(),
            ));
        }
        let (iv, ciphertext) = sealed.split_at(IV_LEN);

        let plaintext = Aes256CbcDec::new_from_slices(&self.key, iv)
            .map_err(|e| AppError::Internal(format!("cipher init failed: {}", e)))?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| {
                AppError::Integrity("artifact failed to decrypt (wrong key or corrupted data)".into())
            })?;

        let actual = content_hash(&plaintext);
        if actual != expected_checksum {
            return Err(AppError::Integrity(format!(
                "checksum mismatch: expected {}, got {}",
                expected_checksum, actual
            )));
        }

        std::fs::create_dir_all(dest_dir)?;
        let decoder = GzDecoder::new(plaintext.as_slice());
        let mut archive = Archive::new(decoder);
        archive.unpack(dest_dir)?;

        Ok(())
    }
}

/// SHA-256 content hash as lowercase hex.
pub fn content_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn codec() -> ArchiveCodec {
        ArchiveCodec::with_key([7u8; 32])
    }

    fn populated_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("dump.pgdump"), b"relational snapshot").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/config.json"), b"{\"a\":1}").unwrap();
        dir
    }

    #[test]
    fn seal_open_roundtrip() {
        let src = populated_dir();
        let out = TempDir::new().unwrap();
        let artifact = out.path().join("a.svlt");

        let sealed = codec().seal(src.path(), &artifact).unwrap();
        assert!(sealed.size_bytes > IV_LEN as i64);

        let dest = TempDir::new().unwrap();
        codec().open(&artifact, dest.path(), &sealed.checksum).unwrap();

        assert_eq!(
            std::fs::read(dest.path().join("dump.pgdump")).unwrap(),
            b"relational snapshot"
        );
        assert_eq!(
            std::fs::read(dest.path().join("sub/config.json")).unwrap(),
            b"{\"a\":1}"
        );
    }

    #[test]
    fn empty_directory_seals() {
        let src = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let artifact = out.path().join("empty.svlt");

        let sealed = codec().seal(src.path(), &artifact).unwrap();
        let dest = TempDir::new().unwrap();
        codec().open(&artifact, dest.path(), &sealed.checksum).unwrap();
    }

    #[test]
    fn wrong_key_fails_verification() {
        let src = populated_dir();
        let out = TempDir::new().unwrap();
        let artifact = out.path().join("a.svlt");
        let sealed = codec().seal(src.path(), &artifact).unwrap();

        let other = ArchiveCodec::with_key([9u8; 32]);
        let dest = TempDir::new().unwrap();
        let err = other
            .open(&artifact, dest.path(), &sealed.checksum)
            .unwrap_err();
        assert!(matches!(err, AppError::Integrity(_)));
        // Nothing was unpacked
        assert!(std::fs::read_dir(dest.path()).unwrap().next().is_none());
    }

    #[test]
    fn tampered_artifact_fails_verification() {
        let src = populated_dir();
        let out = TempDir::new().unwrap();
        let artifact = out.path().join("a.svlt");
        let sealed = codec().seal(src.path(), &artifact).unwrap();

        let mut bytes = std::fs::read(&artifact).unwrap();
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0xFF;
        std::fs::write(&artifact, &bytes).unwrap();

        let dest = TempDir::new().unwrap();
        let err = codec()
            .open(&artifact, dest.path(), &sealed.checksum)
            .unwrap_err();
        assert!(matches!(err, AppError::Integrity(_)));
    }

    #[test]
    fn checksum_mismatch_is_a_hard_failure() {
        let src = populated_dir();
        let out = TempDir::new().unwrap();
        let artifact = out.path().join("a.svlt");
        codec().seal(src.path(), &artifact).unwrap();

        let dest = TempDir::new().unwrap();
        let err = codec()
            .open(&artifact, dest.path(), &"0".repeat(64))
            .unwrap_err();
        assert!(matches!(err, AppError::Integrity(_)));
    }

    #[test]
    fn artifact_shorter_than_iv_is_rejected() {
        let out = TempDir::new().unwrap();
        let artifact = out.path().join("short.svlt");
        std::fs::write(&artifact, [0u8; 8]).unwrap();

        let dest = TempDir::new().unwrap();
        let err = codec().open(&artifact, dest.path(), "ab").unwrap_err();
        assert!(matches!(err, AppError::Integrity(_)));
    }

    #[test]
    fn fresh_iv_per_seal() {
        let src = populated_dir();
        let out = TempDir::new().unwrap();
        let a = out.path().join("a.svlt");
        let b = out.path().join("b.svlt");

        let sealed_a = codec().seal(src.path(), &a).unwrap();
        let sealed_b = codec().seal(src.path(), &b).unwrap();

        // Same plaintext hash, different ciphertext
        assert_eq!(sealed_a.checksum, sealed_b.checksum);
        assert_ne!(std::fs::read(&a).unwrap(), std::fs::read(&b).unwrap());
    }
}
