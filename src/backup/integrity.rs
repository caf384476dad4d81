//! Integrity verification for backup artifacts
//!
//! An artifact is trusted only if its on-disk size and SHA-256 digest match
//! the record and it decodes all the way back to a snapshot frame: decrypt
//! when the record has an IV, gunzip when it was compressed, then parse the
//! frame header. Records written before digests were kept skip that check.

use std::fs;
use std::path::Path;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::archive::{decode_frame, decompress, SnapshotFrame};
use crate::crypto::BackupCipher;
use crate::error::{VaultError, VaultResult};
use crate::models::{BackupId, BackupRecord};

/// An artifact that passed verification, with its decoded snapshot
#[derive(Debug)]
pub struct VerifiedArtifact {
    /// Bytes exactly as stored on disk
    pub raw: Vec<u8>,
    /// Framed snapshot after decryption and decompression
    pub snapshot: Vec<u8>,
}

impl VerifiedArtifact {
    pub fn frame(&self) -> VaultResult<SnapshotFrame<'_>> {
        decode_frame(&self.snapshot)
    }
}

/// Outcome of verifying one backup, for display
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityReport {
    pub backup_id: BackupId,
    pub filename: String,
    pub expected_size: u64,
    pub actual_size: Option<u64>,
    pub encrypted: bool,
    pub compressed: bool,
    pub state_bytes: Option<u64>,
    pub file_bytes: Option<u64>,
    pub error: Option<String>,
}

impl IntegrityReport {
    pub fn is_valid(&self) -> bool {
        self.error.is_none()
    }
}

/// Undo encryption and compression according to the record
pub fn decode_artifact(
    raw: &[u8],
    record: &BackupRecord,
    cipher: &BackupCipher,
) -> VaultResult<Vec<u8>> {
    let decrypted;
    let compressed_bytes = match &record.iv {
        Some(iv) => {
            decrypted = cipher.decrypt(raw, iv)?;
            decrypted.as_slice()
        }
        None => raw,
    };

    if record.compressed {
        decompress(compressed_bytes)
    } else {
        Ok(compressed_bytes.to_vec())
    }
}

/// Hex SHA-256 of an artifact's stored bytes
pub fn artifact_checksum(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn check_checksum(raw: &[u8], record: &BackupRecord) -> VaultResult<()> {
    match &record.checksum {
        Some(expected) if !expected.eq_ignore_ascii_case(&artifact_checksum(raw)) => {
            Err(VaultError::Integrity(format!(
                "Checksum mismatch for {}",
                record.filename
            )))
        }
        _ => Ok(()),
    }
}

fn check_size(path: &Path, record: &BackupRecord) -> VaultResult<u64> {
    let actual = fs::metadata(path)
        .map_err(|e| {
            VaultError::Integrity(format!("Artifact {} unreadable: {}", path.display(), e))
        })?
        .len();
    if actual != record.size {
        return Err(VaultError::Integrity(format!(
            "Size mismatch for {}: record says {} bytes, file has {}",
            record.filename, record.size, actual
        )));
    }
    Ok(actual)
}

// Configuration problems (no key) pass through; everything else about the
// artifact's content is an integrity failure.
fn as_integrity(err: VaultError) -> VaultError {
    match err {
        VaultError::Config(_) | VaultError::Integrity(_) => err,
        other => VaultError::Integrity(other.to_string()),
    }
}

/// Read an artifact and verify it end to end
pub fn read_verified(
    path: &Path,
    record: &BackupRecord,
    cipher: &BackupCipher,
) -> VaultResult<VerifiedArtifact> {
    check_size(path, record)?;

    let raw = fs::read(path).map_err(|e| {
        VaultError::Integrity(format!("Artifact {} unreadable: {}", path.display(), e))
    })?;
    if raw.len() as u64 != record.size {
        return Err(VaultError::Integrity(format!(
            "Size mismatch for {}: record says {} bytes, read {}",
            record.filename,
            record.size,
            raw.len()
        )));
    }
    check_checksum(&raw, record)?;

    let snapshot = decode_artifact(&raw, record, cipher).map_err(as_integrity)?;
    decode_frame(&snapshot).map_err(as_integrity)?;
    debug!(filename = %record.filename, bytes = raw.len(), "artifact verified");
    Ok(VerifiedArtifact { raw, snapshot })
}

/// Verify an artifact, returning the reason on failure
pub fn check_integrity(path: &Path, record: &BackupRecord, cipher: &BackupCipher) -> VaultResult<()> {
    read_verified(path, record, cipher).map(|_| ())
}

/// Verify an artifact; failures are logged and reported as `false`
pub fn verify_integrity(path: &Path, record: &BackupRecord, cipher: &BackupCipher) -> bool {
    match check_integrity(path, record, cipher) {
        Ok(()) => true,
        Err(e) => {
            warn!(backup_id = %record.id, filename = %record.filename, error = %e, "integrity check failed");
            false
        }
    }
}

/// Verify an artifact and describe what was found
pub fn inspect_artifact(path: &Path, record: &BackupRecord, cipher: &BackupCipher) -> IntegrityReport {
    let mut report = IntegrityReport {
        backup_id: record.id,
        filename: record.filename.clone(),
        expected_size: record.size,
        actual_size: fs::metadata(path).ok().map(|m| m.len()),
        encrypted: record.is_encrypted(),
        compressed: record.compressed,
        state_bytes: None,
        file_bytes: None,
        error: None,
    };

    match read_verified(path, record, cipher).and_then(|artifact| {
        let frame = artifact.frame()?;
        Ok((frame.state.len() as u64, frame.files.len() as u64))
    }) {
        Ok((state, files)) => {
            report.state_bytes = Some(state);
            report.file_bytes = Some(files);
        }
        Err(e) => {
            warn!(backup_id = %record.id, filename = %record.filename, error = %e, "integrity check failed");
            report.error = Some(e.to_string());
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{compress_buffer, encode_frame};
    use crate::backup::testing::fixture_with;
    use crate::backup::{BackupManager, BackupPolicy};
    use crate::crypto::DerivedKey;
    use crate::models::{BackupType, NewBackup};
    use chrono::Utc;
    use tempfile::TempDir;

    fn write_artifact(
        dir: &Path,
        cipher: Option<&BackupCipher>,
        compressed: bool,
    ) -> (std::path::PathBuf, BackupRecord) {
        let snapshot = encode_frame(b"STATE", b"");
        let mut bytes = if compressed {
            compress_buffer(&snapshot, 6).unwrap()
        } else {
            snapshot
        };
        let mut iv = None;
        if let Some(cipher) = cipher {
            let (ciphertext, encoded) = cipher.encrypt(&bytes).unwrap();
            bytes = ciphertext;
            iv = Some(encoded);
        }

        let path = dir.join("artifact");
        fs::write(&path, &bytes).unwrap();
        let record = BackupRecord::from_new(
            BackupId::new(),
            NewBackup {
                filename: "artifact".into(),
                backup_type: BackupType::Manual,
                size: bytes.len() as u64,
                iv,
                compressed,
                compression_level: 6,
                checksum: Some(artifact_checksum(&bytes)),
                created_at: Utc::now(),
                duration_ms: 0,
            },
        );
        (path, record)
    }

    fn cipher() -> BackupCipher {
        BackupCipher::new(DerivedKey::from_bytes([5; 32]))
    }

    #[test]
    fn test_valid_artifacts() {
        let temp_dir = TempDir::new().unwrap();
        for (encrypted, compressed) in [(false, false), (false, true), (true, true), (true, false)] {
            let c = cipher();
            let (path, record) =
                write_artifact(temp_dir.path(), encrypted.then_some(&c), compressed);
            assert!(verify_integrity(&path, &record, &c));
        }
    }

    #[test]
    fn test_size_edit_detected() {
        let temp_dir = TempDir::new().unwrap();
        let (path, record) = write_artifact(temp_dir.path(), None, true);

        let mut bytes = fs::read(&path).unwrap();
        bytes.push(0);
        fs::write(&path, &bytes).unwrap();

        assert!(!verify_integrity(&path, &record, &BackupCipher::without_key()));
        assert!(matches!(
            check_integrity(&path, &record, &BackupCipher::without_key()),
            Err(VaultError::Integrity(_))
        ));
    }

    #[test]
    fn test_byte_flip_detected() {
        let temp_dir = TempDir::new().unwrap();
        let c = cipher();
        let (path, record) = write_artifact(temp_dir.path(), Some(&c), true);

        let mut bytes = fs::read(&path).unwrap();
        bytes[3] ^= 0x01;
        fs::write(&path, &bytes).unwrap();

        assert!(!verify_integrity(&path, &record, &c));
    }

    #[test]
    fn test_flip_in_gzip_header_detected() {
        let temp_dir = TempDir::new().unwrap();
        let (path, record) = write_artifact(temp_dir.path(), None, true);

        let mut bytes = fs::read(&path).unwrap();
        bytes[0] ^= 0xFF;
        fs::write(&path, &bytes).unwrap();

        assert!(matches!(
            check_integrity(&path, &record, &BackupCipher::without_key()),
            Err(VaultError::Integrity(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let (path, record) = write_artifact(temp_dir.path(), None, true);
        fs::remove_file(&path).unwrap();

        let report = inspect_artifact(&path, &record, &BackupCipher::without_key());
        assert!(!report.is_valid());
        assert_eq!(report.actual_size, None);
    }

    #[test]
    fn test_encrypted_without_key_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let (path, record) = write_artifact(temp_dir.path(), Some(&cipher()), true);
        assert!(matches!(
            check_integrity(&path, &record, &BackupCipher::without_key()),
            Err(VaultError::Config(_))
        ));
    }

    #[test]
    fn test_report_counts_frame_parts() {
        let temp_dir = TempDir::new().unwrap();
        let (path, record) = write_artifact(temp_dir.path(), None, true);
        let report = inspect_artifact(&path, &record, &BackupCipher::without_key());
        assert!(report.is_valid());
        assert_eq!(report.state_bytes, Some(5));
        assert_eq!(report.file_bytes, Some(0));
    }

    #[test]
    fn test_record_without_checksum_still_verifies() {
        let temp_dir = TempDir::new().unwrap();
        let (path, mut record) = write_artifact(temp_dir.path(), None, true);
        record.checksum = None;
        assert!(verify_integrity(&path, &record, &BackupCipher::without_key()));
    }

    #[test]
    fn test_checksum_mismatch_is_integrity_error() {
        let temp_dir = TempDir::new().unwrap();
        let (path, mut record) = write_artifact(temp_dir.path(), None, false);
        record.checksum = Some(artifact_checksum(b"something else"));
        assert!(matches!(
            check_integrity(&path, &record, &BackupCipher::without_key()),
            Err(VaultError::Integrity(_))
        ));
    }

    #[test]
    fn test_every_byte_flip_detected() {
        let configs = [(true, false), (false, false), (true, true)];
        for (compression_enabled, encryption_enabled) in configs {
            let (_dir, ctx) = fixture_with(
                BackupPolicy {
                    compression_enabled,
                    encryption_enabled,
                    min_free_space: 0,
                    ..BackupPolicy::default()
                },
                encryption_enabled,
            );
            let record = BackupManager::new(ctx.clone())
                .create_backup(BackupType::Manual)
                .unwrap();
            let path = ctx.layout.artifact_path(&record);
            let original = fs::read(&path).unwrap();
            assert!(verify_integrity(&path, &record, &ctx.cipher));

            let mut undetected = Vec::new();
            for i in 0..original.len() {
                let mut bytes = original.clone();
                bytes[i] ^= 0x01;
                fs::write(&path, &bytes).unwrap();
                if verify_integrity(&path, &record, &ctx.cipher) {
                    undetected.push(i);
                }
            }
            assert!(
                undetected.is_empty(),
                "compressed={} encrypted={} len={} undetected={:?}",
                compression_enabled,
                encryption_enabled,
                original.len(),
                undetected
            );

            fs::write(&path, &original).unwrap();
            assert!(verify_integrity(&path, &record, &ctx.cipher));
        }
    }
}
