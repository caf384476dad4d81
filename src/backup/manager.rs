//! Backup creation and lookup
//!
//! A backup is produced in one pass: snapshot the state store, snapshot the
//! upload tree, frame the two, compress, encrypt, then write the artifact
//! under its type directory and record it. Nothing is recorded unless the
//! artifact is fully on disk, and any failure removes what was written.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::cancel::CancelToken;
use super::context::BackupContext;
use super::integrity::{artifact_checksum, inspect_artifact, IntegrityReport};
use super::space::ensure_capacity;
use crate::archive::{compress_buffer, encode_frame};
use crate::error::{VaultError, VaultResult};
use crate::models::{BackupId, BackupRecord, BackupType, NewBackup};
use crate::storage::{partial_path, remove_file_if_exists, write_bytes_atomic, BackupQuery};

// Process-wide so two services in one process never race for a name
static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Artifact filename suffix for a compression/encryption combination
pub fn artifact_suffix(compressed: bool, encrypted: bool) -> &'static str {
    match (compressed, encrypted) {
        (true, true) => ".gz.enc",
        (true, false) => ".gz",
        (false, true) => ".enc",
        (false, false) => ".bin",
    }
}

/// Timestamp component of artifact filenames
pub fn filename_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H-%M-%S-%6fZ").to_string()
}

// Caller holds the type lock, so no other writer can claim the name between
// the existence check and the write.
fn next_filename(dir: &Path, backup_type: BackupType, at: DateTime<Utc>, suffix: &str) -> String {
    let stamp = filename_timestamp(at);
    loop {
        let seq = SEQUENCE.fetch_add(1, Ordering::SeqCst) + 1;
        let filename = format!("backup-{}-{}-{:04}{}", backup_type, stamp, seq, suffix);
        let path = dir.join(&filename);
        if !path.exists() && !partial_path(&path).exists() {
            return filename;
        }
        debug!(%filename, "artifact name taken, advancing sequence");
    }
}

/// Creates, lists and deletes backups
#[derive(Debug, Clone)]
pub struct BackupManager {
    ctx: Arc<BackupContext>,
}

impl BackupManager {
    pub fn new(ctx: Arc<BackupContext>) -> Self {
        Self { ctx }
    }

    /// Create a backup of the given type
    pub fn create_backup(&self, backup_type: BackupType) -> VaultResult<BackupRecord> {
        self.create_backup_with(backup_type, &CancelToken::new())
    }

    /// Create a backup, honouring a cancellation token
    pub fn create_backup_with(
        &self,
        backup_type: BackupType,
        cancel: &CancelToken,
    ) -> VaultResult<BackupRecord> {
        let started = Instant::now();
        let ctx = &self.ctx;
        let policy = &ctx.policy;

        if policy.encryption_enabled && !ctx.cipher.has_key() {
            return Err(VaultError::Config(
                "Encryption is enabled but no encryption secret is configured (set CVAULT_ENCRYPTION_KEY)"
                    .into(),
            ));
        }

        ctx.layout.ensure_directories()?;
        let _lock = ctx.locks.lock_types(&[backup_type])?;
        let created_at = Utc::now();
        cancel.check("start")?;

        let state = ctx.state.snapshot()?;
        debug!(source = %ctx.state.describe(), bytes = state.len(), "state store snapshotted");
        cancel.check("state snapshot")?;

        let files = ctx.files.snapshot(cancel)?;
        debug!(root = %ctx.files.root().display(), bytes = files.len(), "upload tree snapshotted");

        let mut artifact = encode_frame(&state, &files);
        drop(state);
        drop(files);
        cancel.check("framing")?;

        if policy.compression_enabled {
            artifact = compress_buffer(&artifact, policy.compression_level)?;
            debug!(bytes = artifact.len(), level = policy.compression_level, "snapshot compressed");
            cancel.check("compression")?;
        }

        let mut iv = None;
        if policy.encryption_enabled {
            let (ciphertext, encoded_iv) = ctx.cipher.encrypt(&artifact)?;
            artifact = ciphertext;
            iv = Some(encoded_iv);
            cancel.check("encryption")?;
        }

        let dir = ctx.layout.type_dir(backup_type);
        let suffix = artifact_suffix(policy.compression_enabled, iv.is_some());
        let filename = next_filename(&dir, backup_type, created_at, suffix);
        let path = dir.join(&filename);

        ensure_capacity(&dir, artifact.len() as u64, policy.min_free_space)?;
        write_bytes_atomic(&path, &artifact)?;

        let new = NewBackup {
            filename: filename.clone(),
            backup_type,
            size: artifact.len() as u64,
            iv,
            compressed: policy.compression_enabled,
            compression_level: if policy.compression_enabled {
                policy.compression_level
            } else {
                0
            },
            checksum: Some(artifact_checksum(&artifact)),
            created_at,
            duration_ms: started.elapsed().as_millis() as u64,
        };

        let recorded = cancel
            .check("write")
            .and_then(|_| ctx.metadata.create_backup(new));
        match recorded {
            Ok(record) => {
                info!(
                    backup_id = %record.id,
                    %filename,
                    backup_type = %backup_type,
                    size = record.size,
                    duration_ms = record.duration_ms,
                    "backup created"
                );
                Ok(record)
            }
            Err(e) => {
                discard_artifact(&path);
                warn!(%filename, error = %e, "backup failed after write, artifact removed");
                Err(e)
            }
        }
    }

    /// List backups matching a query
    pub fn list_backups(&self, query: &BackupQuery) -> VaultResult<Vec<BackupRecord>> {
        self.ctx.metadata.find_backups(query)
    }

    /// Look up one backup
    pub fn get_backup(&self, id: BackupId) -> VaultResult<BackupRecord> {
        self.ctx
            .metadata
            .find_backup(id)?
            .ok_or_else(|| VaultError::backup_not_found(id.to_string()))
    }

    /// Newest backup, optionally of one type
    pub fn latest_backup(&self, backup_type: Option<BackupType>) -> VaultResult<Option<BackupRecord>> {
        let query = BackupQuery {
            backup_type,
            ..BackupQuery::default()
        }
        .paginate(Some(1), 0);
        Ok(self.ctx.metadata.find_backups(&query)?.into_iter().next())
    }

    /// Path of a backup's artifact
    pub fn artifact_path(&self, record: &BackupRecord) -> PathBuf {
        self.ctx.layout.artifact_path(record)
    }

    /// Verify a backup without restoring it
    pub fn verify_backup(&self, id: BackupId) -> VaultResult<IntegrityReport> {
        let record = self.get_backup(id)?;
        Ok(inspect_artifact(
            &self.artifact_path(&record),
            &record,
            &self.ctx.cipher,
        ))
    }

    /// Delete a backup's artifact and then its record
    pub fn delete_backup(&self, id: BackupId) -> VaultResult<BackupRecord> {
        let record = self.get_backup(id)?;
        let _lock = self.ctx.locks.lock_types(&[record.backup_type])?;
        self.remove_backup(&record)?;
        info!(backup_id = %record.id, filename = %record.filename, "backup deleted");
        Ok(record)
    }

    /// Remove file then record, each only if still present
    ///
    /// Caller holds the type lock. Safe to repeat: a second call finds
    /// nothing to remove and succeeds.
    pub(crate) fn remove_backup(&self, record: &BackupRecord) -> VaultResult<()> {
        let path = self.artifact_path(record);
        remove_file_if_exists(&path).map_err(|e| {
            VaultError::Io(format!("Failed to delete {}: {}", path.display(), e))
        })?;
        self.ctx.metadata.delete_backup(record.id)?;
        Ok(())
    }
}

fn discard_artifact(path: &Path) {
    for candidate in [path.to_path_buf(), partial_path(path)] {
        if let Err(e) = remove_file_if_exists(&candidate) {
            warn!(path = %candidate.display(), error = %e, "failed to remove artifact");
        }
    }
}
