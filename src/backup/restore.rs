//! Backup restoration
//!
//! Restore runs in two phases. The state store is replaced first, then the
//! upload tree. Each phase is atomic on its own but the pair is not: if the
//! file-tree phase fails the state store is already restored, and the error
//! says so. Rerunning with only `include_files` retries the second phase.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{error, info};

use super::context::BackupContext;
use super::integrity::read_verified;
use crate::error::{RestoreStep, VaultError, VaultResult};
use crate::models::{BackupId, BackupRecord};

/// What to restore
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestoreOptions {
    pub include_database: bool,
    pub include_files: bool,
}

impl Default for RestoreOptions {
    fn default() -> Self {
        Self {
            include_database: true,
            include_files: true,
        }
    }
}

impl RestoreOptions {
    /// Only the upload tree, e.g. to retry after a failed file-tree step
    pub fn files_only() -> Self {
        Self {
            include_database: false,
            include_files: true,
        }
    }

    pub fn database_only() -> Self {
        Self {
            include_database: true,
            include_files: false,
        }
    }
}

/// Result of a restore operation
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreReport {
    pub backup_id: BackupId,
    pub filename: String,
    pub state_restored: bool,
    pub files_restored: bool,
    pub state_bytes: u64,
    pub file_bytes: u64,
    pub duration_ms: u64,
}

impl RestoreReport {
    /// Get a summary of what was restored
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if self.state_restored {
            parts.push("state store");
        }
        if self.files_restored {
            parts.push("uploaded files");
        }
        if parts.is_empty() {
            return "Nothing restored".to_string();
        }
        format!("Restored: {}", parts.join(", "))
    }
}

/// Handles restoring from backups
#[derive(Debug, Clone)]
pub struct RestoreManager {
    ctx: Arc<BackupContext>,
}

impl RestoreManager {
    pub fn new(ctx: Arc<BackupContext>) -> Self {
        Self { ctx }
    }

    /// Restore a backup over the live state store and upload tree
    ///
    /// Holds the system-wide lock, so no backup, export or purge runs while
    /// live data is being replaced.
    ///
    /// With neither part selected the backup is still looked up and verified,
    /// and nothing is written.
    pub fn restore_backup(&self, id: BackupId, options: RestoreOptions) -> VaultResult<RestoreReport> {
        let started = Instant::now();
        let _lock = self.ctx.locks.lock_system()?;

        let record = self
            .ctx
            .metadata
            .find_backup(id)?
            .ok_or_else(|| VaultError::backup_not_found(id.to_string()))?;
        let path = self.ctx.layout.artifact_path(&record);

        let artifact = read_verified(&path, &record, &self.ctx.cipher)?;
        let frame = artifact.frame().map_err(|e| restore_error(&record, RestoreStep::Decode, e))?;

        let mut report = RestoreReport {
            backup_id: record.id,
            filename: record.filename.clone(),
            state_restored: false,
            files_restored: false,
            state_bytes: frame.state.len() as u64,
            file_bytes: frame.files.len() as u64,
            duration_ms: 0,
        };

        if options.include_database {
            self.ctx
                .state
                .restore(frame.state)
                .map_err(|e| restore_error(&record, RestoreStep::StateStore, e))?;
            report.state_restored = true;
        }

        if options.include_files {
            self.ctx
                .files
                .restore(frame.files)
                .map_err(|e| restore_error(&record, RestoreStep::FileTree, e))?;
            report.files_restored = true;
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            backup_id = %record.id,
            filename = %record.filename,
            state = report.state_restored,
            files = report.files_restored,
            duration_ms = report.duration_ms,
            "backup restored"
        );
        Ok(report)
    }
}

fn restore_error(record: &BackupRecord, step: RestoreStep, err: VaultError) -> VaultError {
    error!(backup_id = %record.id, filename = %record.filename, %step, error = %err, "restore failed");
    VaultError::Restore {
        step,
        message: err.to_string(),
    }
}
