//! Retention enforcement and orphan reconciliation
//!
//! A purge run:
//!
//! 1. deletes auto backups older than `auto_retention_days`
//! 2. keeps only the newest `manual_retention_count` manual backups
//! 3. deletes files in the type directories that have no record, including
//!    `.partial` leftovers from interrupted writes
//! 4. deletes records whose file is gone
//! 5. expires exports older than `export_retention_hours` and reconciles the
//!    temp directory against export records
//!
//! Failures on one artifact are recorded and the run continues. Only a
//! failure to list metadata aborts it.

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::context::BackupContext;
use super::export::ExportService;
use super::integrity::verify_integrity;
use super::manager::BackupManager;
use crate::error::{VaultError, VaultResult};
use crate::models::{BackupRecord, BackupType};
use crate::storage::{remove_file_if_exists, BackupQuery, SortField, SortOrder};

/// One artifact the purge could not clean up
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurgeFailure {
    /// Filename or path of the artifact
    pub target: String,
    pub error: String,
}

/// What a purge run removed
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurgeReport {
    /// Auto backups past their age limit
    pub purged_auto: Vec<String>,
    /// Manual backups beyond the retained count
    pub purged_manual: Vec<String>,
    /// Files with no metadata record
    pub orphan_files: Vec<String>,
    /// Records with no file
    pub orphan_metadata: Vec<String>,
    /// Expired exports
    pub purged_exports: Vec<String>,
    pub failures: Vec<PurgeFailure>,
}

impl PurgeReport {
    /// Total number of items removed
    pub fn removed_count(&self) -> usize {
        self.purged_auto.len()
            + self.purged_manual.len()
            + self.orphan_files.len()
            + self.orphan_metadata.len()
            + self.purged_exports.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn fail(&mut self, target: impl Into<String>, err: impl std::fmt::Display) {
        let target = target.into();
        warn!(%target, error = %err, "purge step failed");
        self.failures.push(PurgeFailure {
            target,
            error: err.to_string(),
        });
    }
}

/// Applies retention policy to the backup tree
#[derive(Debug, Clone)]
pub struct PurgeService {
    ctx: Arc<BackupContext>,
    backups: BackupManager,
    exports: ExportService,
}

impl PurgeService {
    pub fn new(ctx: Arc<BackupContext>) -> Self {
        Self {
            backups: BackupManager::new(ctx.clone()),
            exports: ExportService::new(ctx.clone()),
            ctx,
        }
    }

    /// Run a purge against the current time
    pub fn run_purge(&self) -> VaultResult<PurgeReport> {
        self.run_purge_at(Utc::now())
    }

    /// Run a purge as if the current time were `now`
    pub fn run_purge_at(&self, now: DateTime<Utc>) -> VaultResult<PurgeReport> {
        self.ctx.layout.ensure_directories()?;
        let _lock = self.ctx.locks.lock_types(&BackupType::ALL)?;
        let policy = &self.ctx.policy;
        let mut report = PurgeReport::default();

        let auto_cutoff = now - Duration::days(i64::from(policy.auto_retention_days));
        let expired_auto = self
            .ctx
            .metadata
            .find_backups(&BackupQuery::of_type(BackupType::Auto).created_before(auto_cutoff))?;
        for record in expired_auto {
            if self.purge_backup(&record, &mut report) {
                report.purged_auto.push(record.filename);
            }
        }

        let excess_manual = self.ctx.metadata.find_backups(
            &BackupQuery::of_type(BackupType::Manual)
                .sorted(SortField::CreatedAt, SortOrder::Desc)
                .paginate(None, policy.manual_retention_count),
        )?;
        for record in excess_manual {
            if self.purge_backup(&record, &mut report) {
                report.purged_manual.push(record.filename);
            }
        }

        for backup_type in BackupType::ALL {
            self.remove_orphan_files(backup_type, &mut report)?;
        }
        self.remove_orphan_records(&mut report)?;
        self.purge_exports(now, &mut report)?;

        info!(
            purged_auto = report.purged_auto.len(),
            purged_manual = report.purged_manual.len(),
            orphan_files = report.orphan_files.len(),
            orphan_metadata = report.orphan_metadata.len(),
            purged_exports = report.purged_exports.len(),
            failures = report.failures.len(),
            "purge complete"
        );
        Ok(report)
    }

    // Verification only warns: a backup past retention goes either way.
    fn purge_backup(&self, record: &BackupRecord, report: &mut PurgeReport) -> bool {
        let path = self.ctx.layout.artifact_path(record);
        if path.exists() {
            verify_integrity(&path, record, &self.ctx.cipher);
        }
        match self.backups.remove_backup(record) {
            Ok(()) => {
                debug!(backup_id = %record.id, filename = %record.filename, "backup purged");
                true
            }
            Err(e) => {
                report.fail(record.filename.clone(), e);
                false
            }
        }
    }

    fn remove_orphan_files(&self, backup_type: BackupType, report: &mut PurgeReport) -> VaultResult<()> {
        let known: HashSet<String> = self
            .ctx
            .metadata
            .find_backups(&BackupQuery::of_type(backup_type))?
            .into_iter()
            .map(|r| r.filename)
            .collect();

        let dir = self.ctx.layout.type_dir(backup_type);
        for name in list_files(&dir, report) {
            if known.contains(&name) {
                continue;
            }
            match remove_file_if_exists(dir.join(&name)) {
                Ok(_) => {
                    debug!(file = %name, "orphan file removed");
                    report.orphan_files.push(name);
                }
                Err(e) => report.fail(name, e),
            }
        }
        Ok(())
    }

    fn remove_orphan_records(&self, report: &mut PurgeReport) -> VaultResult<()> {
        for record in self.ctx.metadata.find_backups(&BackupQuery::all())? {
            if self.ctx.layout.artifact_path(&record).exists() {
                continue;
            }
            match self.ctx.metadata.delete_backup(record.id) {
                Ok(_) => {
                    debug!(backup_id = %record.id, filename = %record.filename, "orphan record removed");
                    report.orphan_metadata.push(record.filename);
                }
                Err(e) => report.fail(record.filename, e),
            }
        }
        Ok(())
    }

    fn purge_exports(&self, now: DateTime<Utc>, report: &mut PurgeReport) -> VaultResult<()> {
        let cutoff = now - Duration::hours(i64::from(self.ctx.policy.export_retention_hours));
        let mut known = HashSet::new();

        for record in self.exports.list_exports()? {
            if record.created_at < cutoff {
                match self.exports.remove_export(&record) {
                    Ok(()) => report.purged_exports.push(record.filename),
                    Err(e) => report.fail(record.filename, e),
                }
            } else if !self.exports.export_path(&record).exists() {
                match self.ctx.metadata.delete_export(record.id) {
                    Ok(_) => report.orphan_metadata.push(record.filename),
                    Err(e) => report.fail(record.filename, e),
                }
            } else {
                known.insert(record.filename);
            }
        }

        let dir = self.ctx.layout.temp_dir();
        for name in list_files(&dir, report) {
            if known.contains(&name) {
                continue;
            }
            match remove_file_if_exists(dir.join(&name)) {
                Ok(_) => report.orphan_files.push(name),
                Err(e) => report.fail(name, e),
            }
        }
        Ok(())
    }
}

// Regular files directly inside `dir`; unreadable entries become failures
fn list_files(dir: &Path, report: &mut PurgeReport) -> Vec<String> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            report.fail(
                dir.display().to_string(),
                VaultError::Io(format!("Failed to list directory: {}", e)),
            );
            return Vec::new();
        }
    };

    let mut names = Vec::new();
    for entry in entries {
        match entry {
            Ok(entry) if entry.file_type().map_or(false, |t| t.is_file()) => {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
            Ok(_) => {}
            Err(e) => report.fail(dir.display().to_string(), e),
        }
    }
    names.sort();
    names
}
