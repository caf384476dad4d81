//! The backup service facade
//!
//! Wires the manager, restore, export and purge components over one shared
//! [`BackupContext`] and records every mutating operation in the audit log.

use std::sync::Arc;

use tracing::debug;

use super::cancel::CancelToken;
use super::context::{BackupContext, BackupPolicy};
use super::export::{ExportOptions, ExportOutcome, ExportService};
use super::integrity::IntegrityReport;
use super::manager::BackupManager;
use super::purge::{PurgeReport, PurgeService};
use super::restore::{RestoreManager, RestoreOptions, RestoreReport};
use super::space::{disk_space, SpaceInfo};
use crate::audit::{AuditEntry, AuditLogger, EntityType, Operation};
use crate::config::{Settings, VaultPaths};
use crate::crypto::{derive_key, BackupCipher, SecureString};
use crate::error::{VaultError, VaultResult};
use crate::models::{BackupId, BackupRecord, BackupType, ExportId, ExportRecord};
use crate::storage::{BackupQuery, FileStateStore, FileTree, JsonMetadataStore};

/// Entry point for every backup operation
#[derive(Debug, Clone)]
pub struct BackupService {
    ctx: Arc<BackupContext>,
    manager: BackupManager,
    restorer: RestoreManager,
    exporter: ExportService,
    purger: PurgeService,
    audit: Option<AuditLogger>,
}

impl BackupService {
    /// Service over explicit dependencies, without an audit log
    pub fn new(ctx: BackupContext) -> Self {
        let ctx = Arc::new(ctx);
        Self {
            manager: BackupManager::new(ctx.clone()),
            restorer: RestoreManager::new(ctx.clone()),
            exporter: ExportService::new(ctx.clone()),
            purger: PurgeService::new(ctx.clone()),
            ctx,
            audit: None,
        }
    }

    pub fn with_audit(mut self, audit: AuditLogger) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Build the service from settings: JSON metadata store, file state
    /// store, upload tree and audit log under `paths`
    ///
    /// `secret` is the encryption passphrase. Without it the service still
    /// opens; encrypted operations fail with a configuration error.
    pub fn open(
        paths: &VaultPaths,
        settings: &Settings,
        secret: Option<&SecureString>,
    ) -> VaultResult<Self> {
        let policy = BackupPolicy::from_settings(settings)?;
        let layout = settings.layout(paths);
        layout.ensure_directories()?;

        let cipher = match secret {
            Some(secret) => {
                let params = settings.encryption.key_params.as_ref().ok_or_else(|| {
                    VaultError::Config(
                        "No key derivation parameters in settings; run `cvault init` first".into(),
                    )
                })?;
                BackupCipher::new(derive_key(secret.as_str(), params)?)
            }
            None => BackupCipher::without_key(),
        };

        let ctx = BackupContext::new(
            layout,
            policy,
            Arc::new(JsonMetadataStore::open(paths.metadata_file())?),
            Arc::new(FileStateStore::new(settings.state_store_path(paths))),
            FileTree::new(
                settings.uploads_dir(paths),
                settings.sources.ignore_patterns.clone(),
            ),
            cipher,
        );
        debug!(?ctx, "backup service opened");

        Ok(Self::new(ctx).with_audit(AuditLogger::new(paths.audit_log())))
    }

    pub fn context(&self) -> &BackupContext {
        &self.ctx
    }

    fn audit_backup(&self, operation: Operation, record: &BackupRecord) {
        if let Some(audit) = &self.audit {
            audit.record(&AuditEntry::new(
                operation,
                EntityType::Backup,
                record.id.to_string(),
                Some(record.filename.clone()),
                record,
            ));
        }
    }

    fn audit_export(&self, operation: Operation, record: &ExportRecord) {
        if let Some(audit) = &self.audit {
            audit.record(&AuditEntry::new(
                operation,
                EntityType::Export,
                record.id.to_string(),
                Some(record.filename.clone()),
                record,
            ));
        }
    }

    pub fn create_backup(&self, backup_type: BackupType) -> VaultResult<BackupRecord> {
        self.create_backup_with(backup_type, &CancelToken::new())
    }

    pub fn create_backup_with(
        &self,
        backup_type: BackupType,
        cancel: &CancelToken,
    ) -> VaultResult<BackupRecord> {
        let record = self.manager.create_backup_with(backup_type, cancel)?;
        self.audit_backup(Operation::Create, &record);
        Ok(record)
    }

    pub fn list_backups(&self, query: &BackupQuery) -> VaultResult<Vec<BackupRecord>> {
        self.manager.list_backups(query)
    }

    pub fn get_backup_details(&self, id: BackupId) -> VaultResult<BackupRecord> {
        self.manager.get_backup(id)
    }

    pub fn latest_backup(&self, backup_type: Option<BackupType>) -> VaultResult<Option<BackupRecord>> {
        self.manager.latest_backup(backup_type)
    }

    pub fn verify_backup(&self, id: BackupId) -> VaultResult<IntegrityReport> {
        self.manager.verify_backup(id)
    }

    pub fn restore_backup(&self, id: BackupId, options: RestoreOptions) -> VaultResult<RestoreReport> {
        let report = self.restorer.restore_backup(id, options)?;
        if let Some(audit) = &self.audit {
            audit.record(&AuditEntry::new(
                Operation::Restore,
                EntityType::Backup,
                report.backup_id.to_string(),
                Some(report.filename.clone()),
                &report,
            ));
        }
        Ok(report)
    }

    pub fn export_backup(&self, id: BackupId, options: ExportOptions) -> VaultResult<ExportOutcome> {
        let outcome = self.exporter.export_backup(id, options)?;
        self.audit_export(Operation::Export, &outcome.record);
        Ok(outcome)
    }

    pub fn delete_backup(&self, id: BackupId) -> VaultResult<BackupRecord> {
        let record = self.manager.delete_backup(id)?;
        self.audit_backup(Operation::Delete, &record);
        Ok(record)
    }

    pub fn list_exports(&self) -> VaultResult<Vec<ExportRecord>> {
        self.exporter.list_exports()
    }

    pub fn delete_export(&self, id: ExportId) -> VaultResult<ExportRecord> {
        let record = self.exporter.delete_export(id)?;
        self.audit_export(Operation::Delete, &record);
        Ok(record)
    }

    pub fn run_purge(&self) -> VaultResult<PurgeReport> {
        let report = self.purger.run_purge()?;
        if let Some(audit) = &self.audit {
            audit.record(&AuditEntry::purge(&report));
        }
        Ok(report)
    }

    /// Volume capacity and how much of it backups use
    pub fn get_space_info(&self) -> VaultResult<SpaceInfo> {
        let space = disk_space(self.ctx.layout.root());
        Ok(SpaceInfo {
            total: space.map_or(0, |s| s.total),
            free: space.map_or(0, |s| s.available),
            used: self.ctx.metadata.sum_backup_sizes()?,
            count: self.ctx.metadata.count_backups()?,
            min_required: self.ctx.policy.min_free_space,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyDerivationParams;
    use crate::models::ExportFormat;
    use std::fs;
    use tempfile::TempDir;

    fn setup(encrypted: bool) -> (TempDir, VaultPaths, Settings) {
        let temp_dir = TempDir::new().unwrap();
        let paths = VaultPaths::with_base_dir(temp_dir.path().to_path_buf());
        fs::create_dir_all(temp_dir.path().join("data")).unwrap();
        fs::write(paths.default_state_store(), b"STATE").unwrap();
        fs::create_dir_all(paths.default_uploads_dir()).unwrap();
        fs::write(paths.default_uploads_dir().join("note.txt"), b"hello").unwrap();

        let mut settings = Settings::default();
        settings.min_free_space = "0".into();
        settings.encryption.enabled = encrypted;
        settings.encryption.key_params = Some(KeyDerivationParams::with_costs(1024, 1, 1));
        (temp_dir, paths, settings)
    }

    #[test]
    fn test_open_and_round_trip_with_audit() {
        let (_temp, paths, settings) = setup(false);
        let service = BackupService::open(&paths, &settings, None).unwrap();

        let record = service.create_backup(BackupType::Manual).unwrap();
        service
            .export_backup(record.id, ExportOptions::new(ExportFormat::Zip))
            .unwrap();
        service
            .restore_backup(record.id, RestoreOptions::default())
            .unwrap();
        service.run_purge().unwrap();

        let entries = AuditLogger::new(paths.audit_log()).read_all().unwrap();
        let ops: Vec<_> = entries.iter().map(|e| e.operation).collect();
        assert_eq!(
            ops,
            vec![
                Operation::Create,
                Operation::Export,
                Operation::Restore,
                Operation::Purge
            ]
        );
    }

    #[test]
    fn test_records_persist_across_opens() {
        let (_temp, paths, settings) = setup(false);
        let record = BackupService::open(&paths, &settings, None)
            .unwrap()
            .create_backup(BackupType::Auto)
            .unwrap();

        let reopened = BackupService::open(&paths, &settings, None).unwrap();
        assert_eq!(reopened.get_backup_details(record.id).unwrap(), record);
        let info = reopened.get_space_info().unwrap();
        assert_eq!(info.count, 1);
        assert_eq!(info.used, record.size);
    }

    #[test]
    fn test_encrypted_service_needs_secret() {
        let (_temp, paths, settings) = setup(true);

        let keyless = BackupService::open(&paths, &settings, None).unwrap();
        assert!(matches!(
            keyless.create_backup(BackupType::Manual),
            Err(VaultError::Config(_))
        ));

        let secret = SecureString::new("correct horse battery staple");
        let keyed = BackupService::open(&paths, &settings, Some(&secret)).unwrap();
        let record = keyed.create_backup(BackupType::Manual).unwrap();
        assert!(record.is_encrypted());
        assert!(keyed.verify_backup(record.id).unwrap().is_valid());

        // Same passphrase, fresh process: the key derives identically
        let again = BackupService::open(&paths, &settings, Some(&secret)).unwrap();
        assert!(again.verify_backup(record.id).unwrap().is_valid());

        let wrong = SecureString::new("wrong passphrase");
        let wrong = BackupService::open(&paths, &settings, Some(&wrong)).unwrap();
        assert!(!wrong.verify_backup(record.id).unwrap().is_valid());
    }

    #[test]
    fn test_secret_without_params_is_config_error() {
        let (_temp, paths, mut settings) = setup(false);
        settings.encryption.key_params = None;
        let secret = SecureString::new("pass");
        assert!(matches!(
            BackupService::open(&paths, &settings, Some(&secret)),
            Err(VaultError::Config(_))
        ));
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let (_temp, paths, mut settings) = setup(false);
        settings.compression.level = 11;
        assert!(matches!(
            BackupService::open(&paths, &settings, None),
            Err(VaultError::Config(_))
        ));
    }
}
