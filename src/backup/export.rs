//! Export of backups into portable formats
//!
//! An export re-verifies the source artifact, packages it in the requested
//! container and writes it to the temp directory. Export files are
//! short-lived; purge removes them after `export_retention_hours`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::context::BackupContext;
use super::integrity::{read_verified, VerifiedArtifact};
use super::space::ensure_capacity;
use crate::archive::{
    build_raw, build_tar, build_zip, compression_level, EncryptedEnvelope, ExportManifest,
};
use crate::error::{VaultError, VaultResult};
use crate::models::{BackupId, BackupRecord, ExportFormat, ExportId, ExportRecord, NewExport};
use crate::storage::{partial_path, remove_file_if_exists, write_bytes_atomic};

// Caller holds the source type's lock, so concurrent exports of one backup
// are serialized through this check.
fn next_export_filename(
    dir: &Path,
    source: &BackupRecord,
    format: ExportFormat,
    at: DateTime<Utc>,
) -> String {
    let stamp = at.format("%Y%m%dT%H%M%S%6fZ");
    let mut attempt = 0u32;
    loop {
        let filename = if attempt == 0 {
            format!("export-{}-{}.{}", stamp, source.filename, format.extension())
        } else {
            format!("export-{}-{}-{}.{}", stamp, source.filename, attempt, format.extension())
        };
        let path = dir.join(&filename);
        if !path.exists() && !partial_path(&path).exists() {
            return filename;
        }
        debug!(%filename, "export name taken, trying next suffix");
        attempt += 1;
    }
}

/// How to package an export
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportOptions {
    pub format: ExportFormat,
    /// Compression level for the container, independent of the artifact's own
    pub compression: Option<u32>,
    pub include_metadata: bool,
}

impl ExportOptions {
    pub fn new(format: ExportFormat) -> Self {
        Self {
            format,
            compression: None,
            include_metadata: true,
        }
    }

    pub fn with_compression(mut self, level: u32) -> Self {
        self.compression = Some(level);
        self
    }

    pub fn without_metadata(mut self) -> Self {
        self.include_metadata = false;
        self
    }
}

/// A written export
#[derive(Debug, Clone)]
pub struct ExportOutcome {
    pub path: PathBuf,
    pub record: ExportRecord,
}

/// Packages backups for transfer
#[derive(Debug, Clone)]
pub struct ExportService {
    ctx: Arc<BackupContext>,
}

impl ExportService {
    pub fn new(ctx: Arc<BackupContext>) -> Self {
        Self { ctx }
    }

    /// Export a backup
    pub fn export_backup(&self, id: BackupId, options: ExportOptions) -> VaultResult<ExportOutcome> {
        if let Some(level) = options.compression {
            compression_level(level)?;
        }

        let ctx = &self.ctx;
        let source = ctx
            .metadata
            .find_backup(id)?
            .ok_or_else(|| VaultError::backup_not_found(id.to_string()))?;

        ctx.layout.ensure_directories()?;
        let _lock = ctx.locks.lock_types(&[source.backup_type])?;

        let artifact = read_verified(&ctx.layout.artifact_path(&source), &source, &ctx.cipher)?;

        let exported_at = Utc::now();
        let includes_metadata = options.include_metadata && options.format.supports_metadata();
        let manifest = includes_metadata
            .then(|| ExportManifest::new(source.clone(), options.format, exported_at));

        let (bytes, level) = self.encode(&source, &artifact, options, manifest)?;

        let temp_dir = ctx.layout.temp_dir();
        let filename = next_export_filename(&temp_dir, &source, options.format, exported_at);
        let path = temp_dir.join(&filename);

        ensure_capacity(&temp_dir, bytes.len() as u64, ctx.policy.min_free_space)?;
        write_bytes_atomic(&path, &bytes)?;

        let recorded = ctx.metadata.create_export(NewExport {
            backup_id: source.id,
            filename: filename.clone(),
            format: options.format,
            size: bytes.len() as u64,
            compression_level: level,
            includes_metadata,
            created_at: exported_at,
        });

        match recorded {
            Ok(record) => {
                info!(
                    export_id = %record.id,
                    backup_id = %source.id,
                    %filename,
                    format = %options.format,
                    size = record.size,
                    "backup exported"
                );
                Ok(ExportOutcome { path, record })
            }
            Err(e) => {
                for candidate in [path.clone(), partial_path(&path)] {
                    let _ = remove_file_if_exists(&candidate);
                }
                warn!(%filename, error = %e, "export failed after write, file removed");
                Err(e)
            }
        }
    }

    // Returns the container bytes and the compression level actually applied
    fn encode(
        &self,
        source: &BackupRecord,
        artifact: &VerifiedArtifact,
        options: ExportOptions,
        manifest: Option<ExportManifest>,
    ) -> VaultResult<(Vec<u8>, Option<u32>)> {
        let manifest_bytes = manifest.as_ref().map(|m| m.to_json_bytes()).transpose()?;

        match options.format {
            ExportFormat::Raw => Ok((build_raw(&artifact.raw, options.compression)?, options.compression)),
            ExportFormat::Zip => Ok((
                build_zip(
                    &source.filename,
                    &artifact.raw,
                    manifest_bytes.as_deref(),
                    options.compression,
                )?,
                options.compression,
            )),
            ExportFormat::Tar => Ok((
                build_tar(
                    &source.filename,
                    &artifact.raw,
                    manifest_bytes.as_deref(),
                    options.compression.unwrap_or(0),
                )?,
                options.compression,
            )),
            ExportFormat::EncryptedJson => {
                // Ciphertext can't be recompressed, so no level applies here
                let (ciphertext, iv) = match &source.iv {
                    Some(iv) => (artifact.raw.clone(), iv.clone()),
                    None => self.ctx.cipher.encrypt(&artifact.raw)?,
                };
                let envelope =
                    EncryptedEnvelope::new(&ciphertext, iv, self.ctx.cipher.algorithm(), manifest);
                Ok((envelope.to_json_bytes()?, None))
            }
        }
    }

    /// All export records, newest first
    pub fn list_exports(&self) -> VaultResult<Vec<ExportRecord>> {
        self.ctx.metadata.list_exports()
    }

    /// Delete an export file and its record
    pub fn delete_export(&self, id: ExportId) -> VaultResult<ExportRecord> {
        let record = self
            .ctx
            .metadata
            .find_export(id)?
            .ok_or_else(|| VaultError::export_not_found(id.to_string()))?;

        let _lock = self.ctx.locks.lock_types(&[])?;
        self.remove_export(&record)?;
        info!(export_id = %record.id, filename = %record.filename, "export deleted");
        Ok(record)
    }

    /// Remove file then record, each only if still present
    pub(crate) fn remove_export(&self, record: &ExportRecord) -> VaultResult<()> {
        let path = self.export_path(record);
        remove_file_if_exists(&path).map_err(|e| {
            VaultError::Io(format!("Failed to delete {}: {}", path.display(), e))
        })?;
        self.ctx.metadata.delete_export(record.id)?;
        Ok(())
    }

    pub fn export_path(&self, record: &ExportRecord) -> PathBuf {
        self.ctx.layout.temp_dir().join(&record.filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{decompress, MANIFEST_NAME};
    use crate::backup::testing::{fixture, fixture_with};
    use crate::backup::{BackupManager, BackupPolicy};
    use crate::models::BackupType;
    use std::fs;
    use std::io::Cursor;

    fn source(ctx: &Arc<BackupContext>) -> BackupRecord {
        BackupManager::new(ctx.clone())
            .create_backup(BackupType::Manual)
            .unwrap()
    }

    #[test]
    fn test_every_format_matches_record_size() {
        let (_dir, ctx) = fixture_with(
            BackupPolicy {
                min_free_space: 0,
                ..BackupPolicy::default()
            },
            true,
        );
        let backup = source(&ctx);
        let service = ExportService::new(ctx);

        for format in ExportFormat::ALL {
            let outcome = service
                .export_backup(backup.id, ExportOptions::new(format).with_compression(6))
                .unwrap();
            assert_eq!(fs::metadata(&outcome.path).unwrap().len(), outcome.record.size);
            assert!(outcome
                .record
                .filename
                .ends_with(&format!("{}.{}", backup.filename, format.extension())));
            assert_eq!(outcome.record.backup_id, backup.id);
        }
        assert_eq!(service.list_exports().unwrap().len(), ExportFormat::ALL.len());
    }

    #[test]
    fn test_raw_export_round_trips_artifact() {
        let (_dir, ctx) = fixture();
        let backup = source(&ctx);
        let artifact = fs::read(ctx.layout.artifact_path(&backup)).unwrap();
        let service = ExportService::new(ctx);

        let plain = service
            .export_backup(backup.id, ExportOptions::new(ExportFormat::Raw))
            .unwrap();
        assert_eq!(fs::read(&plain.path).unwrap(), artifact);
        assert!(!plain.record.compression_enabled);
        assert!(!plain.record.includes_metadata);

        let wrapped = service
            .export_backup(backup.id, ExportOptions::new(ExportFormat::Raw).with_compression(9))
            .unwrap();
        assert_eq!(decompress(&fs::read(&wrapped.path).unwrap()).unwrap(), artifact);
        assert_eq!(wrapped.record.compression_level, Some(9));
    }

    #[test]
    fn test_zip_export_carries_metadata() {
        let (_dir, ctx) = fixture();
        let backup = source(&ctx);
        let service = ExportService::new(ctx);

        let outcome = service
            .export_backup(backup.id, ExportOptions::new(ExportFormat::Zip))
            .unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(fs::read(&outcome.path).unwrap())).unwrap();
        assert!(archive.by_name(MANIFEST_NAME).is_ok());
        assert!(archive.by_name(&backup.filename).is_ok());
        assert!(outcome.record.includes_metadata);
    }

    #[test]
    fn test_envelope_decrypts_to_artifact() {
        let (_dir, ctx) = fixture_with(
            BackupPolicy {
                min_free_space: 0,
                ..BackupPolicy::default()
            },
            true,
        );
        let backup = source(&ctx);
        let artifact = fs::read(ctx.layout.artifact_path(&backup)).unwrap();
        let cipher = ctx.cipher.clone();
        let service = ExportService::new(ctx);

        let outcome = service
            .export_backup(backup.id, ExportOptions::new(ExportFormat::EncryptedJson))
            .unwrap();
        let envelope = EncryptedEnvelope::parse(&fs::read(&outcome.path).unwrap()).unwrap();
        let plain = cipher
            .decrypt(&envelope.ciphertext().unwrap(), &envelope.iv)
            .unwrap();
        assert_eq!(plain, artifact);
        assert_eq!(envelope.metadata.unwrap().backup.id, backup.id);
    }

    #[test]
    fn test_envelope_needs_key_for_plain_source() {
        let (_dir, ctx) = fixture();
        let backup = source(&ctx);
        let service = ExportService::new(ctx.clone());

        assert!(matches!(
            service.export_backup(backup.id, ExportOptions::new(ExportFormat::EncryptedJson)),
            Err(VaultError::Config(_))
        ));
        assert!(service.list_exports().unwrap().is_empty());
        assert_eq!(fs::read_dir(ctx.layout.temp_dir()).unwrap().count(), 0);
    }

    #[test]
    fn test_corrupt_source_is_not_exported() {
        let (_dir, ctx) = fixture();
        let backup = source(&ctx);
        fs::write(ctx.layout.artifact_path(&backup), b"garbage").unwrap();
        let service = ExportService::new(ctx);

        assert!(matches!(
            service.export_backup(backup.id, ExportOptions::new(ExportFormat::Zip)),
            Err(VaultError::Integrity(_))
        ));
    }

    #[test]
    fn test_invalid_level_rejected() {
        let (_dir, ctx) = fixture();
        let backup = source(&ctx);
        let service = ExportService::new(ctx);
        assert!(matches!(
            service.export_backup(backup.id, ExportOptions::new(ExportFormat::Zip).with_compression(12)),
            Err(VaultError::Config(_))
        ));
    }

    #[test]
    fn test_delete_export() {
        let (_dir, ctx) = fixture();
        let backup = source(&ctx);
        let service = ExportService::new(ctx);
        let outcome = service
            .export_backup(backup.id, ExportOptions::new(ExportFormat::Tar))
            .unwrap();

        service.delete_export(outcome.record.id).unwrap();
        assert!(!outcome.path.exists());
        assert!(service
            .delete_export(outcome.record.id)
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_deleted_source_cannot_be_exported_but_exports_survive() {
        let (_dir, ctx) = fixture();
        let backup = source(&ctx);
        let service = ExportService::new(ctx.clone());
        let outcome = service
            .export_backup(backup.id, ExportOptions::new(ExportFormat::Raw))
            .unwrap();

        BackupManager::new(ctx).delete_backup(backup.id).unwrap();
        assert!(outcome.path.exists());
        assert!(service
            .export_backup(backup.id, ExportOptions::new(ExportFormat::Raw))
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_same_instant_names_get_suffix() {
        let (_dir, ctx) = fixture();
        let backup = source(&ctx);
        let temp_dir = ctx.layout.temp_dir();
        let at = Utc::now();

        let first = next_export_filename(&temp_dir, &backup, ExportFormat::Zip, at);
        fs::write(temp_dir.join(&first), b"taken").unwrap();
        let second = next_export_filename(&temp_dir, &backup, ExportFormat::Zip, at);
        assert_ne!(first, second);
        assert!(second.ends_with("-1.zip"));

        fs::write(partial_path(&temp_dir.join(&second)), b"in flight").unwrap();
        let third = next_export_filename(&temp_dir, &backup, ExportFormat::Zip, at);
        assert!(third.ends_with("-2.zip"));
    }

    #[test]
    fn test_repeated_exports_both_succeed() {
        let (_dir, ctx) = fixture();
        let backup = source(&ctx);
        let service = ExportService::new(ctx);

        let a = service
            .export_backup(backup.id, ExportOptions::new(ExportFormat::Raw))
            .unwrap();
        let b = service
            .export_backup(backup.id, ExportOptions::new(ExportFormat::Raw))
            .unwrap();
        assert_ne!(a.record.filename, b.record.filename);
        assert!(a.path.exists() && b.path.exists());
        assert_eq!(service.list_exports().unwrap().len(), 2);
    }
}
