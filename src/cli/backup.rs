//! Backup CLI commands
//!
//! Implements CLI commands for the backup lifecycle: create, inspect,
//! verify, restore, export, delete and purge.

use std::time::Duration;

use clap::Subcommand;

use crate::backup::{BackupService, CancelToken, ExportOptions, RestoreOptions};
use crate::display::{
    format_backup_details, format_backup_list, format_export_list, format_integrity_report,
    format_purge_report, format_space_info,
};
use crate::error::{VaultError, VaultResult};
use crate::models::{BackupId, BackupRecord, BackupType, ExportFormat, ExportId, ExportRecord};
use crate::storage::{BackupQuery, SortField, SortOrder};

/// Backup subcommands
#[derive(Subcommand)]
pub enum BackupCommands {
    /// Create a new backup
    Create {
        /// Backup type: auto or manual
        #[arg(short = 't', long = "type", default_value = "manual")]
        backup_type: BackupType,

        /// Give up after this many seconds
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// List backups
    List {
        /// Only backups of this type
        #[arg(short = 't', long = "type")]
        backup_type: Option<BackupType>,

        /// Sort by created, size or name
        #[arg(long, default_value = "created")]
        sort: SortField,

        /// asc or desc
        #[arg(long, default_value = "desc")]
        order: SortOrder,

        #[arg(long)]
        limit: Option<usize>,

        #[arg(long, default_value_t = 0)]
        offset: usize,

        /// Print records as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show information about a specific backup
    Info {
        /// Backup id, short id, filename or 'latest'
        backup: String,
    },

    /// Check that a backup decodes cleanly
    Verify {
        /// Backup id, short id, filename or 'latest'
        #[arg(required_unless_present = "all")]
        backup: Option<String>,

        /// Verify every recorded backup
        #[arg(long, conflicts_with = "backup")]
        all: bool,
    },

    /// Restore the state store and uploaded files from a backup
    Restore {
        /// Backup id, short id, filename or 'latest'
        backup: String,

        /// Restore only the uploaded files
        #[arg(long, conflicts_with = "database_only")]
        files_only: bool,

        /// Restore only the state store
        #[arg(long)]
        database_only: bool,

        /// Skip the manual safety backup taken before restoring
        #[arg(long)]
        no_safety_backup: bool,

        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },

    /// Package a backup for transfer
    Export {
        /// Backup id, short id, filename or 'latest'
        backup: String,

        /// raw, zip, tar or encrypted-json
        #[arg(short, long, default_value = "zip")]
        format: ExportFormat,

        /// Compression level 0-9 for the container
        #[arg(short, long)]
        level: Option<u32>,

        /// Leave out the metadata document
        #[arg(long)]
        no_metadata: bool,
    },

    /// Delete a backup
    Delete {
        /// Backup id, short id or filename
        backup: String,

        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },

    /// List exports in the staging area
    Exports,

    /// Delete an export
    DeleteExport {
        /// Export id or filename
        export: String,
    },

    /// Apply retention and clean up orphans
    Purge,

    /// Show backup storage usage
    Space {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Handle a backup command
pub fn handle_backup_command(service: &BackupService, cmd: BackupCommands) -> VaultResult<()> {
    match cmd {
        BackupCommands::Create {
            backup_type,
            timeout,
        } => {
            let cancel = match timeout {
                Some(secs) => CancelToken::with_timeout(Duration::from_secs(secs)),
                None => CancelToken::new(),
            };
            println!("Creating {} backup...", backup_type);
            let record = service.create_backup_with(backup_type, &cancel)?;
            println!("Backup created: {}", record.filename);
            println!("ID: {}", record.id.as_uuid());
            println!(
                "Location: {}",
                service.context().layout.artifact_path(&record).display()
            );
        }

        BackupCommands::List {
            backup_type,
            sort,
            order,
            limit,
            offset,
            json,
        } => {
            let query = BackupQuery {
                backup_type,
                ..BackupQuery::all()
            }
            .sorted(sort, order)
            .paginate(limit, offset);
            let backups = service.list_backups(&query)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&backups)?);
            } else if backups.is_empty() {
                println!("No backups found.");
                println!("Create one with: cvault backup create");
            } else {
                println!("{}", format_backup_list(&backups, chrono::Utc::now()));
            }
        }

        BackupCommands::Info { backup } => {
            let record = resolve_backup(service, &backup)?;
            let path = service.context().layout.artifact_path(&record);
            print!("{}", format_backup_details(&record, &path));
        }

        BackupCommands::Verify { backup, all } => {
            let records = match backup {
                Some(backup) if !all => vec![resolve_backup(service, &backup)?],
                _ => service.list_backups(&BackupQuery::all())?,
            };

            let mut failed = 0;
            for record in &records {
                let report = service.verify_backup(record.id)?;
                if !report.is_valid() {
                    failed += 1;
                }
                println!("{}", format_integrity_report(&report));
            }

            if failed > 0 {
                return Err(VaultError::Integrity(format!(
                    "{} of {} backup(s) failed verification",
                    failed,
                    records.len()
                )));
            }
            println!("{} backup(s) verified.", records.len());
        }

        BackupCommands::Restore {
            backup,
            files_only,
            database_only,
            no_safety_backup,
            force,
        } => {
            let record = resolve_backup(service, &backup)?;
            let options = if files_only {
                RestoreOptions::files_only()
            } else if database_only {
                RestoreOptions::database_only()
            } else {
                RestoreOptions::default()
            };

            println!("Backup: {} ({})", record.filename, record.id);
            println!(
                "Created: {}",
                record.created_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
            println!();

            if !force {
                println!("WARNING: This will overwrite the live data!");
                println!("To proceed, run again with --force flag:");
                println!("  cvault backup restore {} --force", backup);
                return Ok(());
            }

            if !no_safety_backup {
                println!("Creating backup of current data before restore...");
                let safety = service.create_backup(BackupType::Manual)?;
                println!("Pre-restore backup saved: {}", safety.filename);
                println!();
            }

            println!("Restoring from backup...");
            let report = service.restore_backup(record.id, options)?;
            println!("Restore complete!");
            println!("{}", report.summary());
        }

        BackupCommands::Export {
            backup,
            format,
            level,
            no_metadata,
        } => {
            let record = resolve_backup(service, &backup)?;
            let mut options = ExportOptions::new(format);
            if let Some(level) = level {
                options = options.with_compression(level);
            }
            if no_metadata {
                options = options.without_metadata();
            }

            let outcome = service.export_backup(record.id, options)?;
            println!("Export created: {}", outcome.record.filename);
            println!("ID: {}", outcome.record.id.as_uuid());
            println!("Location: {}", outcome.path.display());
        }

        BackupCommands::Delete { backup, force } => {
            let record = resolve_backup(service, &backup)?;
            if !force {
                println!("This will permanently delete {}.", record.filename);
                println!("To proceed, run again with --force flag:");
                println!("  cvault backup delete {} --force", backup);
                return Ok(());
            }
            service.delete_backup(record.id)?;
            println!("Deleted backup: {}", record.filename);
        }

        BackupCommands::Exports => {
            println!("{}", format_export_list(&service.list_exports()?));
        }

        BackupCommands::DeleteExport { export } => {
            let record = resolve_export(service, &export)?;
            service.delete_export(record.id)?;
            println!("Deleted export: {}", record.filename);
        }

        BackupCommands::Purge => {
            let report = service.run_purge()?;
            print!("{}", format_purge_report(&report));
        }

        BackupCommands::Space { json } => {
            let info = service.get_space_info()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                print!("{}", format_space_info(&info));
            }
        }
    }

    Ok(())
}

/// Resolve a backup identifier to its record
///
/// Accepts a full UUID, the short `bak-xxxxxxxx` form, a UUID prefix, an
/// artifact filename, or `latest`.
pub fn resolve_backup(service: &BackupService, identifier: &str) -> VaultResult<BackupRecord> {
    let identifier = identifier.trim();

    if identifier.eq_ignore_ascii_case("latest") {
        return service
            .latest_backup(None)?
            .ok_or_else(|| VaultError::backup_not_found("latest"));
    }

    if let Ok(id) = BackupId::parse(identifier) {
        return service.get_backup_details(id);
    }

    let prefix = identifier.strip_prefix("bak-").unwrap_or(identifier);
    let matches: Vec<BackupRecord> = service
        .list_backups(&BackupQuery::all())?
        .into_iter()
        .filter(|b| b.filename == identifier || b.id.as_uuid().to_string().starts_with(prefix))
        .collect();

    pick_one(matches, identifier, "Backup")
}

/// Resolve an export identifier to its record
pub fn resolve_export(service: &BackupService, identifier: &str) -> VaultResult<ExportRecord> {
    let identifier = identifier.trim();

    if let Ok(id) = ExportId::parse(identifier) {
        return service
            .list_exports()?
            .into_iter()
            .find(|e| e.id == id)
            .ok_or_else(|| VaultError::export_not_found(identifier));
    }

    let prefix = identifier.strip_prefix("exp-").unwrap_or(identifier);
    let matches: Vec<ExportRecord> = service
        .list_exports()?
        .into_iter()
        .filter(|e| e.filename == identifier || e.id.as_uuid().to_string().starts_with(prefix))
        .collect();

    pick_one(matches, identifier, "Export")
}

fn pick_one<T>(mut matches: Vec<T>, identifier: &str, entity_type: &'static str) -> VaultResult<T> {
    match matches.len() {
        0 => Err(VaultError::NotFound {
            entity_type,
            identifier: identifier.to_string(),
        }),
        1 => Ok(matches.remove(0)),
        n => Err(VaultError::Validation(format!(
            "'{}' matches {} {}s; use more of the id",
            identifier,
            n,
            entity_type.to_lowercase()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::testing::fixture;
    use std::sync::Arc;

    fn service() -> (tempfile::TempDir, BackupService) {
        let (dir, ctx) = fixture();
        let ctx = Arc::try_unwrap(ctx).unwrap();
        (dir, BackupService::new(ctx))
    }

    #[test]
    fn test_resolve_by_every_form() {
        let (_dir, service) = service();
        let first = service.create_backup(BackupType::Manual).unwrap();
        let latest = service.create_backup(BackupType::Auto).unwrap();

        let full = first.id.as_uuid().to_string();
        assert_eq!(resolve_backup(&service, &full).unwrap().id, first.id);
        assert_eq!(
            resolve_backup(&service, &first.id.to_string()).unwrap().id,
            first.id
        );
        assert_eq!(
            resolve_backup(&service, &first.filename).unwrap().id,
            first.id
        );
        assert_eq!(resolve_backup(&service, "latest").unwrap().id, latest.id);
    }

    #[test]
    fn test_resolve_missing() {
        let (_dir, service) = service();
        assert!(resolve_backup(&service, "latest").unwrap_err().is_not_found());
        assert!(resolve_backup(&service, "bak-deadbeef")
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_resolve_export() {
        let (_dir, service) = service();
        let backup = service.create_backup(BackupType::Manual).unwrap();
        let outcome = service
            .export_backup(backup.id, ExportOptions::new(ExportFormat::Raw))
            .unwrap();

        let found = resolve_export(&service, &outcome.record.filename).unwrap();
        assert_eq!(found.id, outcome.record.id);
        let found = resolve_export(&service, &outcome.record.id.to_string()).unwrap();
        assert_eq!(found.id, outcome.record.id);
    }
}
