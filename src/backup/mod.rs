//! Backup lifecycle for contract-vault
//!
//! Creates point-in-time snapshots of the application state store and the
//! upload tree, restores them, packages them for export and enforces
//! retention.
//!
//! # Architecture
//!
//! Every component shares one [`BackupContext`]: the directory layout, the
//! policy, the metadata store, the snapshot sources, the cipher and the
//! advisory locks.
//!
//! - `BackupManager`: creates, lists, verifies and deletes backups
//! - `RestoreManager`: overwrites the live sources from a verified backup
//! - `ExportService`: packages a backup as raw, zip, tar or an encrypted
//!   JSON envelope in the staging directory
//! - `PurgeService`: applies retention and removes orphans
//! - `BackupService`: facade over all of the above that writes the audit log
//!
//! # Artifact Format
//!
//! A framed snapshot (state store bytes plus a gzipped tar of the upload
//! tree), optionally gzip compressed, then optionally AES-256-GCM encrypted.
//! The suffix records which layers were applied: `.gz.enc`, `.gz`, `.enc`
//! or `.bin`.
//!
//! # Retention
//!
//! - Auto backups older than `auto_retention_days` are purged
//! - Only the newest `manual_retention_count` manual backups are kept
//! - Exports older than `export_retention_hours` are purged
//!
//! # Example
//!
//! ```rust,ignore
//! use contract_vault::backup::{BackupService, RestoreOptions};
//! use contract_vault::config::{Settings, VaultPaths};
//! use contract_vault::models::BackupType;
//!
//! let paths = VaultPaths::new()?;
//! let settings = Settings::load_or_create(&paths)?;
//! let service = BackupService::open(&paths, &settings, None)?;
//!
//! let record = service.create_backup(BackupType::Manual)?;
//! let report = service.restore_backup(record.id, RestoreOptions::default())?;
//! println!("{}", report.summary());
//! ```

mod cancel;
mod context;
mod export;
mod integrity;
mod manager;
mod purge;
mod restore;
mod service;
mod space;

#[cfg(test)]
pub(crate) mod testing;

pub use cancel::CancelToken;
pub use context::{BackupContext, BackupPolicy};
pub use export::{ExportOptions, ExportOutcome, ExportService};
pub use integrity::{check_integrity, verify_integrity, IntegrityReport};
pub use manager::BackupManager;
pub use purge::{PurgeFailure, PurgeReport, PurgeService};
pub use restore::{RestoreManager, RestoreOptions, RestoreReport};
pub use service::BackupService;
pub use space::{DiskSpace, SpaceInfo};
