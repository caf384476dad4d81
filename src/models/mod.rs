//! Data models for the backup subsystem
//!
//! Backup and export records as persisted by the metadata store.

pub mod backup;
pub mod export;
pub mod ids;

pub use backup::{BackupRecord, BackupType, NewBackup};
pub use export::{ExportFormat, ExportRecord, NewExport};
pub use ids::{BackupId, ExportId};
