//! Display formatting for terminal output
//!
//! Tables and detail views for backups, exports and reports.

pub mod backup;

pub use backup::{
    format_age, format_backup_details, format_backup_list, format_export_list,
    format_integrity_report, format_purge_report, format_space_info,
};
