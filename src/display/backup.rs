//! Backup display formatting
//!
//! Formats backup and export records, integrity reports, purge reports and
//! space summaries for terminal output.

use std::path::Path;

use chrono::{DateTime, Utc};
use tabled::builder::Builder;
use tabled::settings::Style;

use crate::backup::{IntegrityReport, PurgeReport, SpaceInfo};
use crate::config::format_size;
use crate::models::{BackupRecord, ExportRecord};

/// Format an age in short human-readable form
pub fn format_age(duration: chrono::Duration) -> String {
    let total_seconds = duration.num_seconds().max(0);

    if total_seconds < 60 {
        return format!("{}s", total_seconds);
    }

    let minutes = total_seconds / 60;
    if minutes < 60 {
        return format!("{}m", minutes);
    }

    let hours = minutes / 60;
    if hours < 24 {
        return format!("{}h", hours);
    }

    let days = hours / 24;
    if days < 30 {
        return format!("{}d", days);
    }

    format!("{}mo", days / 30)
}

fn layers(compressed: bool, encrypted: bool) -> &'static str {
    match (compressed, encrypted) {
        (true, true) => "gzip+aes",
        (true, false) => "gzip",
        (false, true) => "aes",
        (false, false) => "none",
    }
}

/// Format backups as a table, newest age computed against `now`
pub fn format_backup_list(backups: &[BackupRecord], now: DateTime<Utc>) -> String {
    if backups.is_empty() {
        return "No backups found.".to_string();
    }

    let mut builder = Builder::new();
    builder.push_record(["ID", "Type", "Filename", "Size", "Layers", "Age"]);
    for backup in backups {
        builder.push_record([
            backup.id.to_string(),
            backup.backup_type.to_string(),
            backup.filename.clone(),
            format_size(backup.size),
            layers(backup.compressed, backup.is_encrypted()).to_string(),
            format_age(now.signed_duration_since(backup.created_at)),
        ]);
    }

    let mut table = builder.build();
    table.with(Style::rounded());

    let total: u64 = backups.iter().map(|b| b.size).sum();
    format!(
        "{}\nTotal: {} backup(s), {}",
        table,
        backups.len(),
        format_size(total)
    )
}

/// Format a single backup record in detail
pub fn format_backup_details(backup: &BackupRecord, path: &Path) -> String {
    let mut output = String::new();
    output.push_str("Backup Details\n");
    output.push_str("==============\n");
    output.push_str(&format!("ID:          {}\n", backup.id.as_uuid()));
    output.push_str(&format!("Type:        {}\n", backup.backup_type));
    output.push_str(&format!("File:        {}\n", path.display()));
    output.push_str(&format!(
        "Size:        {} ({} bytes)\n",
        format_size(backup.size),
        backup.size
    ));
    output.push_str(&format!(
        "Created:     {}\n",
        backup.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    output.push_str(&format!("Duration:    {} ms\n", backup.duration_ms));
    if backup.compressed {
        output.push_str(&format!(
            "Compression: gzip level {}\n",
            backup.compression_level
        ));
    } else {
        output.push_str("Compression: none\n");
    }
    output.push_str(&format!(
        "Encryption:  {}\n",
        if backup.is_encrypted() {
            "AES-256-GCM"
        } else {
            "none"
        }
    ));
    if let Some(checksum) = &backup.checksum {
        output.push_str(&format!("SHA-256:     {}
", checksum));
    }
    output
}

/// Format the outcome of verifying a backup
pub fn format_integrity_report(report: &IntegrityReport) -> String {
    let mut output = String::new();
    output.push_str(&format!("Backup:   {} ({})\n", report.filename, report.backup_id));
    output.push_str(&format!(
        "Size:     expected {}, found {}\n",
        report.expected_size,
        report
            .actual_size
            .map(|s| s.to_string())
            .unwrap_or_else(|| "missing".into())
    ));
    if let Some(state) = report.state_bytes {
        output.push_str(&format!("State:    {}\n", format_size(state)));
    }
    if let Some(files) = report.file_bytes {
        output.push_str(&format!("Files:    {} (archived)\n", format_size(files)));
    }
    match &report.error {
        None => output.push_str("Status:   OK\n"),
        Some(err) => output.push_str(&format!("Status:   FAILED ({})\n", err)),
    }
    output
}

/// Format exports as a table
pub fn format_export_list(exports: &[ExportRecord]) -> String {
    if exports.is_empty() {
        return "No exports found.".to_string();
    }

    let mut builder = Builder::new();
    builder.push_record(["ID", "Backup", "Format", "Filename", "Size", "Created"]);
    for export in exports {
        builder.push_record([
            export.id.to_string(),
            export.backup_id.to_string(),
            export.format.to_string(),
            export.filename.clone(),
            format_size(export.size),
            export.created_at.format("%Y-%m-%d %H:%M").to_string(),
        ]);
    }

    let mut table = builder.build();
    table.with(Style::rounded());
    table.to_string()
}

/// Format the storage summary
pub fn format_space_info(info: &SpaceInfo) -> String {
    let mut output = String::new();
    output.push_str("Backup Storage\n");
    output.push_str("==============\n");
    if info.total == 0 {
        output.push_str("Volume:       unknown\n");
    } else {
        output.push_str(&format!(
            "Volume:       {} free of {}\n",
            format_size(info.free),
            format_size(info.total)
        ));
    }
    output.push_str(&format!(
        "Backups:      {} using {}\n",
        info.count,
        format_size(info.used)
    ));
    output.push_str(&format!(
        "Min free:     {}\n",
        format_size(info.min_required)
    ));
    if info.total > 0 && info.free < info.min_required {
        output.push_str("WARNING: free space is below the configured minimum\n");
    }
    output
}

/// Format a purge run
pub fn format_purge_report(report: &PurgeReport) -> String {
    let sections: [(&str, &Vec<String>); 5] = [
        ("Expired auto backups", &report.purged_auto),
        ("Excess manual backups", &report.purged_manual),
        ("Orphan files", &report.orphan_files),
        ("Orphan records", &report.orphan_metadata),
        ("Expired exports", &report.purged_exports),
    ];

    let mut output = String::new();
    for (title, items) in sections {
        if items.is_empty() {
            continue;
        }
        output.push_str(&format!("{} ({}):\n", title, items.len()));
        for item in items {
            output.push_str(&format!("  - {}\n", item));
        }
    }

    if !report.failures.is_empty() {
        output.push_str(&format!("Failures ({}):\n", report.failures.len()));
        for failure in &report.failures {
            output.push_str(&format!("  - {}: {}\n", failure.target, failure.error));
        }
    }

    if report.removed_count() == 0 && report.failures.is_empty() {
        output.push_str("Nothing to purge.\n");
    } else {
        output.push_str(&format!("Removed {} item(s).\n", report.removed_count()));
    }
    output
}
