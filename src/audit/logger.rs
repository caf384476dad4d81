//! Audit logger for append-only audit log
//!
//! Each entry is written as a single JSON line and flushed immediately.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;

use tracing::warn;

use crate::error::{VaultError, VaultResult};

use super::entry::AuditEntry;

/// Handles writing audit entries to the audit log file
///
/// The log file uses a line-delimited JSON format (JSONL) where each line
/// is a complete JSON object representing one audit entry.
#[derive(Debug, Clone)]
pub struct AuditLogger {
    log_path: PathBuf,
}

impl AuditLogger {
    pub fn new(log_path: PathBuf) -> Self {
        Self { log_path }
    }

    /// Append an entry to the log
    pub fn log(&self, entry: &AuditEntry) -> VaultResult<()> {
        if let Some(parent) = self.log_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| VaultError::Io(format!("Failed to create audit log directory: {}", e)))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .map_err(|e| VaultError::Io(format!("Failed to open audit log: {}", e)))?;

        let json = serde_json::to_string(entry)
            .map_err(|e| VaultError::Json(format!("Failed to serialize audit entry: {}", e)))?;

        writeln!(file, "{}", json)
            .map_err(|e| VaultError::Io(format!("Failed to write audit entry: {}", e)))?;

        file.flush()
            .map_err(|e| VaultError::Io(format!("Failed to flush audit log: {}", e)))?;

        Ok(())
    }

    /// Append an entry, logging rather than returning any failure
    ///
    /// The audited operation has already happened by the time we record it.
    pub fn record(&self, entry: &AuditEntry) {
        if let Err(e) = self.log(entry) {
            warn!(
                operation = %entry.operation,
                entity_id = %entry.entity_id,
                error = %e,
                "failed to write audit entry"
            );
        }
    }

    /// Read all audit entries from the log, oldest first
    pub fn read_all(&self) -> VaultResult<Vec<AuditEntry>> {
        if !self.log_path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.log_path)
            .map_err(|e| VaultError::Io(format!("Failed to open audit log: {}", e)))?;

        let reader = BufReader::new(file);
        let mut entries = Vec::new();

        for (line_num, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| {
                VaultError::Io(format!("Failed to read audit log line {}: {}", line_num + 1, e))
            })?;

            if line.trim().is_empty() {
                continue;
            }

            let entry: AuditEntry = serde_json::from_str(&line).map_err(|e| {
                VaultError::Json(format!(
                    "Failed to parse audit entry at line {}: {}",
                    line_num + 1,
                    e
                ))
            })?;

            entries.push(entry);
        }

        Ok(entries)
    }

    /// Read the most recent N entries from the log
    pub fn read_recent(&self, count: usize) -> VaultResult<Vec<AuditEntry>> {
        let all_entries = self.read_all()?;
        let start = all_entries.len().saturating_sub(count);
        Ok(all_entries[start..].to_vec())
    }

    pub fn path(&self) -> &PathBuf {
        &self.log_path
    }
}
