//! Backup record model
//!
//! A backup record describes one snapshot artifact on disk. Records are
//! immutable once written: an artifact is either present or deleted.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::BackupId;
use crate::error::VaultError;

/// Kind of backup, which selects the storage subdirectory and retention rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupType {
    /// Created on a schedule; purged by age
    Auto,
    /// Created by an operator; purged by count
    Manual,
}

impl BackupType {
    /// All backup types, in lock order
    pub const ALL: [BackupType; 2] = [BackupType::Auto, BackupType::Manual];

    /// Lowercase name used in filenames and directory defaults
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupType::Auto => "auto",
            BackupType::Manual => "manual",
        }
    }
}

impl fmt::Display for BackupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackupType {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" | "automatic" => Ok(BackupType::Auto),
            "manual" => Ok(BackupType::Manual),
            other => Err(VaultError::Validation(format!(
                "Unknown backup type '{}': expected auto or manual",
                other
            ))),
        }
    }
}

/// Persisted metadata for one backup artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupRecord {
    pub id: BackupId,
    /// Artifact filename inside the type directory
    pub filename: String,
    #[serde(rename = "type")]
    pub backup_type: BackupType,
    /// Artifact size in bytes as written to disk
    pub size: u64,
    /// Base64 initialization vector; present iff the artifact is encrypted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iv: Option<String>,
    /// Whether the framed snapshot was gzip compressed
    #[serde(default = "default_compressed")]
    pub compressed: bool,
    #[serde(default)]
    pub compression_level: u32,
    /// Hex SHA-256 of the artifact bytes as written to disk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Wall-clock time taken to produce the artifact, in milliseconds
    #[serde(default)]
    pub duration_ms: u64,
}

fn default_compressed() -> bool {
    true
}

impl BackupRecord {
    /// Build a record from a new backup and the id the store assigned
    pub fn from_new(id: BackupId, new: NewBackup) -> Self {
        Self {
            id,
            filename: new.filename,
            backup_type: new.backup_type,
            size: new.size,
            iv: new.iv,
            compressed: new.compressed,
            compression_level: new.compression_level,
            checksum: new.checksum,
            created_at: new.created_at,
            duration_ms: new.duration_ms,
        }
    }

    /// Whether the artifact was encrypted
    pub fn is_encrypted(&self) -> bool {
        self.iv.is_some()
    }
}

/// A backup record before the metadata store assigns an id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBackup {
    pub filename: String,
    pub backup_type: BackupType,
    pub size: u64,
    pub iv: Option<String>,
    pub compressed: bool,
    pub compression_level: u32,
    pub checksum: Option<String>,
    pub created_at: DateTime<Utc>,
    pub duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_new() -> NewBackup {
        NewBackup {
            filename: "backup-manual-2026-01-01T00-00-00-000000Z-0001.gz".into(),
            backup_type: BackupType::Manual,
            size: 42,
            iv: None,
            compressed: true,
            compression_level: 6,
            checksum: None,
            created_at: Utc::now(),
            duration_ms: 12,
        }
    }

    #[test]
    fn test_backup_type_parse() {
        assert_eq!("auto".parse::<BackupType>().unwrap(), BackupType::Auto);
        assert_eq!("MANUAL".parse::<BackupType>().unwrap(), BackupType::Manual);
        assert!("weekly".parse::<BackupType>().is_err());
    }

    #[test]
    fn test_record_serializes_type_field() {
        let record = BackupRecord::from_new(BackupId::new(), sample_new());
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "manual");
        assert_eq!(json["size"], 42);
        assert!(json.get("iv").is_none());
        assert!(json.get("createdAt").is_some());
    }

    #[test]
    fn test_encrypted_flag_follows_iv() {
        let mut new = sample_new();
        new.iv = Some("AAAAAAAAAAAAAAAA".into());
        let record = BackupRecord::from_new(BackupId::new(), new);
        assert!(record.is_encrypted());
    }
}
