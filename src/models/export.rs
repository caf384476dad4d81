//! Export record model
//!
//! An export is a portable packaging of an existing backup. Exports are
//! dependent records: they reference their source backup but are not deleted
//! with it.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{BackupId, ExportId};
use crate::error::VaultError;

/// Container format for an export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExportFormat {
    /// The stored artifact as-is (optionally gzip wrapped)
    Raw,
    /// Zip archive with the artifact and a metadata sidecar
    Zip,
    /// Gzipped tar archive with the artifact and a metadata sidecar
    Tar,
    /// Self-describing JSON envelope carrying base64 ciphertext
    EncryptedJson,
}

impl ExportFormat {
    /// All supported formats
    pub const ALL: [ExportFormat; 4] = [
        ExportFormat::Raw,
        ExportFormat::Zip,
        ExportFormat::Tar,
        ExportFormat::EncryptedJson,
    ];

    /// File extension appended to export filenames
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Raw => "raw",
            ExportFormat::Zip => "zip",
            ExportFormat::Tar => "tar.gz",
            ExportFormat::EncryptedJson => "json",
        }
    }

    /// Whether the container carries a metadata document
    pub fn supports_metadata(&self) -> bool {
        !matches!(self, ExportFormat::Raw)
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFormat::Raw => write!(f, "raw"),
            ExportFormat::Zip => write!(f, "zip"),
            ExportFormat::Tar => write!(f, "tar"),
            ExportFormat::EncryptedJson => write!(f, "encrypted-json"),
        }
    }
}

impl FromStr for ExportFormat {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "raw" => Ok(ExportFormat::Raw),
            "zip" => Ok(ExportFormat::Zip),
            "tar" | "tar.gz" | "tgz" => Ok(ExportFormat::Tar),
            "encrypted-json" | "json" | "envelope" => Ok(ExportFormat::EncryptedJson),
            other => Err(VaultError::Validation(format!(
                "Unknown export format '{}': expected raw, zip, tar or encrypted-json",
                other
            ))),
        }
    }
}

/// Persisted metadata for one export artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRecord {
    pub id: ExportId,
    pub backup_id: BackupId,
    pub filename: String,
    pub format: ExportFormat,
    pub size: u64,
    pub compression_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression_level: Option<u32>,
    pub includes_metadata: bool,
    pub created_at: DateTime<Utc>,
}

impl ExportRecord {
    /// Build a record from a new export and the id the store assigned
    pub fn from_new(id: ExportId, new: NewExport) -> Self {
        Self {
            id,
            backup_id: new.backup_id,
            filename: new.filename,
            format: new.format,
            size: new.size,
            compression_enabled: new.compression_level.is_some(),
            compression_level: new.compression_level,
            includes_metadata: new.includes_metadata,
            created_at: new.created_at,
        }
    }
}

/// An export record before the metadata store assigns an id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewExport {
    pub backup_id: BackupId,
    pub filename: String,
    pub format: ExportFormat,
    pub size: u64,
    pub compression_level: Option<u32>,
    pub includes_metadata: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parse_aliases() {
        assert_eq!("tgz".parse::<ExportFormat>().unwrap(), ExportFormat::Tar);
        assert_eq!(
            "json".parse::<ExportFormat>().unwrap(),
            ExportFormat::EncryptedJson
        );
        assert!("rar".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn test_format_serde_names() {
        let json = serde_json::to_string(&ExportFormat::EncryptedJson).unwrap();
        assert_eq!(json, "\"encrypted-json\"");
    }

    #[test]
    fn test_compression_flag_follows_level() {
        let record = ExportRecord::from_new(
            ExportId::new(),
            NewExport {
                backup_id: BackupId::new(),
                filename: "export.zip".into(),
                format: ExportFormat::Zip,
                size: 10,
                compression_level: Some(9),
                includes_metadata: true,
                created_at: Utc::now(),
            },
        );
        assert!(record.compression_enabled);
    }
}
