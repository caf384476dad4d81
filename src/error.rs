//! Custom error types for contract-vault
//!
//! This module defines the error hierarchy for the backup subsystem using
//! thiserror for ergonomic error definitions.

use std::fmt;

use thiserror::Error;

/// The step of a restore that failed
///
/// Restore is not transactional: the state store is restored first, then the
/// file tree. Reporting the step tells the operator what is already live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreStep {
    /// Reading, verifying or decoding the artifact (nothing applied yet)
    Decode,
    /// Overwriting the live state store
    StateStore,
    /// Replacing the live upload tree
    FileTree,
}

impl fmt::Display for RestoreStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestoreStep::Decode => write!(f, "decode"),
            RestoreStep::StateStore => write!(f, "state store"),
            RestoreStep::FileTree => write!(f, "file tree"),
        }
    }
}

/// The main error type for contract-vault operations
#[derive(Error, Debug)]
pub enum VaultError {
    /// Requested backup or export does not exist
    #[error("{entity_type} not found: {identifier}")]
    NotFound {
        entity_type: &'static str,
        identifier: String,
    },

    /// The state store or file tree could not be read at backup time
    #[error("Snapshot error: {0}")]
    Snapshot(String),

    /// Size mismatch, failed decryption or failed decompression
    #[error("Integrity error: {0}")]
    Integrity(String),

    /// Malformed container during decode
    #[error("Corrupt archive: {0}")]
    CorruptArchive(String),

    /// Missing key, bad settings, missing or unwritable base path
    #[error("Configuration error: {0}")]
    Config(String),

    /// Not enough free space to write a new artifact
    #[error("Storage full: {available} bytes available, {required} bytes required")]
    StorageFull { available: u64, required: u64 },

    /// Restore failed partway through
    #[error("Restore failed during {step} step: {message}")]
    Restore { step: RestoreStep, message: String },

    /// Encryption errors not caused by bad data
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Export packaging errors
    #[error("Export error: {0}")]
    Export(String),

    /// Metadata store errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Advisory lock errors
    #[error("Lock error: {0}")]
    Lock(String),

    /// Operation cancelled by the caller or its deadline
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(String),

    /// Validation errors for inputs and settings values
    #[error("Validation error: {0}")]
    Validation(String),
}

impl VaultError {
    /// Create a "not found" error for backups
    pub fn backup_not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: "Backup",
            identifier: identifier.into(),
        }
    }

    /// Create a "not found" error for exports
    pub fn export_not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: "Export",
            identifier: identifier.into(),
        }
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this error means the artifact can't be trusted
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::Integrity(_) | Self::CorruptArchive(_))
    }

    /// HTTP-equivalent status for callers exposing these operations remotely
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound { .. } => 404,
            Self::Integrity(_) | Self::CorruptArchive(_) | Self::Validation(_) => 422,
            Self::Restore { .. } | Self::Lock(_) => 409,
            Self::Cancelled(_) => 499,
            _ => 500,
        }
    }
}

impl From<std::io::Error> for VaultError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

/// Result type alias for contract-vault operations
pub type VaultResult<T> = Result<T, VaultError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = VaultError::Config("missing key".into());
        assert_eq!(err.to_string(), "Configuration error: missing key");
    }

    #[test]
    fn test_not_found_error() {
        let err = VaultError::backup_not_found("bak-12345678");
        assert_eq!(err.to_string(), "Backup not found: bak-12345678");
        assert!(err.is_not_found());
        assert_eq!(err.status_code(), 404);
    }

    #[test]
    fn test_restore_step_in_message() {
        let err = VaultError::Restore {
            step: RestoreStep::FileTree,
            message: "permission denied".into(),
        };
        assert_eq!(
            err.to_string(),
            "Restore failed during file tree step: permission denied"
        );
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(VaultError::Integrity("x".into()).status_code(), 422);
        assert_eq!(VaultError::CorruptArchive("x".into()).status_code(), 422);
        assert_eq!(
            VaultError::StorageFull {
                available: 1,
                required: 2
            }
            .status_code(),
            500
        );
        assert!(VaultError::CorruptArchive("x".into()).is_corruption());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: VaultError = io_err.into();
        assert!(matches!(err, VaultError::Io(_)));
    }
}
