//! Path management for contract-vault
//!
//! Resolves where configuration, metadata, audit log and the default backup
//! sources live, and how the backup directory tree is laid out.
//!
//! ## Path Resolution Order
//!
//! 1. `CVAULT_DATA_DIR` environment variable (if set)
//! 2. The platform configuration directory for `contract-vault`
//!    (`~/.config/contract-vault` on Linux)

use std::path::{Path, PathBuf};

use directories::ProjectDirs;

use crate::error::{VaultError, VaultResult};
use crate::models::{BackupRecord, BackupType};

/// Manages all paths used by contract-vault
#[derive(Debug, Clone)]
pub struct VaultPaths {
    /// Base directory for all contract-vault data
    base_dir: PathBuf,
}

impl VaultPaths {
    /// Create a new VaultPaths instance
    ///
    /// # Errors
    ///
    /// Returns an error if no platform configuration directory can be found.
    pub fn new() -> VaultResult<Self> {
        let base_dir = if let Ok(custom) = std::env::var("CVAULT_DATA_DIR") {
            PathBuf::from(custom)
        } else {
            ProjectDirs::from("", "", "contract-vault")
                .map(|dirs| dirs.config_dir().to_path_buf())
                .ok_or_else(|| {
                    VaultError::Config("Could not determine a configuration directory".into())
                })?
        };

        Ok(Self { base_dir })
    }

    /// Create VaultPaths with a custom base directory (useful for testing)
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Settings file (`config.json`)
    pub fn settings_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Metadata store file holding backup and export records
    pub fn metadata_file(&self) -> PathBuf {
        self.base_dir.join("metadata.json")
    }

    /// Append-only audit log
    pub fn audit_log(&self) -> PathBuf {
        self.base_dir.join("audit.log")
    }

    /// Default location of the application's state store
    pub fn default_state_store(&self) -> PathBuf {
        self.base_dir.join("data").join("contracts.db")
    }

    /// Default location of uploaded contract documents
    pub fn default_uploads_dir(&self) -> PathBuf {
        self.base_dir.join("uploads")
    }

    /// Default backup base path
    pub fn default_backup_dir(&self) -> PathBuf {
        self.base_dir.join("backups")
    }

    /// Ensure the base directory exists
    pub fn ensure_directories(&self) -> VaultResult<()> {
        std::fs::create_dir_all(&self.base_dir)
            .map_err(|e| VaultError::Io(format!("Failed to create base directory: {}", e)))
    }

    /// Check if contract-vault has been initialized (config file exists)
    pub fn is_initialized(&self) -> bool {
        self.settings_file().exists()
    }
}

/// On-disk layout of the backup tree
///
/// ```text
/// {root}/{auto}/backup-auto-...
/// {root}/{manual}/backup-manual-...
/// {root}/{temp}/export-...
/// {root}/locks/{global,auto,manual}.lock
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupLayout {
    root: PathBuf,
    auto_dir: String,
    manual_dir: String,
    temp_dir: String,
}

impl BackupLayout {
    /// Layout with the default subdirectory names
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_names(root, "auto", "manual", "temp")
    }

    /// Layout with custom subdirectory names
    pub fn with_names(
        root: impl Into<PathBuf>,
        auto_dir: impl Into<String>,
        manual_dir: impl Into<String>,
        temp_dir: impl Into<String>,
    ) -> Self {
        Self {
            root: root.into(),
            auto_dir: auto_dir.into(),
            manual_dir: manual_dir.into(),
            temp_dir: temp_dir.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding backups of the given type
    pub fn type_dir(&self, backup_type: BackupType) -> PathBuf {
        match backup_type {
            BackupType::Auto => self.root.join(&self.auto_dir),
            BackupType::Manual => self.root.join(&self.manual_dir),
        }
    }

    /// Export staging directory
    pub fn temp_dir(&self) -> PathBuf {
        self.root.join(&self.temp_dir)
    }

    /// Directory holding advisory lock files
    pub fn locks_dir(&self) -> PathBuf {
        self.root.join("locks")
    }

    /// Full path of a backup artifact
    pub fn artifact_path(&self, record: &BackupRecord) -> PathBuf {
        self.type_dir(record.backup_type).join(&record.filename)
    }

    /// Create every directory of the layout
    ///
    /// Fails with a configuration error when the base path can't be created,
    /// since nothing else can work without it.
    pub fn ensure_directories(&self) -> VaultResult<()> {
        let dirs = [
            self.root.clone(),
            self.type_dir(BackupType::Auto),
            self.type_dir(BackupType::Manual),
            self.temp_dir(),
            self.locks_dir(),
        ];
        for dir in &dirs {
            std::fs::create_dir_all(dir).map_err(|e| {
                VaultError::Config(format!(
                    "Backup path {} is not writable: {}",
                    dir.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_custom_base_dir() {
        let temp_dir = TempDir::new().unwrap();
        let paths = VaultPaths::with_base_dir(temp_dir.path().to_path_buf());

        assert_eq!(paths.base_dir(), temp_dir.path());
        assert_eq!(paths.settings_file(), temp_dir.path().join("config.json"));
        assert_eq!(
            paths.default_state_store(),
            temp_dir.path().join("data").join("contracts.db")
        );
    }

    #[test]
    fn test_layout_directories() {
        let temp_dir = TempDir::new().unwrap();
        let layout = BackupLayout::new(temp_dir.path().join("backups"));
        layout.ensure_directories().unwrap();

        assert!(layout.type_dir(BackupType::Auto).ends_with("auto"));
        assert!(layout.type_dir(BackupType::Manual).exists());
        assert!(layout.temp_dir().exists());
        assert!(layout.locks_dir().exists());
    }

    #[test]
    fn test_layout_custom_names() {
        let layout = BackupLayout::with_names("/srv/backups", "scheduled", "operator", "staging");
        assert_eq!(
            layout.type_dir(BackupType::Auto),
            PathBuf::from("/srv/backups/scheduled")
        );
        assert_eq!(layout.temp_dir(), PathBuf::from("/srv/backups/staging"));
    }

    #[test]
    fn test_unwritable_base_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("not-a-dir");
        std::fs::write(&file, b"x").unwrap();

        let layout = BackupLayout::new(file.join("backups"));
        let err = layout.ensure_directories().unwrap_err();
        assert!(matches!(err, VaultError::Config(_)));
    }
}
