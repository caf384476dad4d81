//! Settings for contract-vault
//!
//! Backup location, compression, encryption, retention and source paths.
//! Persisted as JSON in the base directory; every field has a default so a
//! partial file loads cleanly. Selected values can be overridden from the
//! environment.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::paths::{BackupLayout, VaultPaths};
use super::size::parse_size;
use crate::crypto::{EncryptionAlgorithm, KeyDerivationParams};
use crate::error::{VaultError, VaultResult};

/// Where backups are written and how the type directories are named
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupLocation {
    /// Base storage path; defaults to `backups/` under the base directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_path: Option<PathBuf>,
    pub auto_dir: String,
    pub manual_dir: String,
    pub temp_dir: String,
}

impl Default for BackupLocation {
    fn default() -> Self {
        Self {
            base_path: None,
            auto_dir: "auto".into(),
            manual_dir: "manual".into(),
            temp_dir: "temp".into(),
        }
    }
}

/// Compression settings for new backups
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionSettings {
    pub enabled: bool,
    /// gzip level, 0-9
    pub level: u32,
}

impl Default for CompressionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            level: 6,
        }
    }
}

/// Encryption settings
///
/// The secret itself is never stored here; only the key derivation
/// parameters (salt and costs) are.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EncryptionSettings {
    pub enabled: bool,
    pub algorithm: EncryptionAlgorithm,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_params: Option<KeyDerivationParams>,
}

/// Retention policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionSettings {
    /// Auto backups older than this many days are purged
    pub auto_retention_days: u32,
    /// Number of most recent manual backups to keep
    pub manual_retention_count: usize,
    /// Exports older than this many hours are purged from the staging area
    pub export_retention_hours: u32,
}

impl Default for RetentionSettings {
    fn default() -> Self {
        Self {
            auto_retention_days: 30,
            manual_retention_count: 10,
            export_retention_hours: 24,
        }
    }
}

/// What gets backed up
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    /// State store file; defaults to `data/contracts.db` under the base directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_store: Option<PathBuf>,
    /// Upload tree; defaults to `uploads/` under the base directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploads_dir: Option<PathBuf>,
    /// Case-insensitive glob patterns skipped when archiving uploads
    pub ignore_patterns: Vec<String>,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            state_store: None,
            uploads_dir: None,
            ignore_patterns: vec![".DS_Store".into(), "Thumbs.db".into(), "*.tmp".into()],
        }
    }
}

/// Settings for contract-vault
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Schema version for migration support
    pub schema_version: u32,
    pub backup: BackupLocation,
    pub compression: CompressionSettings,
    pub encryption: EncryptionSettings,
    pub retention: RetentionSettings,
    /// Minimum free space to leave on the backup volume, e.g. `"100MB"`
    pub min_free_space: String,
    pub sources: SourceSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            schema_version: 1,
            backup: BackupLocation::default(),
            compression: CompressionSettings::default(),
            encryption: EncryptionSettings::default(),
            retention: RetentionSettings::default(),
            min_free_space: "100MB".into(),
            sources: SourceSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from disk, or default settings if the file doesn't exist
    pub fn load_or_create(paths: &VaultPaths) -> VaultResult<Self> {
        let settings_path = paths.settings_file();

        if settings_path.exists() {
            let contents = std::fs::read_to_string(&settings_path)
                .map_err(|e| VaultError::Io(format!("Failed to read settings file: {}", e)))?;

            let settings: Settings = serde_json::from_str(&contents).map_err(|e| {
                VaultError::Config(format!("Failed to parse settings file: {}", e))
            })?;

            Ok(settings)
        } else {
            // Don't save yet - let caller decide when to persist
            Ok(Settings::default())
        }
    }

    /// Save settings to disk
    pub fn save(&self, paths: &VaultPaths) -> VaultResult<()> {
        paths.ensure_directories()?;
        crate::storage::write_json_atomic(paths.settings_file(), self)
    }

    /// Apply environment overrides
    ///
    /// `lookup` resolves a variable name to its value; pass
    /// `|k| std::env::var(k).ok()` for the process environment.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> VaultResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("CVAULT_BACKUP_PATH") {
            self.backup.base_path = Some(PathBuf::from(path));
        }
        if let Some(level) = lookup("CVAULT_COMPRESSION_LEVEL") {
            self.compression.level = parse_env_number("CVAULT_COMPRESSION_LEVEL", &level)?;
        }
        if let Some(enabled) = lookup("CVAULT_ENCRYPTION_ENABLED") {
            self.encryption.enabled = parse_env_bool("CVAULT_ENCRYPTION_ENABLED", &enabled)?;
        }
        if let Some(days) = lookup("CVAULT_AUTO_RETENTION_DAYS") {
            self.retention.auto_retention_days =
                parse_env_number("CVAULT_AUTO_RETENTION_DAYS", &days)?;
        }
        if let Some(count) = lookup("CVAULT_MANUAL_RETENTION_COUNT") {
            self.retention.manual_retention_count =
                parse_env_number("CVAULT_MANUAL_RETENTION_COUNT", &count)?;
        }
        if let Some(size) = lookup("CVAULT_MIN_FREE_SPACE") {
            self.min_free_space = size;
        }
        Ok(())
    }

    /// Check values that serde can't
    pub fn validate(&self) -> VaultResult<()> {
        if self.compression.level > 9 {
            return Err(VaultError::Config(format!(
                "Compression level must be between 0 and 9, got {}",
                self.compression.level
            )));
        }
        if self.retention.manual_retention_count == 0 {
            return Err(VaultError::Config(
                "Manual retention count must keep at least one backup".into(),
            ));
        }
        let names = [
            &self.backup.auto_dir,
            &self.backup.manual_dir,
            &self.backup.temp_dir,
        ];
        for name in names {
            if name.is_empty() || name.contains(['/', '\\']) || name == "locks" {
                return Err(VaultError::Config(format!(
                    "Invalid backup subdirectory name '{}'",
                    name
                )));
            }
        }
        if names[0] == names[1] || names[0] == names[2] || names[1] == names[2] {
            return Err(VaultError::Config(
                "Backup subdirectory names must be distinct".into(),
            ));
        }
        self.min_free_space_bytes()?;
        Ok(())
    }

    /// Minimum free space threshold in bytes
    pub fn min_free_space_bytes(&self) -> VaultResult<u64> {
        parse_size(&self.min_free_space).map_err(|e| {
            VaultError::Config(format!("Invalid min_free_space setting: {}", e))
        })
    }

    /// Resolve the backup directory layout
    pub fn layout(&self, paths: &VaultPaths) -> BackupLayout {
        let root = self
            .backup
            .base_path
            .clone()
            .unwrap_or_else(|| paths.default_backup_dir());
        BackupLayout::with_names(
            root,
            self.backup.auto_dir.clone(),
            self.backup.manual_dir.clone(),
            self.backup.temp_dir.clone(),
        )
    }

    /// Resolve the state store path
    pub fn state_store_path(&self, paths: &VaultPaths) -> PathBuf {
        self.sources
            .state_store
            .clone()
            .unwrap_or_else(|| paths.default_state_store())
    }

    /// Resolve the upload tree path
    pub fn uploads_dir(&self, paths: &VaultPaths) -> PathBuf {
        self.sources
            .uploads_dir
            .clone()
            .unwrap_or_else(|| paths.default_uploads_dir())
    }
}

fn parse_env_number<T: std::str::FromStr>(name: &str, value: &str) -> VaultResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| VaultError::Config(format!("{} must be a number, got '{}'", name, value)))
}

fn parse_env_bool(name: &str, value: &str) -> VaultResult<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(VaultError::Config(format!(
            "{} must be true or false, got '{}'",
            name, value
        ))),
    }
}
