//! Shared dependencies of the backup components

use std::sync::Arc;

use crate::config::{BackupLayout, Settings};
use crate::crypto::BackupCipher;
use crate::error::VaultResult;
use crate::storage::{FileTree, LockManager, MetadataStore, StateStore};

/// Behaviour knobs resolved from settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupPolicy {
    pub compression_enabled: bool,
    pub compression_level: u32,
    pub encryption_enabled: bool,
    pub auto_retention_days: u32,
    pub manual_retention_count: usize,
    pub export_retention_hours: u32,
    /// Free bytes that must remain on the backup volume after a write
    pub min_free_space: u64,
}

impl Default for BackupPolicy {
    fn default() -> Self {
        Self {
            compression_enabled: true,
            compression_level: 6,
            encryption_enabled: false,
            auto_retention_days: 30,
            manual_retention_count: 10,
            export_retention_hours: 24,
            min_free_space: 100 * 1024 * 1024,
        }
    }
}

impl BackupPolicy {
    pub fn from_settings(settings: &Settings) -> VaultResult<Self> {
        settings.validate()?;
        Ok(Self {
            compression_enabled: settings.compression.enabled,
            compression_level: settings.compression.level,
            encryption_enabled: settings.encryption.enabled,
            auto_retention_days: settings.retention.auto_retention_days,
            manual_retention_count: settings.retention.manual_retention_count,
            export_retention_hours: settings.retention.export_retention_hours,
            min_free_space: settings.min_free_space_bytes()?,
        })
    }
}

/// Everything the backup components need, passed in explicitly
pub struct BackupContext {
    pub layout: BackupLayout,
    pub policy: BackupPolicy,
    pub metadata: Arc<dyn MetadataStore>,
    pub state: Arc<dyn StateStore>,
    pub files: FileTree,
    pub cipher: BackupCipher,
    pub locks: LockManager,
}

impl BackupContext {
    pub fn new(
        layout: BackupLayout,
        policy: BackupPolicy,
        metadata: Arc<dyn MetadataStore>,
        state: Arc<dyn StateStore>,
        files: FileTree,
        cipher: BackupCipher,
    ) -> Self {
        let locks = LockManager::new(layout.locks_dir());
        Self {
            layout,
            policy,
            metadata,
            state,
            files,
            cipher,
            locks,
        }
    }
}

impl std::fmt::Debug for BackupContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupContext")
            .field("layout", &self.layout)
            .field("policy", &self.policy)
            .field("state", &self.state.describe())
            .field("files", &self.files)
            .field("cipher", &self.cipher)
            .finish()
    }
}
