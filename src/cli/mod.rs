//! CLI command handlers
//!
//! This module contains the implementation of CLI commands,
//! bridging the clap argument parsing with the backup service.

pub mod backup;

pub use backup::{handle_backup_command, resolve_backup, resolve_export, BackupCommands};

use crate::config::{Settings, VaultPaths};
use crate::crypto::{KeyDerivationParams, SecureString};
use crate::error::{VaultError, VaultResult};

/// Environment variable holding the encryption passphrase
pub const KEY_ENV: &str = "CVAULT_ENCRYPTION_KEY";

/// Resolve the encryption passphrase
///
/// `--ask-key` prompts on the terminal; otherwise `CVAULT_ENCRYPTION_KEY` is
/// used when set. No secret is fine as long as nothing encrypted is touched.
pub fn resolve_secret(ask_key: bool) -> VaultResult<Option<SecureString>> {
    if ask_key {
        let passphrase = prompt_passphrase("Encryption passphrase: ")?;
        if passphrase.is_empty() {
            return Err(VaultError::Config("Passphrase cannot be empty".into()));
        }
        return Ok(Some(SecureString::new(passphrase)));
    }
    Ok(SecureString::from_env(KEY_ENV))
}

/// Prompt for a passphrase (hidden input)
fn prompt_passphrase(prompt: &str) -> VaultResult<String> {
    rpassword::prompt_password(prompt)
        .map_err(|e| VaultError::Encryption(format!("Failed to read passphrase: {}", e)))
}

/// Write the settings file, generating key derivation parameters
///
/// Existing key parameters are kept: replacing the salt would make every
/// encrypted backup unreadable.
pub fn handle_init(paths: &VaultPaths, settings: &mut Settings) -> VaultResult<bool> {
    let generated = settings.encryption.key_params.is_none();
    if generated {
        settings.encryption.key_params = Some(KeyDerivationParams::new());
    }
    settings.save(paths)?;
    settings.layout(paths).ensure_directories()?;
    Ok(generated)
}

/// Render the effective configuration
pub fn format_config(paths: &VaultPaths, settings: &Settings) -> String {
    let layout = settings.layout(paths);
    let mut output = String::new();
    output.push_str("contract-vault Configuration\n");
    output.push_str("============================\n");
    output.push_str(&format!("Base directory:   {}\n", paths.base_dir().display()));
    output.push_str(&format!("Settings file:    {}\n", paths.settings_file().display()));
    output.push_str(&format!("Metadata file:    {}\n", paths.metadata_file().display()));
    output.push_str(&format!("Audit log:        {}\n", paths.audit_log().display()));
    output.push_str(&format!("Backup directory: {}\n", layout.root().display()));
    output.push_str(&format!(
        "State store:      {}\n",
        settings.state_store_path(paths).display()
    ));
    output.push_str(&format!(
        "Uploads:          {}\n",
        settings.uploads_dir(paths).display()
    ));
    output.push('\n');
    output.push_str("Settings:\n");
    output.push_str(&format!(
        "  Compression:    {}\n",
        if settings.compression.enabled {
            format!("gzip level {}", settings.compression.level)
        } else {
            "disabled".to_string()
        }
    ));
    output.push_str(&format!(
        "  Encryption:     {}\n",
        if settings.encryption.enabled {
            settings.encryption.algorithm.to_string()
        } else {
            "disabled".to_string()
        }
    ));
    output.push_str(&format!(
        "  Retention:      auto {} days, manual {} backups, exports {} hours\n",
        settings.retention.auto_retention_days,
        settings.retention.manual_retention_count,
        settings.retention.export_retention_hours
    ));
    output.push_str(&format!("  Min free space: {}\n", settings.min_free_space));
    output
}
