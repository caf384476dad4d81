//! Configuration module for contract-vault
//!
//! This module provides configuration management including:
//! - Path resolution and the backup directory layout
//! - Settings persistence with environment overrides
//! - Human-readable size thresholds

pub mod paths;
pub mod settings;
pub mod size;

pub use paths::{BackupLayout, VaultPaths};
pub use settings::Settings;
pub use size::{format_size, parse_size};
