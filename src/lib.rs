//! contract-vault - backup lifecycle for the contract and license manager
//!
//! This library snapshots the application's state store and uploaded
//! documents into single artifacts, optionally compressed and encrypted,
//! and manages them through restore, export and retention.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - `config`: Paths, settings and the backup directory layout
//! - `error`: Custom error types
//! - `models`: Backup and export records
//! - `storage`: Metadata store, snapshot sources, atomic writes and locks
//! - `crypto`: AES-256-GCM encryption with Argon2id key derivation
//! - `archive`: gzip, snapshot framing, directory archives, export containers
//! - `backup`: Create, restore, export and purge
//! - `audit`: Audit logging system
//! - `display`, `cli`: Terminal output and command handlers for `cvault`
//! - `logging`: tracing subscriber setup
//!
//! # Example
//!
//! ```rust,ignore
//! use contract_vault::backup::BackupService;
//! use contract_vault::config::{Settings, VaultPaths};
//! use contract_vault::models::BackupType;
//!
//! let paths = VaultPaths::new()?;
//! let settings = Settings::load_or_create(&paths)?;
//! let service = BackupService::open(&paths, &settings, None)?;
//! let record = service.create_backup(BackupType::Auto)?;
//! ```

pub mod archive;
pub mod audit;
pub mod backup;
pub mod cli;
pub mod config;
pub mod crypto;
pub mod display;
pub mod error;
pub mod logging;
pub mod models;
pub mod storage;

pub use error::{VaultError, VaultResult};
