//! Storage layer for contract-vault
//!
//! Atomic file writes, advisory locks, the metadata store for backup and
//! export records, and the two sources a backup snapshots: the state store
//! and the upload tree.

pub mod file_io;
pub mod files;
pub mod lock;
pub mod metadata;
pub mod state;

pub use file_io::{
    partial_path, read_json, remove_file_if_exists, write_bytes_atomic, write_json_atomic,
};
pub use files::FileTree;
pub use lock::{FileLock, LockManager, LockMode, OperationLock};
pub use metadata::{
    BackupQuery, JsonMetadataStore, MemoryMetadataStore, MetadataStore, SortField, SortOrder,
};
pub use state::{FileStateStore, StateStore};
