//! Metadata store for backup and export records
//!
//! The backup subsystem never talks to a database handle directly; it is
//! given a [`MetadataStore`] at construction. Two implementations ship:
//!
//! - [`JsonMetadataStore`]: a JSON file written atomically, safe to share
//!   between processes
//! - [`MemoryMetadataStore`]: in-memory, for tests and embedding

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::file_io::{read_json, write_json_atomic};
use super::lock::{FileLock, LockMode};
use crate::error::{VaultError, VaultResult};
use crate::models::{
    BackupId, BackupRecord, BackupType, ExportId, ExportRecord, NewBackup, NewExport,
};

/// Field to sort backup listings by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    #[default]
    CreatedAt,
    Size,
    Filename,
}

impl std::str::FromStr for SortField {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "created" | "created_at" | "createdat" | "date" => Ok(SortField::CreatedAt),
            "size" => Ok(SortField::Size),
            "name" | "filename" => Ok(SortField::Filename),
            other => Err(VaultError::Validation(format!("Unknown sort field '{}'", other))),
        }
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl std::str::FromStr for SortOrder {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "asc" | "ascending" => Ok(SortOrder::Asc),
            "desc" | "descending" => Ok(SortOrder::Desc),
            other => Err(VaultError::Validation(format!("Unknown sort order '{}'", other))),
        }
    }
}

/// Filter, sort and pagination for backup listings
#[derive(Debug, Clone, Default)]
pub struct BackupQuery {
    pub backup_type: Option<BackupType>,
    /// Only records created strictly before this instant
    pub created_before: Option<DateTime<Utc>>,
    pub sort: SortField,
    pub order: SortOrder,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl BackupQuery {
    /// All backups, newest first
    pub fn all() -> Self {
        Self::default()
    }

    /// Backups of one type, newest first
    pub fn of_type(backup_type: BackupType) -> Self {
        Self {
            backup_type: Some(backup_type),
            ..Self::default()
        }
    }

    pub fn created_before(mut self, cutoff: DateTime<Utc>) -> Self {
        self.created_before = Some(cutoff);
        self
    }

    pub fn sorted(mut self, sort: SortField, order: SortOrder) -> Self {
        self.sort = sort;
        self.order = order;
        self
    }

    pub fn paginate(mut self, limit: Option<usize>, offset: usize) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }

    fn matches(&self, record: &BackupRecord) -> bool {
        self.backup_type.map_or(true, |t| record.backup_type == t)
            && self.created_before.map_or(true, |c| record.created_at < c)
    }

    /// Apply the query to a set of records
    pub fn apply<'a, I>(&self, records: I) -> Vec<BackupRecord>
    where
        I: IntoIterator<Item = &'a BackupRecord>,
    {
        let mut matched: Vec<BackupRecord> = records
            .into_iter()
            .filter(|r| self.matches(r))
            .cloned()
            .collect();

        // Ties broken by filename so paging is stable
        matched.sort_by(|a, b| {
            let primary = match self.sort {
                SortField::CreatedAt => a.created_at.cmp(&b.created_at),
                SortField::Size => a.size.cmp(&b.size),
                SortField::Filename => a.filename.cmp(&b.filename),
            };
            primary.then_with(|| a.filename.cmp(&b.filename))
        });
        if self.order == SortOrder::Desc {
            matched.reverse();
        }

        let page = matched.into_iter().skip(self.offset);
        match self.limit {
            Some(limit) => page.take(limit).collect(),
            None => page.collect(),
        }
    }
}

/// Persistence for backup and export records
///
/// Ids are assigned by the store on create.
pub trait MetadataStore: Send + Sync {
    fn create_backup(&self, new: NewBackup) -> VaultResult<BackupRecord>;
    fn find_backup(&self, id: BackupId) -> VaultResult<Option<BackupRecord>>;
    fn find_backups(&self, query: &BackupQuery) -> VaultResult<Vec<BackupRecord>>;
    /// Delete a backup record; returns whether it existed
    fn delete_backup(&self, id: BackupId) -> VaultResult<bool>;
    /// Sum of `size` over all backup records
    fn sum_backup_sizes(&self) -> VaultResult<u64>;
    fn count_backups(&self) -> VaultResult<usize>;

    fn create_export(&self, new: NewExport) -> VaultResult<ExportRecord>;
    fn find_export(&self, id: ExportId) -> VaultResult<Option<ExportRecord>>;
    /// All export records, newest first
    fn list_exports(&self) -> VaultResult<Vec<ExportRecord>>;
    /// Delete an export record; returns whether it existed
    fn delete_export(&self, id: ExportId) -> VaultResult<bool>;
}

/// The records held by a store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct MetadataData {
    #[serde(default)]
    backups: Vec<BackupRecord>,
    #[serde(default)]
    exports: Vec<ExportRecord>,
}

/// Indexed form of [`MetadataData`]
#[derive(Debug, Default)]
struct MetadataIndex {
    backups: HashMap<BackupId, BackupRecord>,
    exports: HashMap<ExportId, ExportRecord>,
}

impl MetadataIndex {
    fn from_data(data: MetadataData) -> Self {
        Self {
            backups: data.backups.into_iter().map(|b| (b.id, b)).collect(),
            exports: data.exports.into_iter().map(|e| (e.id, e)).collect(),
        }
    }

    fn to_data(&self) -> MetadataData {
        let mut backups: Vec<_> = self.backups.values().cloned().collect();
        backups.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        let mut exports: Vec<_> = self.exports.values().cloned().collect();
        exports.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        MetadataData { backups, exports }
    }

    fn insert_backup(&mut self, new: NewBackup) -> VaultResult<BackupRecord> {
        if self.backups.values().any(|b| {
            b.backup_type == new.backup_type && b.filename == new.filename
        }) {
            return Err(VaultError::Storage(format!(
                "A backup record for {} already exists",
                new.filename
            )));
        }
        let record = BackupRecord::from_new(BackupId::new(), new);
        self.backups.insert(record.id, record.clone());
        Ok(record)
    }

    fn insert_export(&mut self, new: NewExport) -> ExportRecord {
        let record = ExportRecord::from_new(ExportId::new(), new);
        self.exports.insert(record.id, record.clone());
        record
    }

    fn exports_newest_first(&self) -> Vec<ExportRecord> {
        let mut exports: Vec<_> = self.exports.values().cloned().collect();
        exports.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        exports
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> VaultError {
    VaultError::Storage(format!("Metadata lock poisoned: {}", e))
}

/// In-memory metadata store
#[derive(Debug, Default)]
pub struct MemoryMetadataStore {
    index: RwLock<MetadataIndex>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetadataStore for MemoryMetadataStore {
    fn create_backup(&self, new: NewBackup) -> VaultResult<BackupRecord> {
        self.index.write().map_err(poisoned)?.insert_backup(new)
    }

    fn find_backup(&self, id: BackupId) -> VaultResult<Option<BackupRecord>> {
        Ok(self.index.read().map_err(poisoned)?.backups.get(&id).cloned())
    }

    fn find_backups(&self, query: &BackupQuery) -> VaultResult<Vec<BackupRecord>> {
        let index = self.index.read().map_err(poisoned)?;
        Ok(query.apply(index.backups.values()))
    }

    fn delete_backup(&self, id: BackupId) -> VaultResult<bool> {
        Ok(self
            .index
            .write()
            .map_err(poisoned)?
            .backups
            .remove(&id)
            .is_some())
    }

    fn sum_backup_sizes(&self) -> VaultResult<u64> {
        let index = self.index.read().map_err(poisoned)?;
        Ok(index.backups.values().map(|b| b.size).sum())
    }

    fn count_backups(&self) -> VaultResult<usize> {
        Ok(self.index.read().map_err(poisoned)?.backups.len())
    }

    fn create_export(&self, new: NewExport) -> VaultResult<ExportRecord> {
        Ok(self.index.write().map_err(poisoned)?.insert_export(new))
    }

    fn find_export(&self, id: ExportId) -> VaultResult<Option<ExportRecord>> {
        Ok(self.index.read().map_err(poisoned)?.exports.get(&id).cloned())
    }

    fn list_exports(&self) -> VaultResult<Vec<ExportRecord>> {
        Ok(self.index.read().map_err(poisoned)?.exports_newest_first())
    }

    fn delete_export(&self, id: ExportId) -> VaultResult<bool> {
        Ok(self
            .index
            .write()
            .map_err(poisoned)?
            .exports
            .remove(&id)
            .is_some())
    }
}

/// Metadata store backed by a JSON file
///
/// Every read loads the file and every mutation runs load-modify-save while
/// holding an exclusive lock on `{file}.lock`, so separate processes sharing
/// the file don't lose each other's records.
#[derive(Debug)]
pub struct JsonMetadataStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl JsonMetadataStore {
    /// Open (or lazily create) the store at `path`
    pub fn open(path: impl Into<PathBuf>) -> VaultResult<Self> {
        let path = path.into();
        let mut lock_name = path
            .file_name()
            .map(|n| n.to_os_string())
            .ok_or_else(|| {
                VaultError::Config(format!("Invalid metadata path: {}", path.display()))
            })?;
        lock_name.push(".lock");
        let lock_path = path.with_file_name(lock_name);

        let store = Self { path, lock_path };
        // Surface a corrupt file at startup rather than on first use
        store.load()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> VaultResult<MetadataIndex> {
        let data: MetadataData = read_json(&self.path)?;
        Ok(MetadataIndex::from_data(data))
    }

    fn read<T>(&self, f: impl FnOnce(&MetadataIndex) -> T) -> VaultResult<T> {
        let _lock = FileLock::acquire(&self.lock_path, LockMode::Shared)?;
        let index = self.load()?;
        Ok(f(&index))
    }

    fn mutate<T>(
        &self,
        f: impl FnOnce(&mut MetadataIndex) -> VaultResult<(T, bool)>,
    ) -> VaultResult<T> {
        let _lock = FileLock::acquire(&self.lock_path, LockMode::Exclusive)?;
        let mut index = self.load()?;
        let (result, changed) = f(&mut index)?;
        if changed {
            write_json_atomic(&self.path, &index.to_data())?;
        }
        Ok(result)
    }
}

impl MetadataStore for JsonMetadataStore {
    fn create_backup(&self, new: NewBackup) -> VaultResult<BackupRecord> {
        self.mutate(|index| Ok((index.insert_backup(new)?, true)))
    }

    fn find_backup(&self, id: BackupId) -> VaultResult<Option<BackupRecord>> {
        self.read(|index| index.backups.get(&id).cloned())
    }

    fn find_backups(&self, query: &BackupQuery) -> VaultResult<Vec<BackupRecord>> {
        self.read(|index| query.apply(index.backups.values()))
    }

    fn delete_backup(&self, id: BackupId) -> VaultResult<bool> {
        self.mutate(|index| {
            let removed = index.backups.remove(&id).is_some();
            Ok((removed, removed))
        })
    }

    fn sum_backup_sizes(&self) -> VaultResult<u64> {
        self.read(|index| index.backups.values().map(|b| b.size).sum())
    }

    fn count_backups(&self) -> VaultResult<usize> {
        self.read(|index| index.backups.len())
    }

    fn create_export(&self, new: NewExport) -> VaultResult<ExportRecord> {
        self.mutate(|index| Ok((index.insert_export(new), true)))
    }

    fn find_export(&self, id: ExportId) -> VaultResult<Option<ExportRecord>> {
        self.read(|index| index.exports.get(&id).cloned())
    }

    fn list_exports(&self) -> VaultResult<Vec<ExportRecord>> {
        self.read(|index| index.exports_newest_first())
    }

    fn delete_export(&self, id: ExportId) -> VaultResult<bool> {
        self.mutate(|index| {
            let removed = index.exports.remove(&id).is_some();
            Ok((removed, removed))
        })
    }
}
