//! Record store and diff engine.
//!
//! A store holds three logical sets keyed by lower-cased relative path:
//! Source and Target (filled by scans) and Pending (filled by the diff).
//! Two backends share the [`FileStore`] contract:
//! - [`MemoryStore`]: hash maps, diff as one pass over Source
//! - [`SqliteStore`]: tables, diff as one set-based query

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::types::{FileRecord, FileSet, PendingRecord, Rule, SyncError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Records written per underlying insert transaction
pub const SAVE_CHUNK_SIZE: usize = 1000;

/// Summary of a diff computation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffStats {
    pub pending_files: u64,
    pub pending_bytes: u64,
}

/// Logical contract shared by every store backend
pub trait FileStore: Send {
    /// Create backing structures; safe to call repeatedly
    fn initialize(&mut self) -> Result<(), SyncError>;

    /// Release every set and its backing structures
    fn teardown(&mut self) -> Result<(), SyncError>;

    /// Empty one set
    fn prepare_set(&mut self, set: FileSet) -> Result<(), SyncError>;

    /// Insert records into Source or Target; the first record for a key wins.
    ///
    /// Returns how many records were newly stored.
    fn save(&mut self, set: FileSet, records: &[FileRecord]) -> Result<usize, SyncError>;

    /// Rebuild Pending from Source and Target under `rule`
    fn compute_diff(&mut self, rule: Rule) -> Result<DiffStats, SyncError>;

    /// Pending records with `id > after_id`, in id order
    fn pending_page(&self, after_id: u64, limit: usize) -> Result<Vec<PendingRecord>, SyncError>;

    fn pending_count(&self) -> Result<u64, SyncError>;

    /// Records of a set in insertion order, skipping `offset`
    fn records_page(&self, set: FileSet, offset: u64, limit: usize) -> Result<Vec<FileRecord>, SyncError>;

    fn record_count(&self, set: FileSet) -> Result<u64, SyncError>;
}

/// Storage backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    Memory,
    Sqlite,
}

/// Open the configured backend
pub fn open_store(
    kind: StorageKind,
    database: &Path,
    command_timeout: Duration,
) -> Result<Box<dyn FileStore>, SyncError> {
    match kind {
        StorageKind::Memory => Ok(Box::new(MemoryStore::new())),
        StorageKind::Sqlite => {
            let store = SqliteStore::open(database)?;
            store.set_command_timeout(command_timeout)?;
            Ok(Box::new(store))
        }
    }
}

/// Whether `source` belongs in Pending given its Target counterpart
pub fn is_pending(rule: Rule, source: &FileRecord, target: Option<&FileRecord>) -> bool {
    let Some(target) = target else {
        return true;
    };
    match rule {
        Rule::Standard => source.size != target.size || source.modified != target.modified,
        Rule::Newer => source.modified > target.modified,
        Rule::Larger => source.size > target.size,
    }
}

fn reject_pending_save(set: FileSet) -> Result<(), SyncError> {
    if set == FileSet::Pending {
        return Err(SyncError::Validation(
            "Pending records are produced by the diff and cannot be saved directly".to_string(),
        ));
    }
    Ok(())
}
