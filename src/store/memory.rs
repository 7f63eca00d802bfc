//! In-memory store backend

use super::{is_pending, reject_pending_save, DiffStats, FileStore};
use crate::types::{FileRecord, FileSet, PendingRecord, Rule, SyncError};
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Default)]
struct RecordSet {
    records: Vec<FileRecord>,
    index: HashMap<String, usize>,
}

impl RecordSet {
    fn clear(&mut self) {
        self.records.clear();
        self.index.clear();
    }

    fn insert(&mut self, record: &FileRecord) -> bool {
        let key = record.key();
        if self.index.contains_key(&key) {
            return false;
        }
        self.index.insert(key, self.records.len());
        self.records.push(record.clone());
        true
    }

    fn get(&self, key: &str) -> Option<&FileRecord> {
        self.index.get(key).and_then(|&i| self.records.get(i))
    }
}

/// Hash-map backed store, lost when dropped
#[derive(Debug, Default)]
pub struct MemoryStore {
    source: RecordSet,
    target: RecordSet,
    pending: Vec<PendingRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn set(&self, set: FileSet) -> Option<&RecordSet> {
        match set {
            FileSet::Source => Some(&self.source),
            FileSet::Target => Some(&self.target),
            FileSet::Pending => None,
        }
    }
}

impl FileStore for MemoryStore {
    fn initialize(&mut self) -> Result<(), SyncError> {
        Ok(())
    }

    fn teardown(&mut self) -> Result<(), SyncError> {
        self.source.clear();
        self.target.clear();
        self.pending.clear();
        debug!("Memory store released");
        Ok(())
    }

    fn prepare_set(&mut self, set: FileSet) -> Result<(), SyncError> {
        match set {
            FileSet::Source => self.source.clear(),
            FileSet::Target => self.target.clear(),
            FileSet::Pending => self.pending.clear(),
        }
        Ok(())
    }

    fn save(&mut self, set: FileSet, records: &[FileRecord]) -> Result<usize, SyncError> {
        reject_pending_save(set)?;
        let target = match set {
            FileSet::Source => &mut self.source,
            _ => &mut self.target,
        };
        Ok(records.iter().filter(|r| target.insert(r)).count())
    }

    fn compute_diff(&mut self, rule: Rule) -> Result<DiffStats, SyncError> {
        self.pending.clear();
        let mut stats = DiffStats::default();

        for record in &self.source.records {
            if is_pending(rule, record, self.target.get(&record.key())) {
                let id = self.pending.len() as u64 + 1;
                self.pending.push(PendingRecord::from_record(id, record));
                stats.pending_files += 1;
                stats.pending_bytes += record.size;
            }
        }

        Ok(stats)
    }

    fn pending_page(&self, after_id: u64, limit: usize) -> Result<Vec<PendingRecord>, SyncError> {
        // ids are dense and start at 1
        let start = (after_id as usize).min(self.pending.len());
        Ok(self.pending[start..].iter().take(limit).cloned().collect())
    }

    fn pending_count(&self) -> Result<u64, SyncError> {
        Ok(self.pending.len() as u64)
    }

    fn records_page(&self, set: FileSet, offset: u64, limit: usize) -> Result<Vec<FileRecord>, SyncError> {
        let offset = offset as usize;
        match self.set(set) {
            Some(records) => Ok(records.records.iter().skip(offset).take(limit).cloned().collect()),
            None => Ok(self
                .pending
                .iter()
                .skip(offset)
                .take(limit)
                .map(|p| FileRecord::new(p.path.clone(), p.size, p.modified))
                .collect()),
        }
    }

    fn record_count(&self, set: FileSet) -> Result<u64, SyncError> {
        Ok(match self.set(set) {
            Some(records) => records.records.len() as u64,
            None => self.pending.len() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_first_write_wins_case_insensitively() {
        let mut store = MemoryStore::new();
        let now = Utc::now();
        let saved = store
            .save(
                FileSet::Source,
                &[
                    FileRecord::new("Docs/A.txt", 1, now),
                    FileRecord::new("docs/a.TXT", 2, now),
                ],
            )
            .expect("save");
        assert_eq!(saved, 1);

        let again = store
            .save(FileSet::Source, &[FileRecord::new("DOCS/a.txt", 3, now)])
            .expect("save");
        assert_eq!(again, 0);

        let records = store.records_page(FileSet::Source, 0, 10).expect("page");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].size, 1);
    }

    #[test]
    fn test_saving_pending_is_rejected() {
        let mut store = MemoryStore::new();
        let err = store
            .save(FileSet::Pending, &[FileRecord::new("a", 1, Utc::now())])
            .unwrap_err();
        assert!(err.is_validation_error());
    }

    #[test]
    fn test_pending_ids_restart_on_each_diff() {
        let mut store = MemoryStore::new();
        store
            .save(FileSet::Source, &[FileRecord::new("a", 1, Utc::now())])
            .expect("save");
        store.compute_diff(Rule::Standard).expect("diff");
        store.compute_diff(Rule::Standard).expect("diff");

        let page = store.pending_page(0, 10).expect("page");
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, 1);
    }

    #[test]
    fn test_prepare_set_only_clears_that_set() {
        let mut store = MemoryStore::new();
        let now = Utc::now();
        store.save(FileSet::Source, &[FileRecord::new("a", 1, now)]).expect("save");
        store.save(FileSet::Target, &[FileRecord::new("a", 1, now)]).expect("save");

        store.prepare_set(FileSet::Target).expect("prepare");
        assert_eq!(store.record_count(FileSet::Source).expect("count"), 1);
        assert_eq!(store.record_count(FileSet::Target).expect("count"), 0);
    }
}
