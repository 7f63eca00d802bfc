//! SQLite store backend.
//!
//! Source and Target rows are keyed by the lower-cased path; the diff is a
//! single `INSERT ... SELECT` with a left join from Source to Target.

use super::{reject_pending_save, DiffStats, FileStore, SAVE_CHUNK_SIZE};
use crate::types::{FileRecord, FileSet, PendingRecord, Rule, SyncError};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS SourceFile (
    FileKey      TEXT PRIMARY KEY,
    FileName     TEXT NOT NULL,
    Size         INTEGER NOT NULL,
    ModifiedTime INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS TargetFile (
    FileKey      TEXT PRIMARY KEY,
    FileName     TEXT NOT NULL,
    Size         INTEGER NOT NULL,
    ModifiedTime INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS PendingFile (
    Id           INTEGER PRIMARY KEY AUTOINCREMENT,
    FileName     TEXT NOT NULL,
    Size         INTEGER NOT NULL,
    ModifiedTime INTEGER NOT NULL
);";

const DIFF_QUERY: &str = "
INSERT INTO PendingFile (FileName, Size, ModifiedTime)
SELECT sf.FileName, sf.Size, sf.ModifiedTime
FROM SourceFile sf
LEFT JOIN TargetFile tf ON sf.FileKey = tf.FileKey
WHERE tf.FileKey IS NULL
   OR (?1 = 'standard' AND (sf.Size <> tf.Size OR sf.ModifiedTime <> tf.ModifiedTime))
   OR (?1 = 'newer' AND sf.ModifiedTime > tf.ModifiedTime)
   OR (?1 = 'larger' AND sf.Size > tf.Size)
ORDER BY sf.rowid";

/// Store persisted in a SQLite database
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, SyncError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        let store = SqliteStore { conn };
        store.configure_pragmas()?;
        debug!(path = %path.display(), "Opened SQLite store");
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, SyncError> {
        let conn = Connection::open_in_memory()?;
        let store = SqliteStore { conn };
        store.configure_pragmas()?;
        Ok(store)
    }

    fn configure_pragmas(&self) -> Result<(), SyncError> {
        self.conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;",
        )?;
        Ok(())
    }

    /// How long a statement waits on a locked database before failing
    pub fn set_command_timeout(&self, timeout: Duration) -> Result<(), SyncError> {
        self.conn.busy_timeout(timeout)?;
        Ok(())
    }

    fn table(set: FileSet) -> &'static str {
        match set {
            FileSet::Source => "SourceFile",
            FileSet::Target => "TargetFile",
            FileSet::Pending => "PendingFile",
        }
    }

    fn insert_chunk(&mut self, table: &str, chunk: &[FileRecord]) -> Result<usize, SyncError> {
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare_cached(&format!(
                "INSERT OR IGNORE INTO {} (FileKey, FileName, Size, ModifiedTime) VALUES (?1, ?2, ?3, ?4)",
                table
            ))?;
            for record in chunk {
                inserted += stmt.execute(params![
                    record.key(),
                    record.path,
                    record.size as i64,
                    record.modified.timestamp_micros()
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }
}

fn micros_to_time(micros: i64, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            column,
            Type::Integer,
            format!("timestamp {} is out of range", micros).into(),
        )
    })
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<FileRecord> {
    let path: String = row.get(0)?;
    let size: i64 = row.get(1)?;
    let modified: i64 = row.get(2)?;
    Ok(FileRecord::new(path, size.max(0) as u64, micros_to_time(modified, 2)?))
}

impl FileStore for SqliteStore {
    fn initialize(&mut self) -> Result<(), SyncError> {
        self.conn.execute_batch(SCHEMA)?;
        debug!("SQLite store schema initialized");
        Ok(())
    }

    fn teardown(&mut self) -> Result<(), SyncError> {
        self.conn.execute_batch(
            "DROP TABLE IF EXISTS SourceFile;
             DROP TABLE IF EXISTS TargetFile;
             DROP TABLE IF EXISTS PendingFile;
             VACUUM;",
        )?;
        debug!("SQLite store released");
        Ok(())
    }

    fn prepare_set(&mut self, set: FileSet) -> Result<(), SyncError> {
        self.conn
            .execute(&format!("DELETE FROM {}", Self::table(set)), [])?;
        if set == FileSet::Pending {
            self.conn
                .execute("DELETE FROM sqlite_sequence WHERE name = 'PendingFile'", [])?;
        }
        Ok(())
    }

    fn save(&mut self, set: FileSet, records: &[FileRecord]) -> Result<usize, SyncError> {
        reject_pending_save(set)?;
        let table = Self::table(set);
        let mut inserted = 0;
        for chunk in records.chunks(SAVE_CHUNK_SIZE) {
            inserted += self.insert_chunk(table, chunk)?;
        }
        debug!(set = %set, received = records.len(), inserted, "Saved records");
        Ok(inserted)
    }

    fn compute_diff(&mut self, rule: Rule) -> Result<DiffStats, SyncError> {
        self.prepare_set(FileSet::Pending)?;
        self.conn.execute(DIFF_QUERY, params![rule.as_str()])?;

        let (files, bytes): (i64, i64) = self.conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(Size), 0) FROM PendingFile",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(DiffStats {
            pending_files: files as u64,
            pending_bytes: bytes as u64,
        })
    }

    fn pending_page(&self, after_id: u64, limit: usize) -> Result<Vec<PendingRecord>, SyncError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT Id, FileName, Size, ModifiedTime FROM PendingFile WHERE Id > ?1 ORDER BY Id LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![after_id as i64, limit as i64], |row| {
            let id: i64 = row.get(0)?;
            let path: String = row.get(1)?;
            let size: i64 = row.get(2)?;
            let modified: i64 = row.get(3)?;
            Ok(PendingRecord {
                id: id as u64,
                path,
                size: size.max(0) as u64,
                modified: micros_to_time(modified, 3)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn pending_count(&self) -> Result<u64, SyncError> {
        self.record_count(FileSet::Pending)
    }

    fn records_page(&self, set: FileSet, offset: u64, limit: usize) -> Result<Vec<FileRecord>, SyncError> {
        let order = if set == FileSet::Pending { "Id" } else { "rowid" };
        let mut stmt = self.conn.prepare(&format!(
            "SELECT FileName, Size, ModifiedTime FROM {} ORDER BY {} LIMIT ?1 OFFSET ?2",
            Self::table(set),
            order
        ))?;
        let rows = stmt.query_map(params![limit as i64, offset as i64], row_to_record)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn record_count(&self, set: FileSet) -> Result<u64, SyncError> {
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", Self::table(set)),
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}
