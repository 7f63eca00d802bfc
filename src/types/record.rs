//! FileRecord - Metadata row for one file in a scanned tree

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents one file in the Source or Target set
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileRecord {
    /// Path relative to the scanned root, `/`-separated
    pub path: String,

    /// File size in bytes
    pub size: u64,

    /// Last modification time (UTC, microsecond precision)
    pub modified: DateTime<Utc>,
}

impl FileRecord {
    /// Create a new record, normalising separators and timestamp precision
    pub fn new(path: impl Into<String>, size: u64, modified: DateTime<Utc>) -> Self {
        Self {
            path: normalize_relative_path(&path.into()),
            size,
            modified: modified.trunc_subsecs(6),
        }
    }

    /// Case-insensitive key identifying this record within a set
    pub fn key(&self) -> String {
        record_key(&self.path)
    }
}

/// Lower-cased lookup key for a relative path
pub fn record_key(path: &str) -> String {
    path.to_lowercase()
}

fn normalize_relative_path(path: &str) -> String {
    let unified = if std::path::MAIN_SEPARATOR != '/' {
        path.replace(std::path::MAIN_SEPARATOR, "/")
    } else {
        path.to_string()
    };
    unified.trim_start_matches('/').to_string()
}

/// A source record selected for copying, with its pagination cursor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingRecord {
    /// Monotonic id within a run
    pub id: u64,
    pub path: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

impl PendingRecord {
    pub fn from_record(id: u64, record: &FileRecord) -> Self {
        Self {
            id,
            path: record.path.clone(),
            size: record.size,
            modified: record.modified,
        }
    }
}

/// Logical record set held by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileSet {
    Source,
    Target,
    Pending,
}

impl FileSet {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileSet::Source => "source",
            FileSet::Target => "target",
            FileSet::Pending => "pending",
        }
    }
}

impl fmt::Display for FileSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_new_record_truncates_to_microseconds() {
        let modified = Utc
            .timestamp_opt(1_700_000_000, 123_456_789)
            .single()
            .expect("valid timestamp");
        let record = FileRecord::new("docs/a.txt", 10, modified);

        assert_eq!(record.modified.timestamp_subsec_nanos(), 123_456_000);
        assert_eq!(record.size, 10);
    }

    #[test]
    fn test_key_is_lower_case() {
        let record = FileRecord::new("Docs/README.TXT", 1, Utc::now());
        assert_eq!(record.key(), "docs/readme.txt");
    }

    #[test]
    fn test_leading_separator_is_stripped() {
        let record = FileRecord::new("/nested/file.bin", 1, Utc::now());
        assert_eq!(record.path, "nested/file.bin");
    }

    #[test]
    fn test_pending_from_record_copies_fields() {
        let record = FileRecord::new("x/y.txt", 42, Utc::now());
        let pending = PendingRecord::from_record(7, &record);
        assert_eq!(pending.id, 7);
        assert_eq!(pending.path, record.path);
        assert_eq!(pending.size, 42);
        assert_eq!(pending.modified, record.modified);
    }

    #[test]
    fn test_record_serialization() {
        let record = FileRecord::new("a.txt", 10, Utc::now());
        let json = serde_json::to_string(&record).expect("serialize");
        let back: FileRecord = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(record, back);
    }

    #[test]
    fn test_file_set_wire_names() {
        assert_eq!(
            serde_json::to_string(&FileSet::Target).expect("serialize"),
            "\"target\""
        );
        assert_eq!(FileSet::Source.to_string(), "source");
    }
}
