//! Core type definitions for journsync

mod error;
mod record;
mod task;

pub use error::{JournalError, SyncError};
pub use record::{record_key, FileRecord, FileSet, PendingRecord};
pub use task::{Profile, Rule, ScanMode, ScanTask, SyncTask};
