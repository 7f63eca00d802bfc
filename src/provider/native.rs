//! Plain recursive directory walk

use super::{FileSourceProvider, FileStream, FoundFile};
use crate::types::{ScanTask, SyncError};
use chrono::{DateTime, Utc};
use std::path::Path;

/// Enumerates a local root with the `ignore` walker
#[derive(Debug, Default)]
pub struct NativeSource;

impl NativeSource {
    pub fn new() -> Self {
        Self
    }
}

/// Convert a walker failure into an I/O error, keeping the underlying cause
fn walk_error(error: ignore::Error) -> SyncError {
    let message = error.to_string();
    SyncError::Io(
        error
            .into_io_error()
            .unwrap_or_else(|| std::io::Error::other(message)),
    )
}

/// Walk `root` recursively and yield every regular file whose name passes `task`'s patterns
///
/// # Arguments
/// * `root` - The directory to walk
/// * `task` - Scan task providing the name patterns
///
/// # Errors
/// Unlike a best-effort walk, any traversal or metadata error is yielded and
/// ends the sequence; the caller aborts the scan on it.
fn walk<'a>(root: &Path, task: &ScanTask) -> FileStream<'a> {
    let patterns = task.patterns().clone();
    let walker = ignore::WalkBuilder::new(root)
        .standard_filters(false)
        .hidden(false)
        .follow_links(false)
        .build();

    let mut failed = false;
    Box::new(walker.filter_map(move |result| {
        if failed {
            return None;
        }
        let entry = match result {
            Ok(entry) => entry,
            Err(e) => {
                failed = true;
                return Some(Err(walk_error(e)));
            }
        };

        // Directories, symlinks and special files are not copied
        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            return None;
        }
        if !patterns.is_path_match(entry.path()) {
            return None;
        }

        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(e) => {
                failed = true;
                return Some(Err(walk_error(e)));
            }
        };
        let modified = match metadata.modified() {
            Ok(t) => DateTime::<Utc>::from(t),
            Err(e) => {
                failed = true;
                return Some(Err(SyncError::Io(e)));
            }
        };

        Some(Ok(FoundFile {
            path: entry.into_path(),
            size: metadata.len(),
            modified,
        }))
    }))
}

impl FileSourceProvider for NativeSource {
    fn name(&self) -> &'static str {
        "native"
    }

    fn is_supported(&self, _root: &str, _use_journal: bool) -> bool {
        true
    }

    fn init(&mut self, _task: &ScanTask) -> Result<(), SyncError> {
        Ok(())
    }

    fn find<'a>(&'a mut self, task: &ScanTask) -> Result<FileStream<'a>, SyncError> {
        Ok(walk(Path::new(&task.root), task))
    }
}
