//! Scan coordinator: provider → filters → batched store writes

use crate::provider::{FileSourceProvider, FoundFile, ProviderSet, RemoteRef};
use crate::store::FileStore;
use crate::types::{FileRecord, FileSet, ScanTask, SyncError};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Drives one scan pass into the store
pub struct ScanCoordinator<'a> {
    store: &'a mut dyn FileStore,
    providers: &'a mut ProviderSet,
    batch_size: usize,
    operation_delay: Duration,
}

impl<'a> ScanCoordinator<'a> {
    pub fn new(
        store: &'a mut dyn FileStore,
        providers: &'a mut ProviderSet,
        batch_size: usize,
        operation_delay: Duration,
    ) -> Self {
        Self {
            store,
            providers,
            batch_size: batch_size.max(1),
            operation_delay,
        }
    }

    /// Scan `task.root` into the set matching `task.mode`.
    ///
    /// Returns the number of records stored. A missing local root is created
    /// and counts as empty.
    pub fn scan(&mut self, task: &ScanTask) -> Result<u64, SyncError> {
        let set = task.mode.file_set();
        let started = Instant::now();
        self.store.prepare_set(set)?;

        let is_remote = RemoteRef::is_remote(&task.root);
        if !is_remote && !Path::new(&task.root).exists() {
            std::fs::create_dir_all(&task.root)?;
            info!(root = %task.root, mode = %task.mode, "Created missing folder, nothing to scan");
            return Ok(0);
        }

        let use_fallback = {
            let provider = self.providers.select(&task.root, task.use_journal);
            match provider.init(task) {
                Ok(()) => false,
                Err(e) if e.is_provider_unavailable() => {
                    warn!(provider = provider.name(), error = %e, "Provider unavailable, using plain walk");
                    true
                }
                Err(e) => return Err(e),
            }
        };
        let provider: &mut dyn FileSourceProvider = if use_fallback {
            let fallback = self.providers.fallback();
            fallback.init(task)?;
            fallback
        } else {
            self.providers.select(&task.root, task.use_journal)
        };

        info!(
            root = %task.root,
            mode = %task.mode,
            provider = provider.name(),
            "Scanning"
        );

        let mut batch: Vec<FileRecord> = Vec::with_capacity(self.batch_size);
        let mut stored = 0u64;
        let mut skipped = 0u64;

        for found in provider.find(task)? {
            let found = found?;
            if !task.limits().matches(found.size, found.modified) {
                skipped += 1;
                continue;
            }
            batch.push(to_record(&task.root, found));

            if batch.len() >= self.batch_size {
                stored += flush(&mut *self.store, set, &mut batch, self.operation_delay)?;
            }
        }
        stored += flush(&mut *self.store, set, &mut batch, self.operation_delay)?;

        info!(
            root = %task.root,
            mode = %task.mode,
            files = stored,
            skipped_by_limits = skipped,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Scan finished"
        );
        Ok(stored)
    }
}

fn flush(
    store: &mut dyn FileStore,
    set: FileSet,
    batch: &mut Vec<FileRecord>,
    delay: Duration,
) -> Result<u64, SyncError> {
    if batch.is_empty() {
        return Ok(0);
    }
    let saved = store.save(set, batch)? as u64;
    debug!(set = %set, batch = batch.len(), saved, "Flushed scan batch");
    batch.clear();
    if !delay.is_zero() {
        std::thread::sleep(delay);
    }
    Ok(saved)
}

fn to_record(root: &str, found: FoundFile) -> FileRecord {
    let relative = relative_path(root, &found.path);
    FileRecord::new(relative, found.size, found.modified)
}

/// Path of `path` under `root`, compared without regard to case.
///
/// Relative paths (remote listings) are returned unchanged.
pub fn relative_path(root: &str, path: &Path) -> String {
    if let Ok(stripped) = path.strip_prefix(root) {
        return stripped.to_string_lossy().into_owned();
    }

    let full = path.to_string_lossy();
    let trimmed_root = root.trim_end_matches(['/', '\\']);
    if trimmed_root.is_empty() {
        return full.into_owned();
    }
    let stripped = match (full.get(..trimmed_root.len()), full.get(trimmed_root.len()..)) {
        (Some(head), Some(rest))
            if head.eq_ignore_ascii_case(trimmed_root)
                && (rest.is_empty() || rest.starts_with(['/', '\\'])) =>
        {
            Some(rest.trim_start_matches(['/', '\\']).to_string())
        }
        _ => None,
    };
    stripped.unwrap_or_else(|| full.into_owned())
}
