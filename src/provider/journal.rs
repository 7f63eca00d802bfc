//! Journal-backed enumeration with a per-volume cache

use super::{FileSourceProvider, FileStream, FoundFile};
use crate::config::Settings;
use crate::journal::{self, ResolvedEntry, JOURNAL_FILESYSTEM};
use crate::types::{JournalError, ScanTask, SyncError};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Access to volume journals, abstracted for tests
pub trait VolumeAccess: Send {
    /// Whether `volume` can be read through its journal
    fn is_available(&self, volume: &str) -> bool;

    /// Full resolved listing of `volume`
    fn snapshot(
        &self,
        volume: &str,
        maximum_size: u64,
        allocation_delta: u64,
    ) -> Result<Vec<ResolvedEntry>, JournalError>;
}

/// The machine's real volumes
#[derive(Debug, Default)]
pub struct SystemVolumes;

impl VolumeAccess for SystemVolumes {
    fn is_available(&self, volume: &str) -> bool {
        journal::is_elevated()
            && journal::filesystem_name(volume)
                .is_some_and(|fs| fs.eq_ignore_ascii_case(JOURNAL_FILESYSTEM))
    }

    fn snapshot(
        &self,
        volume: &str,
        maximum_size: u64,
        allocation_delta: u64,
    ) -> Result<Vec<ResolvedEntry>, JournalError> {
        let handle = journal::open_volume(volume)?;
        journal::snapshot(handle, maximum_size, allocation_delta)
    }
}

/// Enumerates local roots from a cached journal listing of their volume
pub struct JournalSource {
    access: Box<dyn VolumeAccess>,
    maximum_size: u64,
    allocation_delta: u64,
    /// Volume → files on it (absolute paths)
    cache: HashMap<String, Vec<PathBuf>>,
}

impl JournalSource {
    pub fn new(settings: &Settings) -> Self {
        Self::with_access(settings, Box::new(SystemVolumes))
    }

    pub fn with_access(settings: &Settings, access: Box<dyn VolumeAccess>) -> Self {
        Self {
            access,
            maximum_size: settings.journal_max_size,
            allocation_delta: settings.journal_allocation_delta,
            cache: HashMap::new(),
        }
    }

    fn volume_for(task: &ScanTask) -> Result<String, SyncError> {
        journal::volume_of(&task.root).ok_or_else(|| {
            SyncError::Journal(JournalError::NotSupported {
                volume: task.root.clone(),
                filesystem: "non-drive path".to_string(),
            })
        })
    }
}

/// Lower-cased root with a single trailing separator, for prefix tests
fn folder_prefix(root: &str) -> String {
    let trimmed = root.trim_end_matches(['\\', '/']);
    format!("{}{}", trimmed, std::path::MAIN_SEPARATOR).to_lowercase()
}

fn stat(path: &Path) -> Result<Option<FoundFile>, SyncError> {
    let metadata = match std::fs::metadata(path) {
        Ok(m) => m,
        // Removed since the journal snapshot
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(SyncError::Io(e)),
    };
    if !metadata.is_file() {
        return Ok(None);
    }
    Ok(Some(FoundFile {
        path: path.to_path_buf(),
        size: metadata.len(),
        modified: DateTime::<Utc>::from(metadata.modified()?),
    }))
}

impl FileSourceProvider for JournalSource {
    fn name(&self) -> &'static str {
        "journal"
    }

    fn is_supported(&self, root: &str, use_journal: bool) -> bool {
        use_journal
            && journal::volume_of(root).is_some_and(|volume| self.access.is_available(&volume))
    }

    fn init(&mut self, task: &ScanTask) -> Result<(), SyncError> {
        let volume = Self::volume_for(task)?;
        if self.cache.contains_key(&volume) {
            debug!(volume = %volume, "Journal listing already cached");
            return Ok(());
        }

        let entries = self
            .access
            .snapshot(&volume, self.maximum_size, self.allocation_delta)?;
        let volume_root = PathBuf::from(format!("{}{}", volume, std::path::MAIN_SEPARATOR));
        let files: Vec<PathBuf> = entries
            .into_iter()
            .filter(|e| !e.is_folder)
            .map(|e| volume_root.join(e.path))
            .collect();

        info!(volume = %volume, files = files.len(), "Cached journal listing");
        self.cache.insert(volume, files);
        Ok(())
    }

    fn find<'a>(&'a mut self, task: &ScanTask) -> Result<FileStream<'a>, SyncError> {
        let volume = Self::volume_for(task)?;
        if !self.cache.contains_key(&volume) {
            self.init(task)?;
        }
        let files = self.cache.get(&volume).map(Vec::as_slice).unwrap_or_default();

        let prefix = folder_prefix(&task.root);
        let patterns = task.patterns().clone();

        Ok(Box::new(files.iter().filter_map(move |path| {
            let lowered = path.to_string_lossy().to_lowercase();
            if !lowered.starts_with(&prefix) || !patterns.is_path_match(path) {
                return None;
            }
            stat(path).transpose()
        })))
    }
}
