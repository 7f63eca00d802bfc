//! File source providers.
//!
//! Three ways to enumerate a root, tried in a fixed order:
//! 1. [`RemoteSource`] for `journsync:server/path` roots
//! 2. [`JournalSource`] for local NTFS roots when the journal flag is set
//! 3. [`NativeSource`], a plain recursive walk, which always applies

mod journal;
mod native;
mod remote;

pub use journal::{JournalSource, SystemVolumes, VolumeAccess};
pub use native::NativeSource;
pub use remote::{RemoteRef, RemoteSource, REMOTE_SCHEME};

use crate::config::Settings;
use crate::types::{ScanTask, SyncError};
use chrono::{DateTime, Utc};
use std::path::PathBuf;

/// A file produced by a provider.
///
/// `path` is absolute for local providers and already root-relative for remote ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundFile {
    pub path: PathBuf,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

/// Lazy sequence of files found under a root
pub type FileStream<'a> = Box<dyn Iterator<Item = Result<FoundFile, SyncError>> + 'a>;

/// Capability interface shared by every provider
pub trait FileSourceProvider {
    fn name(&self) -> &'static str;

    /// Whether this provider can enumerate `root`
    fn is_supported(&self, root: &str, use_journal: bool) -> bool;

    /// Prepare for `find`; repeated calls for the same task are no-ops
    fn init(&mut self, task: &ScanTask) -> Result<(), SyncError>;

    /// Enumerate the files under the task's root that match its name patterns
    fn find<'a>(&'a mut self, task: &ScanTask) -> Result<FileStream<'a>, SyncError>;
}

/// The fixed set of provider variants
pub enum SourceProvider {
    Remote(RemoteSource),
    Journal(JournalSource),
    Native(NativeSource),
}

impl SourceProvider {
    fn as_provider(&mut self) -> &mut dyn FileSourceProvider {
        match self {
            SourceProvider::Remote(p) => p,
            SourceProvider::Journal(p) => p,
            SourceProvider::Native(p) => p,
        }
    }

    fn as_provider_ref(&self) -> &dyn FileSourceProvider {
        match self {
            SourceProvider::Remote(p) => p,
            SourceProvider::Journal(p) => p,
            SourceProvider::Native(p) => p,
        }
    }
}

impl FileSourceProvider for SourceProvider {
    fn name(&self) -> &'static str {
        self.as_provider_ref().name()
    }

    fn is_supported(&self, root: &str, use_journal: bool) -> bool {
        self.as_provider_ref().is_supported(root, use_journal)
    }

    fn init(&mut self, task: &ScanTask) -> Result<(), SyncError> {
        self.as_provider().init(task)
    }

    fn find<'a>(&'a mut self, task: &ScanTask) -> Result<FileStream<'a>, SyncError> {
        match self {
            SourceProvider::Remote(p) => p.find(task),
            SourceProvider::Journal(p) => p.find(task),
            SourceProvider::Native(p) => p.find(task),
        }
    }
}

/// Providers in priority order, with the plain walk as fallback.
///
/// Built once per run so journal caches never outlive it.
pub struct ProviderSet {
    providers: Vec<SourceProvider>,
    fallback: NativeSource,
}

impl ProviderSet {
    /// Remote, journal and plain walk, in that order
    pub fn standard(settings: &Settings) -> Self {
        Self {
            providers: vec![
                SourceProvider::Remote(RemoteSource::new(settings)),
                SourceProvider::Journal(JournalSource::new(settings)),
            ],
            fallback: NativeSource::new(),
        }
    }

    /// Journal and plain walk only; used by the agent, which never delegates further
    pub fn local(settings: &Settings) -> Self {
        Self {
            providers: vec![SourceProvider::Journal(JournalSource::new(settings))],
            fallback: NativeSource::new(),
        }
    }

    /// Build from an explicit list
    pub fn with_providers(providers: Vec<SourceProvider>) -> Self {
        Self {
            providers,
            fallback: NativeSource::new(),
        }
    }

    /// First provider that supports the root, else the plain walk
    pub fn select(&mut self, root: &str, use_journal: bool) -> &mut dyn FileSourceProvider {
        let chosen = self
            .providers
            .iter()
            .position(|p| p.is_supported(root, use_journal));
        match chosen {
            Some(index) => &mut self.providers[index],
            None => &mut self.fallback,
        }
    }

    /// The plain walk, used when a selected provider turns out to be unavailable
    pub fn fallback(&mut self) -> &mut dyn FileSourceProvider {
        &mut self.fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_roots_select_remote_provider() {
        let mut set = ProviderSet::standard(&Settings::default());
        assert_eq!(set.select("journsync:agent:5000/data", false).name(), "remote");
        assert_eq!(set.select("JOURNSYNC:agent/data", true).name(), "remote");
    }

    #[test]
    fn test_local_roots_fall_back_to_native() {
        let mut set = ProviderSet::standard(&Settings::default());
        assert_eq!(set.select("/srv/data", false).name(), "native");
        // Journal requires the flag and a drive-qualified NTFS root
        assert_eq!(set.select("/srv/data", true).name(), "native");
    }

    #[test]
    fn test_local_set_never_delegates() {
        let mut set = ProviderSet::local(&Settings::default());
        assert_eq!(set.select("journsync:agent/data", false).name(), "native");
    }
}
