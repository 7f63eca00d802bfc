//! Enumeration delegated to a remote agent

use super::{FileSourceProvider, FileStream, FoundFile};
use crate::config::Settings;
use crate::remote::protocol::{GetRequest, ScanRequest, TeardownRequest};
use crate::remote::RemoteClient;
use crate::types::{FileRecord, ScanMode, ScanTask, SyncError};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Scheme marking a root as remote: `journsync:server/path`
pub const REMOTE_SCHEME: &str = "journsync";

/// A parsed `journsync:server/path` root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRef {
    /// `host[:port]` of the agent
    pub server: String,
    /// Folder on the agent's machine
    pub path: String,
}

impl RemoteRef {
    /// Parse a root; `None` when it is not a remote reference
    pub fn parse(root: &str) -> Option<Self> {
        let prefix_len = REMOTE_SCHEME.len() + 1;
        let head = root.get(..prefix_len)?;
        if !head.eq_ignore_ascii_case(&format!("{}:", REMOTE_SCHEME)) {
            return None;
        }
        let rest = &root[prefix_len..];
        let (server, path) = rest.split_once('/')?;
        if server.is_empty() {
            return None;
        }
        Some(Self {
            server: server.to_string(),
            path: path.to_string(),
        })
    }

    /// Whether `root` uses the remote scheme
    pub fn is_remote(root: &str) -> bool {
        Self::parse(root).is_some()
    }

    /// Strip the scheme and server, leaving the agent-side folder
    pub fn local_part(root: &str) -> &str {
        match root.get(..REMOTE_SCHEME.len() + 1) {
            Some(head) if head.eq_ignore_ascii_case(&format!("{}:", REMOTE_SCHEME)) => {
                let rest = &root[REMOTE_SCHEME.len() + 1..];
                rest.split_once('/').map(|(_, path)| path).unwrap_or(rest)
            }
            _ => root,
        }
    }
}

/// Fetches a root's listing from the agent named in it
pub struct RemoteSource {
    timeout: Duration,
    page_size: u32,
}

impl RemoteSource {
    pub fn new(settings: &Settings) -> Self {
        Self {
            timeout: Duration::from_secs(settings.process_timeout_secs.max(1)),
            page_size: settings.file_batch_size.clamp(1, u32::MAX as usize) as u32,
        }
    }
}

/// Pages through a remote session, tearing it down after the last page.
///
/// A stream dropped before the end releases the session on drop.
struct RemotePages {
    client: RemoteClient,
    remote: RemoteRef,
    session: Uuid,
    mode: ScanMode,
    page: u64,
    size: u32,
    buffered: VecDeque<FileRecord>,
    done: bool,
    released: bool,
}

impl RemotePages {
    /// Teardown is attempted at most once per session
    fn teardown(&mut self) -> Result<(), SyncError> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        self.client.teardown(&TeardownRequest {
            session: self.session,
            folder: self.remote.path.clone(),
        })?;
        info!(server = %self.remote.server, session = %self.session, "Remote session released");
        Ok(())
    }

    fn fetch(&mut self) -> Result<(), SyncError> {
        let files = self.client.get(&GetRequest {
            session: self.session,
            page: self.page,
            size: self.size,
            mode: self.mode,
        })?;
        self.page += 1;
        if files.is_empty() {
            self.done = true;
            self.teardown()?;
        }
        self.buffered.extend(files);
        Ok(())
    }
}

impl Iterator for RemotePages {
    type Item = Result<FoundFile, SyncError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.buffered.pop_front() {
                return Some(Ok(FoundFile {
                    path: PathBuf::from(record.path),
                    size: record.size,
                    modified: record.modified,
                }));
            }
            if self.done {
                return None;
            }
            if let Err(e) = self.fetch() {
                self.done = true;
                if let Err(teardown_err) = self.teardown() {
                    warn!(error = %teardown_err, "Failed to release remote session");
                }
                return Some(Err(e));
            }
        }
    }
}

impl Drop for RemotePages {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        debug!(server = %self.remote.server, session = %self.session, "Remote stream dropped early");
        if let Err(e) = self.teardown() {
            warn!(server = %self.remote.server, error = %e, "Failed to release remote session");
        }
    }
}

impl FileSourceProvider for RemoteSource {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn is_supported(&self, root: &str, _use_journal: bool) -> bool {
        RemoteRef::is_remote(root)
    }

    fn init(&mut self, _task: &ScanTask) -> Result<(), SyncError> {
        Ok(())
    }

    fn find<'a>(&'a mut self, task: &ScanTask) -> Result<FileStream<'a>, SyncError> {
        let remote = RemoteRef::parse(&task.root).ok_or_else(|| {
            SyncError::Validation(format!("Not a remote folder: {}", task.root))
        })?;
        let client = RemoteClient::new(&remote.server, self.timeout)?;

        let response = client.scan(&ScanRequest {
            root_folder: remote.path.clone(),
            patterns: task.patterns().patterns().to_vec(),
            rule: task.rule,
            limits: task.raw_limits().to_vec(),
            mode: task.mode,
            use_journal: task.use_journal,
        })?;
        info!(
            server = %remote.server,
            folder = %remote.path,
            files = response.file_count,
            session = %response.session,
            "Remote scan completed"
        );

        Ok(Box::new(RemotePages {
            client,
            remote,
            session: response.session,
            mode: task.mode,
            page: 0,
            size: self.page_size,
            buffered: VecDeque::new(),
            done: false,
            released: false,
        }))
    }
}
