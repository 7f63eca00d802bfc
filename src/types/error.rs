//! Error types for journsync

use crate::journal::DecodeError;
use thiserror::Error;

/// Error types for journsync operations
#[derive(Debug, Error)]
pub enum SyncError {
    /// Standard IO error (automatically converted via #[from])
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation error (rules, limits, profiles, folders)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Change journal access or decoding failed
    #[error("Journal error: {0}")]
    Journal(#[from] JournalError),

    /// Persisted record store failure
    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// Remote agent answered with a non-success status
    #[error("Remote {phase} on {server} failed with status {status}: {message}")]
    Remote {
        server: String,
        phase: &'static str,
        status: u16,
        message: String,
    },

    /// Transport-level HTTP failure talking to a remote agent
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Batch generation or execution infrastructure failure
    #[error("Batch error: {0}")]
    Batch(String),
}

impl SyncError {
    /// Check if this error is a validation error
    pub fn is_validation_error(&self) -> bool {
        matches!(self, SyncError::Validation(_) | SyncError::Config(_))
    }

    /// Check if this error means a provider cannot be used and the plain walk should take over
    pub fn is_provider_unavailable(&self) -> bool {
        matches!(self, SyncError::Journal(err) if err.is_unavailable())
    }

    /// Check if this error came from the remote protocol
    pub fn is_remote_error(&self) -> bool {
        matches!(self, SyncError::Remote { .. } | SyncError::Http(_))
    }
}

/// Errors raised while reading a volume's change journal
#[derive(Debug, Error)]
pub enum JournalError {
    /// Volume could not be opened for lack of privilege
    #[error("Access denied opening volume {volume}")]
    AccessDenied { volume: String },

    /// Volume filesystem does not carry a change journal
    #[error("Volume {volume} is {filesystem}, not NTFS")]
    NotSupported { volume: String, filesystem: String },

    /// Journal is not active on the volume (fixable by creating it)
    #[error("No change journal is active on the volume")]
    JournalNotFound,

    /// A volume control call failed
    #[error("{operation} failed with code {code:#x}")]
    Ioctl { operation: &'static str, code: u32 },

    /// A returned record could not be decoded
    #[error("Malformed journal record: {0}")]
    Decode(#[from] DecodeError),

    /// An entry references a parent that was never enumerated
    #[error("Entry {entry_id:#x} references unknown parent {parent_id:#x}")]
    BrokenChain { entry_id: u64, parent_id: u64 },

    /// Parent chain loops back onto itself
    #[error("Parent chain of entry {entry_id:#x} is cyclic")]
    CyclicChain { entry_id: u64 },

    /// This build has no journal support
    #[error("Change journal access is only available on Windows")]
    Unsupported,
}

impl JournalError {
    /// Whether the journal provider should be treated as unavailable
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            JournalError::AccessDenied { .. }
                | JournalError::NotSupported { .. }
                | JournalError::Unsupported
        )
    }
}
