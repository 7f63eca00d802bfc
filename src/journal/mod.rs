//! NTFS change journal access.
//!
//! The journal doubles as an index of every live file on a volume, so a full
//! listing can be pulled from it without walking directories:
//! - `record`: decoder for the raw enumeration buffers
//! - `reader`: journal state and lazy enumeration over a [`JournalVolume`]
//! - `resolve`: entry id → path resolution through parent chains
//! - `windows`: the real volume handle (Windows only)

mod reader;
mod record;
mod resolve;
#[cfg(windows)]
mod windows;

pub use reader::{EntryIter, JournalReader, JournalState, JournalVolume, DEFAULT_BUFFER_SIZE};
pub use record::{
    decode_chunk, decode_record, encode_record, DecodeError, DecodedChunk, JournalEntry,
    CURSOR_LEN, FILE_ATTRIBUTE_DIRECTORY, MIN_RECORD_LEN,
};
pub use resolve::{resolve_entries, PathResolver, ResolvedEntry, VOLUME_ROOT_ID};

#[cfg(test)]
pub(crate) use reader::tests::MemoryVolume;

use crate::types::JournalError;
use tracing::{debug, info};

/// Filesystem type that carries a change journal
pub const JOURNAL_FILESYSTEM: &str = "NTFS";

/// Drive (`C:`) holding a local root, if the root is drive-qualified
pub fn volume_of(root: &str) -> Option<String> {
    let mut chars = root.chars();
    let letter = chars.next()?;
    if letter.is_ascii_alphabetic() && chars.next() == Some(':') {
        Some(format!("{}:", letter.to_ascii_uppercase()))
    } else {
        None
    }
}

/// Ensure the journal exists, then enumerate and resolve every entry of `volume`
pub fn snapshot<V: JournalVolume>(
    volume: V,
    maximum_size: u64,
    allocation_delta: u64,
) -> Result<Vec<ResolvedEntry>, JournalError> {
    let mut reader = JournalReader::new(volume);
    reader.ensure_journal(maximum_size, allocation_delta)?;
    let state = reader.query_state()?;
    debug!(
        journal_id = state.journal_id,
        next_usn = state.next_usn,
        "Journal state queried"
    );

    let entries = resolve_entries(reader.enumerate_all(&state), VOLUME_ROOT_ID)?;
    info!(entries = entries.len(), "Journal enumeration resolved");
    Ok(entries)
}

#[cfg(windows)]
pub use self::windows::WindowsVolume;

/// Open a volume's journal for reading
#[cfg(windows)]
pub fn open_volume(volume: &str) -> Result<WindowsVolume, JournalError> {
    WindowsVolume::open(volume)
}

/// Whether this process may read raw volumes
#[cfg(windows)]
pub fn is_elevated() -> bool {
    self::windows::is_elevated()
}

/// Filesystem name of a volume such as `C:`
#[cfg(windows)]
pub fn filesystem_name(volume: &str) -> Option<String> {
    self::windows::filesystem_name(volume)
}

/// Volumes cannot be opened on this platform
#[cfg(not(windows))]
pub fn open_volume(_volume: &str) -> Result<UnsupportedVolume, JournalError> {
    Err(JournalError::Unsupported)
}

#[cfg(not(windows))]
pub fn is_elevated() -> bool {
    false
}

#[cfg(not(windows))]
pub fn filesystem_name(_volume: &str) -> Option<String> {
    None
}

/// Placeholder volume type for platforms without a change journal
#[cfg(not(windows))]
pub struct UnsupportedVolume;

#[cfg(not(windows))]
impl JournalVolume for UnsupportedVolume {
    fn query_state(&mut self) -> Result<JournalState, JournalError> {
        Err(JournalError::Unsupported)
    }

    fn ensure_journal(&mut self, _maximum_size: u64, _allocation_delta: u64) -> Result<(), JournalError> {
        Err(JournalError::Unsupported)
    }

    fn enum_chunk(&mut self, _start_id: u64, _high_usn: i64, _buf: &mut [u8]) -> Result<usize, JournalError> {
        Err(JournalError::Unsupported)
    }
}
