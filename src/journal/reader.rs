//! Journal state queries and full-volume enumeration

use super::record::{decode_record, read_cursor, JournalEntry, CURSOR_LEN};
use crate::types::JournalError;
use tracing::debug;

/// Default enumeration buffer size
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Snapshot of a volume's journal counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JournalState {
    pub journal_id: u64,
    pub first_usn: i64,
    pub next_usn: i64,
    pub lowest_valid_usn: i64,
    pub max_usn: i64,
    pub maximum_size: u64,
    pub allocation_delta: u64,
}

/// Volume-level control calls needed to read the journal.
///
/// Implemented by the Windows volume handle; tests supply in-memory volumes.
pub trait JournalVolume {
    /// Read the current journal counters
    fn query_state(&mut self) -> Result<JournalState, JournalError>;

    /// Create the journal, or adjust it if it already exists
    fn ensure_journal(&mut self, maximum_size: u64, allocation_delta: u64)
        -> Result<(), JournalError>;

    /// Fill `buf` with a resume cursor and the records starting at `start_id`.
    ///
    /// Returns the number of bytes written; zero once the table is exhausted.
    fn enum_chunk(&mut self, start_id: u64, high_usn: i64, buf: &mut [u8])
        -> Result<usize, JournalError>;
}

/// Reads every live entry of one volume
pub struct JournalReader<V: JournalVolume> {
    volume: V,
    buffer_size: usize,
}

impl<V: JournalVolume> JournalReader<V> {
    pub fn new(volume: V) -> Self {
        Self::with_buffer_size(volume, DEFAULT_BUFFER_SIZE)
    }

    pub fn with_buffer_size(volume: V, buffer_size: usize) -> Self {
        Self {
            volume,
            buffer_size: buffer_size.max(CURSOR_LEN),
        }
    }

    pub fn ensure_journal(
        &mut self,
        maximum_size: u64,
        allocation_delta: u64,
    ) -> Result<(), JournalError> {
        self.volume.ensure_journal(maximum_size, allocation_delta)
    }

    pub fn query_state(&mut self) -> Result<JournalState, JournalError> {
        self.volume.query_state()
    }

    /// Lazily enumerate every entry with a sequence number below `state.next_usn`
    pub fn enumerate_all(&mut self, state: &JournalState) -> EntryIter<'_, V> {
        EntryIter {
            volume: &mut self.volume,
            buffer: vec![0u8; self.buffer_size],
            filled: 0,
            offset: 0,
            next_start_id: 0,
            high_usn: state.next_usn,
            calls: 0,
            done: false,
        }
    }
}

/// Lazy sequence of journal entries; reissues the enumeration call as buffers drain
pub struct EntryIter<'a, V: JournalVolume> {
    volume: &'a mut V,
    buffer: Vec<u8>,
    filled: usize,
    offset: usize,
    next_start_id: u64,
    high_usn: i64,
    calls: usize,
    done: bool,
}

impl<V: JournalVolume> EntryIter<'_, V> {
    /// Number of enumeration calls issued so far
    pub fn calls(&self) -> usize {
        self.calls
    }

    fn refill(&mut self) -> Result<bool, JournalError> {
        let written = self
            .volume
            .enum_chunk(self.next_start_id, self.high_usn, &mut self.buffer)?;
        self.calls += 1;

        if written <= CURSOR_LEN {
            debug!(calls = self.calls, "Journal enumeration exhausted");
            return Ok(false);
        }

        let written = written.min(self.buffer.len());
        self.next_start_id = read_cursor(&self.buffer[..written])?;
        self.filled = written;
        self.offset = CURSOR_LEN;
        Ok(true)
    }
}

impl<V: JournalVolume> Iterator for EntryIter<'_, V> {
    type Item = Result<JournalEntry, JournalError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        if self.offset >= self.filled {
            match self.refill() {
                Ok(true) => {}
                Ok(false) => {
                    self.done = true;
                    return None;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }

        match decode_record(&self.buffer[..self.filled], self.offset) {
            Ok((entry, length)) => {
                self.offset += length;
                Some(Ok(entry))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e.into()))
            }
        }
    }
}
