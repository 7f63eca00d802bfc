//! Bounds-checked decoder for version 2 change journal records.
//!
//! Layout (little endian):
//!
//! | offset | size | field                 |
//! |--------|------|-----------------------|
//! | 0      | 4    | record length         |
//! | 4      | 2    | major version         |
//! | 8      | 8    | entry id              |
//! | 16     | 8    | parent entry id       |
//! | 24     | 8    | record sequence (usn) |
//! | 40     | 4    | reason flags          |
//! | 52     | 4    | file attributes       |
//! | 56     | 2    | name length (bytes)   |
//! | 58     | 2    | name offset           |
//! | 60..   |      | UTF-16 name           |
//!
//! An enumeration buffer starts with an 8-byte resume cursor followed by
//! back-to-back records.

use thiserror::Error;

/// Smallest possible record: the fixed header with an empty name
pub const MIN_RECORD_LEN: usize = 60;

/// Size of the resume cursor that prefixes every enumeration buffer
pub const CURSOR_LEN: usize = 8;

/// Attribute bit marking a directory
pub const FILE_ATTRIBUTE_DIRECTORY: u32 = 0x10;

const RECORD_VERSION: u16 = 2;

/// Malformed record data
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("buffer truncated at offset {offset}: {needed} more bytes needed")]
    Truncated { offset: usize, needed: usize },

    #[error("record at offset {offset} declares invalid length {length}")]
    BadRecordLength { offset: usize, length: usize },

    #[error("record at offset {offset} has version {version}, expected 2")]
    UnsupportedVersion { offset: usize, version: u16 },

    #[error("name of record at offset {offset} ({name_offset}+{name_length}) exceeds record length {record_length}")]
    NameOutOfBounds {
        offset: usize,
        name_offset: usize,
        name_length: usize,
        record_length: usize,
    },

    #[error("name of record at offset {offset} has odd byte length {name_length}")]
    OddNameLength { offset: usize, name_length: usize },
}

/// One live file or directory reported by the journal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    pub entry_id: u64,
    pub parent_id: u64,
    pub usn: i64,
    pub reason: u32,
    pub attributes: u32,
    pub name: String,
    pub is_folder: bool,
}

/// Decoded contents of one enumeration buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedChunk {
    /// Entry id to resume the enumeration from
    pub next_start_id: u64,
    pub entries: Vec<JournalEntry>,
    /// Total of the record lengths consumed
    pub consumed: usize,
}

fn field<const N: usize>(buf: &[u8], offset: usize) -> Result<[u8; N], DecodeError> {
    let end = offset.checked_add(N).ok_or(DecodeError::Truncated { offset, needed: N })?;
    let bytes = buf.get(offset..end).ok_or(DecodeError::Truncated {
        offset,
        needed: end.saturating_sub(buf.len()),
    })?;
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    Ok(out)
}

fn read_u16(buf: &[u8], offset: usize) -> Result<u16, DecodeError> {
    field::<2>(buf, offset).map(u16::from_le_bytes)
}

fn read_u32(buf: &[u8], offset: usize) -> Result<u32, DecodeError> {
    field::<4>(buf, offset).map(u32::from_le_bytes)
}

fn read_u64(buf: &[u8], offset: usize) -> Result<u64, DecodeError> {
    field::<8>(buf, offset).map(u64::from_le_bytes)
}

/// Read the resume cursor at the head of an enumeration buffer
pub fn read_cursor(buf: &[u8]) -> Result<u64, DecodeError> {
    read_u64(buf, 0)
}

/// Decode the record starting at `offset`, returning it with its declared length.
///
/// Nothing beyond `offset + length` is ever read.
pub fn decode_record(buf: &[u8], offset: usize) -> Result<(JournalEntry, usize), DecodeError> {
    let length = read_u32(buf, offset)? as usize;
    let available = buf.len().saturating_sub(offset);

    if length < MIN_RECORD_LEN {
        return Err(DecodeError::BadRecordLength { offset, length });
    }
    if length > available {
        return Err(DecodeError::Truncated {
            offset,
            needed: length - available,
        });
    }

    let record = &buf[offset..offset + length];

    let version = read_u16(record, 4)?;
    if version != RECORD_VERSION {
        return Err(DecodeError::UnsupportedVersion { offset, version });
    }

    let entry_id = read_u64(record, 8)?;
    let parent_id = read_u64(record, 16)?;
    let usn = read_u64(record, 24)? as i64;
    let reason = read_u32(record, 40)?;
    let attributes = read_u32(record, 52)?;
    let name_length = read_u16(record, 56)? as usize;
    let name_offset = read_u16(record, 58)? as usize;

    if name_length % 2 != 0 {
        return Err(DecodeError::OddNameLength {
            offset,
            name_length,
        });
    }
    if name_offset < MIN_RECORD_LEN || name_offset + name_length > length {
        return Err(DecodeError::NameOutOfBounds {
            offset,
            name_offset,
            name_length,
            record_length: length,
        });
    }

    let units: Vec<u16> = record[name_offset..name_offset + name_length]
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();

    let entry = JournalEntry {
        entry_id,
        parent_id,
        usn,
        reason,
        attributes,
        name: String::from_utf16_lossy(&units),
        is_folder: attributes & FILE_ATTRIBUTE_DIRECTORY != 0,
    };

    Ok((entry, length))
}

/// Decode a whole enumeration buffer (cursor + records)
pub fn decode_chunk(buf: &[u8]) -> Result<DecodedChunk, DecodeError> {
    let next_start_id = read_cursor(buf)?;
    let mut entries = Vec::new();
    let mut offset = CURSOR_LEN;

    while offset < buf.len() {
        let (entry, length) = decode_record(buf, offset)?;
        entries.push(entry);
        offset += length;
    }

    Ok(DecodedChunk {
        next_start_id,
        entries,
        consumed: offset - CURSOR_LEN,
    })
}

/// Encode a record in the on-disk layout.
///
/// Used by tests and the in-memory volume to fabricate enumeration buffers.
pub fn encode_record(entry: &JournalEntry) -> Vec<u8> {
    let name: Vec<u8> = entry
        .name
        .encode_utf16()
        .flat_map(|unit| unit.to_le_bytes())
        .collect();
    let unpadded = MIN_RECORD_LEN + name.len();
    let length = (unpadded + 7) & !7;

    let mut out = vec![0u8; length];
    out[0..4].copy_from_slice(&(length as u32).to_le_bytes());
    out[4..6].copy_from_slice(&RECORD_VERSION.to_le_bytes());
    out[8..16].copy_from_slice(&entry.entry_id.to_le_bytes());
    out[16..24].copy_from_slice(&entry.parent_id.to_le_bytes());
    out[24..32].copy_from_slice(&entry.usn.to_le_bytes());
    out[40..44].copy_from_slice(&entry.reason.to_le_bytes());
    out[52..56].copy_from_slice(&entry.attributes.to_le_bytes());
    out[56..58].copy_from_slice(&(name.len() as u16).to_le_bytes());
    out[58..60].copy_from_slice(&(MIN_RECORD_LEN as u16).to_le_bytes());
    out[MIN_RECORD_LEN..unpadded].copy_from_slice(&name);
    out
}
