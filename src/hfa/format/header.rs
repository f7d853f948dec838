//! HFA file header parsing.
//!
//! This module handles:
//! - Verifying the `EHFA_HEADER_TAG` signature
//! - Following the header pointer to the `Ehfa_File` record
//! - Sanity-checking the root entry and dictionary pointers

use std::io::{Read, Seek};
use log::{debug, info, trace, warn};

use crate::hfa::cursor::ByteCursor;
use crate::hfa::types::{
    error::{HfaError, Result},
    models::{HeaderRecord, HfaHeader, ENTRY_LEN, HEADER_TAG, HEADER_TAG_LEN},
};

/// Parses the header tag and header record from the start of the file.
///
/// # Header Structure
/// ```text
/// [16 bytes] "EHFA_HEADER_TAG\0"
/// [4 bytes]  Offset of the Ehfa_File record
///
/// Ehfa_File:
/// [4 bytes]  version
/// [4 bytes]  free list pointer
/// [4 bytes]  root entry pointer
/// [2 bytes]  entry header length
/// [4 bytes]  dictionary pointer
/// ```
///
/// The signature is checked before anything else is read; a mismatch fails
/// with [`HfaError::InvalidSignature`].
pub fn parse<R: Read + Seek>(cursor: &mut ByteCursor<R>) -> Result<HfaHeader> {
    info!("Parsing HFA header ({})", cursor.endianness());

    // Step 1: Signature
    cursor.seek(0)?;
    if cursor.len() < HEADER_TAG.len() as u64 {
        return Err(HfaError::InvalidSignature {
            offset: 0,
            found: String::new(),
        });
    }
    let tag = cursor.read_bytes(HEADER_TAG.len())?;
    if tag.as_slice() != HEADER_TAG.as_slice() {
        return Err(HfaError::InvalidSignature {
            offset: 0,
            found: String::from_utf8_lossy(&tag).trim_end_matches('\0').to_string(),
        });
    }

    // Step 2: Header record pointer
    let header_offset = cursor.read_u32()?;
    trace!("Header record pointer: {:#x}", header_offset);
    if (header_offset as u64) < HEADER_TAG_LEN {
        warn!(
            "Header record pointer {:#x} overlaps the header tag",
            header_offset
        );
    }

    // Step 3: Header record
    cursor.seek(header_offset as u64)?;
    let record = HeaderRecord {
        version: cursor.read_u32()?,
        free_list: cursor.read_u32()?,
        root_entry: cursor.read_u32()?,
        entry_header_length: cursor.read_u16()?,
        dictionary: cursor.read_u32()?,
    };
    debug!(
        "Ehfa_File: version={}, root={:#x}, dictionary={:#x}, entry header length={}",
        record.version, record.root_entry, record.dictionary, record.entry_header_length
    );

    // Step 4: Validate pointers
    if record.dictionary == 0 || record.dictionary as u64 >= cursor.len() {
        return Err(HfaError::InvalidOffset {
            offset: record.dictionary as u64,
        });
    }
    if record.root_entry == 0 || record.root_entry as u64 + ENTRY_LEN > cursor.len() {
        return Err(HfaError::InvalidOffset {
            offset: record.root_entry as u64,
        });
    }
    if record.entry_header_length as u64 != ENTRY_LEN {
        warn!(
            "Unexpected entry header length {} (expected {})",
            record.entry_header_length, ENTRY_LEN
        );
    }

    Ok(HfaHeader {
        header_offset,
        record,
    })
}
