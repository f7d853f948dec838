//! `Ehfa_Entry` node parsing.
//!
//! # Entry Structure (128 bytes)
//! ```text
//! [4 bytes]  next sibling
//! [4 bytes]  previous sibling
//! [4 bytes]  parent
//! [4 bytes]  first child
//! [4 bytes]  data pointer
//! [4 bytes]  data size
//! [64 bytes] name
//! [32 bytes] type name
//! [4 bytes]  modification time
//! ```

use std::io::{Read, Seek};

use encoding_rs::Encoding;
use log::trace;

use crate::hfa::cursor::ByteCursor;
use crate::hfa::types::error::{HfaError, Result};
use crate::hfa::types::models::{Entry, ENTRY_NAME_LEN, ENTRY_TYPE_LEN};

/// Reads the entry stored at `offset`.
///
/// A null offset is rejected with [`HfaError::InvalidOffset`]; callers treat 0
/// as "no link" before getting here.
pub fn read<R: Read + Seek>(
    cursor: &mut ByteCursor<R>,
    offset: u64,
    encoding: &'static Encoding,
) -> Result<Entry> {
    if offset == 0 {
        return Err(HfaError::InvalidOffset { offset });
    }
    cursor.seek(offset)?;

    let next = cursor.read_u32()?;
    let prev = cursor.read_u32()?;
    let parent = cursor.read_u32()?;
    let child = cursor.read_u32()?;
    let data = cursor.read_u32()?;
    let data_size = cursor.read_u32()?;
    let name = cursor.read_fixed_string(ENTRY_NAME_LEN, encoding)?;
    let type_name = cursor.read_fixed_string(ENTRY_TYPE_LEN, encoding)?;
    let mod_time = cursor.read_u32()?;

    trace!(
        "Entry {:#x}: {:?} ({}) next={:#x} child={:#x} data={:#x}+{}",
        offset, name, type_name, next, child, data, data_size
    );

    Ok(Entry {
        offset,
        next,
        prev,
        parent,
        child,
        data,
        data_size,
        name,
        type_name,
        mod_time,
    })
}
