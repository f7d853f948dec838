//! Core data structures for HFA format components.
//!
//! This module defines the fundamental types used throughout the library:
//! - File header and header record
//! - Tree entries
//! - Byte order and open options

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use encoding_rs::{Encoding, WINDOWS_1252};

/// Signature stored in the first 16 bytes of every HFA file.
pub const HEADER_TAG: &[u8; 16] = b"EHFA_HEADER_TAG\0";

/// Size of the header tag block: signature plus the header record pointer.
pub const HEADER_TAG_LEN: u64 = 20;

/// On-disk size of an `Ehfa_Entry` node.
pub const ENTRY_LEN: u64 = 128;

/// Width of the entry `name` field.
pub const ENTRY_NAME_LEN: usize = 64;

/// Width of the entry `type` field.
pub const ENTRY_TYPE_LEN: usize = 32;

/// Byte order used for every multi-byte field in the file.
///
/// The format is defined big-endian; files written on little-endian hosts by
/// Imagine itself use `Little`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endianness {
    #[default]
    Big,
    Little,
}

impl Endianness {
    pub fn read_u16(self, buf: &[u8]) -> u16 {
        match self {
            Endianness::Big => BigEndian::read_u16(buf),
            Endianness::Little => LittleEndian::read_u16(buf),
        }
    }

    pub fn read_i16(self, buf: &[u8]) -> i16 {
        match self {
            Endianness::Big => BigEndian::read_i16(buf),
            Endianness::Little => LittleEndian::read_i16(buf),
        }
    }

    pub fn read_u32(self, buf: &[u8]) -> u32 {
        match self {
            Endianness::Big => BigEndian::read_u32(buf),
            Endianness::Little => LittleEndian::read_u32(buf),
        }
    }

    pub fn read_i32(self, buf: &[u8]) -> i32 {
        match self {
            Endianness::Big => BigEndian::read_i32(buf),
            Endianness::Little => LittleEndian::read_i32(buf),
        }
    }

    pub fn read_f32(self, buf: &[u8]) -> f32 {
        match self {
            Endianness::Big => BigEndian::read_f32(buf),
            Endianness::Little => LittleEndian::read_f32(buf),
        }
    }

    pub fn read_f64(self, buf: &[u8]) -> f64 {
        match self {
            Endianness::Big => BigEndian::read_f64(buf),
            Endianness::Little => LittleEndian::read_f64(buf),
        }
    }
}

impl std::fmt::Display for Endianness {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Endianness::Big => write!(f, "big-endian"),
            Endianness::Little => write!(f, "little-endian"),
        }
    }
}

/// Options controlling how a file is opened and interpreted.
#[derive(Debug, Clone)]
pub struct OpenOptions {
    /// Byte order of all multi-byte fields.
    pub endianness: Endianness,
    /// Encoding of names, dictionary text and string fields.
    pub encoding: &'static Encoding,
    /// Number of vertices used to approximate an ellipse annotation.
    pub ellipse_segments: usize,
    /// Deepest entry nesting accepted before the tree is treated as corrupt.
    pub max_depth: usize,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            endianness: Endianness::Big,
            encoding: WINDOWS_1252,
            ellipse_segments: 72,
            max_depth: 256,
        }
    }
}

impl OpenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn endianness(mut self, endianness: Endianness) -> Self {
        self.endianness = endianness;
        self
    }

    /// Sets the text encoding from a label such as `"latin1"` or `"utf-8"`.
    /// Unknown labels leave the current encoding untouched.
    pub fn encoding_label(mut self, label: &str) -> Self {
        self.encoding = crate::hfa::utils::parse_encoding(label).unwrap_or(self.encoding);
        self
    }

    pub fn ellipse_segments(mut self, segments: usize) -> Self {
        self.ellipse_segments = segments.max(4);
        self
    }

    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }
}

/// The `Ehfa_File` header record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderRecord {
    pub version: u32,
    pub free_list: u32,
    pub root_entry: u32,
    pub entry_header_length: u16,
    pub dictionary: u32,
}

/// Parsed file header: tag pointer plus the header record it points to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HfaHeader {
    /// Offset of the header record, as stored after the signature.
    pub header_offset: u32,
    pub record: HeaderRecord,
}

/// A single node of the entry tree (`Ehfa_Entry`).
///
/// Entries are read-only views; links are absolute file offsets with 0 meaning
/// "no link".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// File offset this entry was read from.
    pub offset: u64,
    pub next: u32,
    pub prev: u32,
    pub parent: u32,
    pub child: u32,
    pub data: u32,
    pub data_size: u32,
    pub name: String,
    pub type_name: String,
    pub mod_time: u32,
}

impl Entry {
    pub fn has_children(&self) -> bool {
        self.child != 0
    }

    pub fn has_data(&self) -> bool {
        self.data != 0 && self.data_size != 0
    }
}
