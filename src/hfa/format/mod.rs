//! File format parsing layer for HFA files.
//!
//! This module provides the mid-level parsing layer that bridges between
//! the [`ByteCursor`](crate::hfa::cursor::ByteCursor) and the high-level
//! [`HfaReader`](crate::hfa::reader::HfaReader).
//!
//! # Module Organization
//!
//! - [`header`]: Verifies the signature and reads the `Ehfa_File` record
//! - [`dictionary`]: Parses the embedded type dictionary
//! - [`entry`]: Reads `Ehfa_Entry` tree nodes
//! - [`record`]: Decodes entry data blocks against the dictionary
//!
//! # Architecture
//!
//! ```text
//! File Structure:
//! ┌─────────────────┐
//! │  Header Tag     │ ← header::parse()
//! │  Ehfa_File      │
//! ├─────────────────┤
//! │  Entry nodes    │ ← entry::read()
//! │  (tree linked   │
//! │   by offsets)   │
//! ├─────────────────┤
//! │  Data blocks    │ ← record::RecordDecoder
//! ├─────────────────┤
//! │  Dictionary     │ ← dictionary::read()
//! └─────────────────┘
//! ```

pub mod dictionary;
pub mod entry;
pub mod header;
pub mod record;
