//! Custom error types for the hfa-reader crate.

use thiserror::Error;

/// The primary error type for all operations in this crate.
///
/// Every format-level variant carries the absolute byte offset at which the
/// problem was detected.
#[derive(Debug, Error)]
pub enum HfaError {
    /// An error originating from I/O operations.
    #[error("I/O error: {0:?}")]
    Io(#[from] std::io::Error),

    /// The 16-byte header tag is not `EHFA_HEADER_TAG`.
    #[error("Invalid HFA signature at offset {offset:#x}: found {found:?}")]
    InvalidSignature { offset: u64, found: String },

    /// A read would run past the end of the file.
    #[error("Truncated file: {wanted} byte(s) requested at offset {offset:#x}")]
    TruncatedFile { offset: u64, wanted: u64 },

    /// An offset points outside the file.
    #[error("Invalid offset {offset:#x}")]
    InvalidOffset { offset: u64 },

    /// The embedded type dictionary does not follow the dictionary grammar.
    #[error("Dictionary parse error at offset {offset:#x}: {reason} near {fragment:?}")]
    DictionaryParse {
        offset: u64,
        reason: &'static str,
        fragment: String,
    },

    /// A record references a type name missing from the dictionary.
    #[error("Unknown type {name:?} referenced at offset {offset:#x}")]
    UnknownType { offset: u64, name: String },

    /// An enum field holds an index outside its literal list.
    #[error("Enum index {index} out of range ({count} values) at offset {offset:#x}")]
    EnumRange { offset: u64, index: u16, count: usize },

    /// Decoding a record needs more bytes than its data block provides.
    #[error("Record overrun at offset {offset:#x}: needed {needed} byte(s), {available} available")]
    RecordOverrun {
        offset: u64,
        needed: u64,
        available: u64,
    },

    /// Type nesting exceeded the decoder's depth limit (self-referencing type).
    #[error("Type {name:?} nests too deeply at offset {offset:#x}")]
    NestingTooDeep { offset: u64, name: String },

    /// A geometry record lacks a field its mapping needs.
    #[error("{type_name} record at offset {offset:#x} has no usable {field:?} field")]
    MissingField {
        offset: u64,
        type_name: String,
        field: &'static str,
    },

    /// The entry tree revisits an offset or is deeper than allowed.
    #[error("Corrupt entry tree at offset {offset:#x}")]
    CorruptTree { offset: u64 },

    /// The reader's lock was poisoned by a panic in another thread.
    #[error("Reader lock poisoned")]
    LockPoisoned,
}

impl HfaError {
    /// The byte offset the error refers to, when it has one.
    pub fn offset(&self) -> Option<u64> {
        match self {
            HfaError::InvalidSignature { offset, .. }
            | HfaError::TruncatedFile { offset, .. }
            | HfaError::InvalidOffset { offset }
            | HfaError::DictionaryParse { offset, .. }
            | HfaError::UnknownType { offset, .. }
            | HfaError::EnumRange { offset, .. }
            | HfaError::RecordOverrun { offset, .. }
            | HfaError::NestingTooDeep { offset, .. }
            | HfaError::MissingField { offset, .. }
            | HfaError::CorruptTree { offset } => Some(*offset),
            HfaError::Io(_) | HfaError::LockPoisoned => None,
        }
    }

    /// Errors confined to a single entry or its data block.
    ///
    /// The annotation extractor records these and keeps walking; everything
    /// else aborts the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            HfaError::TruncatedFile { .. }
                | HfaError::InvalidOffset { .. }
                | HfaError::UnknownType { .. }
                | HfaError::EnumRange { .. }
                | HfaError::RecordOverrun { .. }
                | HfaError::NestingTooDeep { .. }
                | HfaError::MissingField { .. }
        )
    }

    /// Bounds errors raised while reading an entry header.
    pub(crate) fn is_out_of_bounds(&self) -> bool {
        matches!(
            self,
            HfaError::TruncatedFile { .. } | HfaError::InvalidOffset { .. }
        )
    }
}

/// A convenience `Result` type alias using the crate's `HfaError` type.
pub type Result<T> = std::result::Result<T, HfaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_and_classification() {
        let overrun = HfaError::RecordOverrun {
            offset: 0x88,
            needed: 16_000,
            available: 16,
        };
        assert_eq!(overrun.offset(), Some(0x88));
        assert!(overrun.is_recoverable());

        assert_eq!(HfaError::LockPoisoned.to_string(), "Reader lock poisoned");
        assert_eq!(HfaError::LockPoisoned.offset(), None);
        assert!(!HfaError::CorruptTree { offset: 0x40 }.is_recoverable());
    }
}
