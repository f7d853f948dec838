//! # hfa-reader
//!
//! A reader for Erdas Imagine Hierarchical File Architecture (HFA) files,
//! chiefly `.ovr` annotation overlays.
//!
//! The reader verifies the file signature, parses the self-describing type
//! dictionary embedded in every file, walks the entry tree and decodes any
//! entry's data block into a dynamically typed [`Record`]. On top of that,
//! annotation shapes and map information are extracted as [`GeometryFeature`]s
//! for a vector writer to consume.
//!
//! ```no_run
//! use hfa_reader::{HfaReader, OpenOptions, Endianness};
//!
//! let options = OpenOptions::new().endianness(Endianness::Little);
//! let reader = HfaReader::with_options("roads.ovr", options)?;
//! let extraction = reader.extract()?;
//! for feature in extraction.geometries() {
//!     println!("{}", feature);
//! }
//! # Ok::<(), hfa_reader::HfaError>(())
//! ```
pub mod hfa;

// Re-export the main types for convenience
pub use hfa::{
    HfaReader,
    HfaError,
    Result,
    annotation::{
        Extraction,
        FeatureKind,
        GeometryFeature,
        Point,
        ProjectionSummary,
        SkippedEntry,
    },
    format::dictionary::{ElementKind, FieldSpec, TypeDef, TypeDictionary},
    format::record::RecordDecoder,
    iter::{ChildIter, TreeWalker},
    types::models::{Endianness, Entry, HfaHeader, OpenOptions},
    types::value::{BaseData, Record, Value},
};
