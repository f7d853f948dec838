//! Core HFA reader module

pub mod annotation;
pub mod cursor;
pub mod format;
pub mod iter;
pub mod reader;
pub mod types;
pub(crate) mod utils;

pub use reader::HfaReader;
pub use types::error::{HfaError, Result};
