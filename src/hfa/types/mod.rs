//! Foundational data structures, error types, and decoded value model.

pub mod error;
pub mod models;
pub mod value;
