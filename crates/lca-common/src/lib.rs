//! Common types for lca-finder
//!
//! This crate provides the error taxonomy shared by the finder crates.

pub mod error;

pub use error::{FinderError, Result, StoreError, StoreErrorKind};
