//! sigdb-core
//!
//! Core library for the FLIRT signature database source tree.
//!
//! The tree stores one library per `<format>/<arch>/<bits>/<library>/`
//! directory, each holding a pattern file, a description and a manifest of
//! the source artifacts the patterns were generated from. This crate parses
//! those files, merges and deduplicates patterns, validates the tree and
//! builds a distributable signature tree from it.
//!
//! All substantive logic lives here so frontends stay thin.

pub mod build;
pub mod config;
pub mod convert;
pub mod description;
pub mod layout;
pub mod manifest;
pub mod merge;
pub mod pat;
pub mod validate;

/// Returns the library version as encoded at compile time.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
