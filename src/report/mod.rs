//! Terminal reporting: run summaries and lifetime tables.
//!
//! Everything here returns `String`s; the caller decides where they go
//! (stdout for the CLI).

pub mod format;

pub use format::*;
