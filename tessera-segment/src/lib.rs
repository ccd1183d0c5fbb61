#![allow(clippy::cast_possible_truncation)]

//! Immutable columnar segments.
//!
//! A segment is a directory holding one file per (column, index) pair plus `metadata.json`.
//! [`SegmentCreator`] writes it once; [`ImmutableSegment::load`] maps it back into one
//! [`ColumnIndexContainer`] per column, which the [`DataFetcher`], the filter operators and the
//! dictionary-based distinct operator read from.

pub use config::*;
pub use container::*;
pub use creator::*;
pub use dictionary::*;
pub use directory::*;
pub use distinct::*;
pub use fetcher::*;
pub use metadata::*;
pub use segment::*;

mod config;
mod container;
mod creator;
mod dictionary;
mod directory;
mod distinct;
mod fetcher;
pub mod filter;
pub mod index;
mod metadata;
mod segment;
#[cfg(feature = "test-harness")]
pub mod test_harness;
