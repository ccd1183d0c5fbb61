#![allow(clippy::cast_possible_truncation)]

//! Chunk-compressed forward indexes for columns stored without a dictionary.
//!
//! Documents are grouped into fixed-size chunks which are compressed independently, so a
//! random read decompresses at most one chunk. Fixed-width types store one little-endian entry
//! per document; strings and bytes store per-document offsets ahead of the payload.

pub use compression::*;
pub use header::*;
pub use reader::*;
pub use writer::*;

mod compression;
mod header;
mod reader;
mod writer;

/// Default number of documents per chunk.
pub const DEFAULT_DOCS_PER_CHUNK: usize = 1000;
