#![allow(clippy::cast_possible_truncation)]

//! Fixed-bit packed forward indexes.
//!
//! Every entry occupies the same number of bits, packed LSB-first with no padding between
//! entries. Multi-value columns add a chunk-offset header and a "document start" bitmap so a
//! document's values can be located without scanning from the start of the file.

pub use bitpack::*;
pub use multi::*;
pub use single::*;

mod bitpack;
mod multi;
mod single;

/// Files above this size cannot be addressed by a single mapping.
pub const MAX_FILE_SIZE: u64 = 1 << 31;
