#![allow(clippy::cast_possible_truncation)]

//! Star-tree pre-aggregation over an immutable segment.
//!
//! The tree splits documents on a configured order of dimensions. Every node covers a
//! contiguous range of documents in split order and stores one pre-aggregated value per
//! `(function, column)` pair. A star child of a node spans all values of the node's split
//! dimension and covers the same range as the node itself.

pub use builder::*;
pub use config::*;
pub use tree::*;

mod builder;
mod config;
mod tree;
