#![cfg(target_endian = "little")]
#![deny(missing_docs)]

//! The column type system for Tessera.
//!
//! Columns carry one of a closed set of [`DataType`]s. Individual cells travel as [`Value`]s,
//! which are totally ordered within a type so they can key dictionaries, group-by tables and
//! star-tree nodes.

pub use dtype::*;
pub use value::*;

mod dtype;
mod value;
