//! Aggregation functions shared by the star-tree builder and the group-by table.
//!
//! An [`AggregationFunction`] is resolved once per query from its [`AggregationFunctionType`]
//! and carries plain function pointers, so folding, merging and finalizing an
//! [`IntermediateResult`] never goes through dynamic dispatch.

pub use function::*;
pub use function_type::*;
pub use result::*;

mod function;
mod function_type;
mod result;
