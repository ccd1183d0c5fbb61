//! Query-time group-by aggregation.
//!
//! An [`IndexedTable`] merges [`Record`]s by [`Key`] and keeps its size bounded: once the
//! buffered capacity is reached, the [`TableResizer`] trims it back to the evict capacity,
//! keeping the records that sort best under the query's order-by clause.

pub use group_by::*;
pub use record::*;
pub use resizer::*;
pub use schema::*;
pub use table::*;

mod group_by;
mod record;
mod resizer;
mod schema;
mod table;
