//! Forward and inverted index readers and writers.

pub use forward::*;
pub use inverted::*;
pub use sorted::*;

mod forward;
mod inverted;
mod sorted;
