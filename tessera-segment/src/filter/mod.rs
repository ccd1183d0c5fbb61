//! Predicates and the operators that turn them into matching document ids.

pub use evaluator::*;
pub use operator::*;
pub use predicate::*;

mod evaluator;
mod operator;
mod predicate;
