use std::fmt::{Display, Formatter};

use itertools::Itertools;
use tessera_aggregate::IntermediateResult;
use tessera_dtype::Value;

/// The group-by values of a record, in key column order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key(pub Vec<Value>);

impl Key {
    pub fn values(&self) -> &[Value] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<V: Into<Value>> FromIterator<V> for Key {
    fn from_iter<T: IntoIterator<Item = V>>(iter: T) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl Display for Key {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.0.iter().join(", "))
    }
}

/// A row of the indexed table: its key and one intermediate result per aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub key: Key,
    pub values: Vec<IntermediateResult>,
}

impl Record {
    pub fn new(key: Key, values: Vec<IntermediateResult>) -> Self {
        Self { key, values }
    }
}
