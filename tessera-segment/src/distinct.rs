use tessera_dtype::Value;
use tessera_error::TesseraResult;

use crate::{Dictionary, ImmutableSegment};

/// DISTINCT over one column answered from its dictionary alone.
///
/// Every dictionary entry occurs in at least one document, so this is only valid when the
/// query has no filter.
#[derive(Debug)]
pub struct DictionaryBasedDistinct<'a> {
    column: String,
    dictionary: &'a Dictionary,
}

impl<'a> DictionaryBasedDistinct<'a> {
    pub fn try_new(segment: &'a ImmutableSegment, column: &str) -> TesseraResult<Self> {
        Ok(Self {
            column: column.to_string(),
            dictionary: segment.column(column)?.require_dictionary()?,
        })
    }

    /// Up to `limit` distinct values, ordered when `ascending` is given.
    ///
    /// Sorted dictionaries are read from the matching end; unsorted ones are read whole, then
    /// sorted and truncated. Without an order the first `limit` entries are returned.
    pub fn execute(&self, limit: usize, ascending: Option<bool>) -> TesseraResult<Vec<Value>> {
        let cardinality = self.dictionary.len() as u32;
        let take = limit.min(cardinality as usize) as u32;
        let sorted = self.dictionary.is_sorted();
        let ids: Vec<u32> = match (ascending, sorted) {
            (None, _) | (Some(true), true) => (0..take).collect(),
            (Some(false), true) => (cardinality - take..cardinality).rev().collect(),
            (Some(ascending), false) => return self.sort_all(limit, ascending),
        };
        let mut values = Vec::with_capacity(ids.len());
        self.dictionary.read_values(&ids, &mut values)?;
        Ok(values)
    }

    fn sort_all(&self, limit: usize, ascending: bool) -> TesseraResult<Vec<Value>> {
        log::debug!(
            "distinct on {} sorts all {} values of an unsorted dictionary",
            self.column,
            self.dictionary.len()
        );
        let ids: Vec<u32> = (0..self.dictionary.len() as u32).collect();
        let mut values = Vec::with_capacity(ids.len());
        self.dictionary.read_values(&ids, &mut values)?;
        if ascending {
            values.sort_unstable();
        } else {
            values.sort_unstable_by(|a, b| b.cmp(a));
        }
        values.truncate(limit);
        Ok(values)
    }
}
