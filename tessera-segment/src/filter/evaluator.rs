use std::ops::Bound;

use roaring::RoaringBitmap;
use tessera_dtype::{DataType, Value};
use tessera_error::TesseraResult;

use crate::filter::{Predicate, PredicateOp};
use crate::{ColumnIndexContainer, Dictionary};

#[derive(Debug, Clone)]
enum Evaluation {
    /// DictIds whose values match, out of `cardinality`.
    Dictionary { matching: RoaringBitmap, cardinality: u32 },
    /// Raw column values tested one at a time.
    Raw(PredicateOp),
}

/// A predicate resolved against one column.
#[derive(Debug, Clone)]
pub struct PredicateEvaluator {
    evaluation: Evaluation,
}

/// `value` converted to `dtype`, if the conversion loses nothing.
fn exact_cast(value: &Value, dtype: DataType) -> Option<Value> {
    let cast = value.cast(dtype).ok()?;
    (cast.cast(value.data_type()).ok()? == *value).then_some(cast)
}

fn dict_ids_of<'v>(dictionary: &Dictionary, values: impl IntoIterator<Item = &'v Value>) -> TesseraResult<RoaringBitmap> {
    let mut ids = RoaringBitmap::new();
    for value in values {
        if let Some(cast) = exact_cast(value, dictionary.data_type()) {
            if let Some(id) = dictionary.index_of(&cast)? {
                ids.insert(id);
            }
        }
    }
    Ok(ids)
}

fn exact_bound(bound: &Bound<Value>, dtype: DataType) -> Option<Bound<Value>> {
    match bound {
        Bound::Unbounded => Some(Bound::Unbounded),
        Bound::Included(v) => exact_cast(v, dtype).map(Bound::Included),
        Bound::Excluded(v) => exact_cast(v, dtype).map(Bound::Excluded),
    }
}

fn scan_dictionary(dictionary: &Dictionary, op: &PredicateOp) -> TesseraResult<RoaringBitmap> {
    let mut ids = RoaringBitmap::new();
    for id in 0..dictionary.len() as u32 {
        if op.matches(&dictionary.get(id)?) {
            ids.insert(id);
        }
    }
    Ok(ids)
}

impl PredicateEvaluator {
    pub fn try_new(predicate: &Predicate, container: &ColumnIndexContainer) -> TesseraResult<Self> {
        let Some(dictionary) = container.dictionary() else {
            return Ok(Self {
                evaluation: Evaluation::Raw(predicate.op.clone()),
            });
        };
        let cardinality = dictionary.len() as u32;
        let full = || {
            let mut all = RoaringBitmap::new();
            all.insert_range(0..cardinality);
            all
        };
        let matching = match &predicate.op {
            PredicateOp::Eq(v) => dict_ids_of(dictionary, [v])?,
            PredicateOp::In(vs) => dict_ids_of(dictionary, vs)?,
            PredicateOp::NotEq(v) => full() - dict_ids_of(dictionary, [v])?,
            PredicateOp::NotIn(vs) => full() - dict_ids_of(dictionary, vs)?,
            PredicateOp::Range { lower, upper } => {
                let dtype = dictionary.data_type();
                match (dictionary.is_sorted(), exact_bound(lower, dtype), exact_bound(upper, dtype)) {
                    (true, Some(lower), Some(upper)) => {
                        let mut ids = RoaringBitmap::new();
                        ids.insert_range(dictionary.dict_id_range(lower.as_ref(), upper.as_ref())?);
                        ids
                    }
                    _ => scan_dictionary(dictionary, &predicate.op)?,
                }
            }
        };
        log::debug!(
            "predicate {} matches {} of {} dictIds",
            predicate,
            matching.len(),
            cardinality
        );
        Ok(Self {
            evaluation: Evaluation::Dictionary {
                matching,
                cardinality,
            },
        })
    }

    pub fn is_dictionary_based(&self) -> bool {
        matches!(self.evaluation, Evaluation::Dictionary { .. })
    }

    /// No document can match.
    pub fn is_always_false(&self) -> bool {
        match &self.evaluation {
            Evaluation::Dictionary { matching, .. } => matching.is_empty(),
            Evaluation::Raw(_) => false,
        }
    }

    /// Every document matches.
    pub fn is_always_true(&self) -> bool {
        match &self.evaluation {
            Evaluation::Dictionary {
                matching,
                cardinality,
            } => matching.len() == u64::from(*cardinality),
            Evaluation::Raw(_) => false,
        }
    }

    /// Matching dictIds of a dictionary-based evaluator.
    pub fn matching_dict_ids(&self) -> Option<&RoaringBitmap> {
        match &self.evaluation {
            Evaluation::Dictionary { matching, .. } => Some(matching),
            Evaluation::Raw(_) => None,
        }
    }

    pub fn apply_dict_id(&self, dict_id: u32) -> bool {
        match &self.evaluation {
            Evaluation::Dictionary { matching, .. } => matching.contains(dict_id),
            Evaluation::Raw(_) => false,
        }
    }

    pub fn apply_value(&self, value: &Value) -> bool {
        match &self.evaluation {
            Evaluation::Raw(op) => op.matches(value),
            Evaluation::Dictionary { .. } => false,
        }
    }
}
