use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use tessera_aggregate::AggregationFunction;
use tessera_dtype::Value;
use tessera_error::{TesseraResult, tessera_err};

use crate::{DataSchema, OrderByExpression, Record};

#[derive(Debug, Clone)]
enum OrderByExtractor {
    Key(usize),
    /// Intermediate results that do not order like their final results are finalized first.
    Aggregation {
        index: usize,
        function: AggregationFunction,
    },
}

impl OrderByExtractor {
    fn extract(&self, record: &Record) -> TesseraResult<Value> {
        match self {
            Self::Key(index) => record
                .key
                .values()
                .get(*index)
                .cloned()
                .ok_or_else(|| tessera_err!(OutOfBounds: *index, 0, record.key.len())),
            Self::Aggregation { index, function } => {
                let result = record
                    .values
                    .get(*index)
                    .ok_or_else(|| tessera_err!(OutOfBounds: *index, 0, record.values.len()))?;
                function.order_by_value(result)
            }
        }
    }
}

/// An order-by value with its direction applied, so that smaller is always better.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Directed {
    value: Value,
    ascending: bool,
}

impl PartialOrd for Directed {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Directed {
    fn cmp(&self, other: &Self) -> Ordering {
        if self.ascending {
            self.value.cmp(&other.value)
        } else {
            other.value.cmp(&self.value)
        }
    }
}

/// The order-by values of one record, in order-by column order, and its position in the table.
///
/// Records with equal values order by position, so an earlier record is always better.
#[derive(Debug, Clone)]
struct IntermediateRecord {
    values: Vec<Directed>,
    position: usize,
}

impl PartialEq for IntermediateRecord {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for IntermediateRecord {}

impl PartialOrd for IntermediateRecord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IntermediateRecord {
    fn cmp(&self, other: &Self) -> Ordering {
        self.values
            .cmp(&other.values)
            .then_with(|| self.position.cmp(&other.position))
    }
}

/// Trims table records to a target size, keeping those that sort best under the order-by clause.
///
/// Only `min(to_evict, to_retain)` records are ever held in a priority queue: when fewer
/// records are evicted than kept, the queue collects the worst records and removes them,
/// otherwise it collects the best records and keeps only those.
#[derive(Debug, Clone)]
pub struct TableResizer {
    extractors: Vec<OrderByExtractor>,
    ascending: Vec<bool>,
}

impl TableResizer {
    pub fn try_new(
        schema: &DataSchema,
        functions: &[AggregationFunction],
        order_by: &[OrderByExpression],
    ) -> TesseraResult<Self> {
        let mut extractors = Vec::with_capacity(order_by.len());
        for expression in order_by {
            let column = expression.column.as_str();
            let extractor = if let Some(index) = schema.key_columns().iter().position(|c| c == column) {
                OrderByExtractor::Key(index)
            } else if let Some(index) = schema.aggregation_columns().iter().position(|c| c == column) {
                OrderByExtractor::Aggregation {
                    index,
                    function: functions
                        .get(index)
                        .cloned()
                        .ok_or_else(|| tessera_err!(OutOfBounds: index, 0, functions.len()))?,
                }
            } else {
                return Err(tessera_err!(
                    AssertionFailed: "order-by column {} is not in the result schema",
                    column
                ));
            };
            extractors.push(extractor);
        }
        Ok(Self {
            extractors,
            ascending: order_by.iter().map(|o| o.ascending).collect(),
        })
    }

    pub fn has_order_by(&self) -> bool {
        !self.extractors.is_empty()
    }

    fn intermediate_record(&self, record: &Record, position: usize) -> TesseraResult<IntermediateRecord> {
        let values = self
            .extractors
            .iter()
            .zip(&self.ascending)
            .map(|(extractor, ascending)| {
                Ok(Directed {
                    value: extractor.extract(record)?,
                    ascending: *ascending,
                })
            })
            .collect::<TesseraResult<_>>()?;
        Ok(IntermediateRecord { values, position })
    }

    /// Order of two records under the order-by clause; `Less` sorts first.
    pub fn compare(&self, left: &Record, right: &Record) -> TesseraResult<Ordering> {
        Ok(self
            .intermediate_record(left, 0)?
            .cmp(&self.intermediate_record(right, 0)?))
    }

    /// The `size` best records, as a max-heap whose top is the worst of them.
    fn retain_queue(&self, records: &[Record], size: usize) -> TesseraResult<BinaryHeap<IntermediateRecord>> {
        let mut queue = BinaryHeap::with_capacity(size);
        for (position, record) in records.iter().enumerate() {
            let candidate = self.intermediate_record(record, position)?;
            if queue.len() < size {
                queue.push(candidate);
            } else if queue.peek().is_some_and(|worst| candidate < *worst) {
                queue.pop();
                queue.push(candidate);
            }
        }
        Ok(queue)
    }

    /// The `size` worst records, as a min-heap whose top is the best of them.
    fn evict_queue(&self, records: &[Record], size: usize) -> TesseraResult<BinaryHeap<Reverse<IntermediateRecord>>> {
        let mut queue = BinaryHeap::with_capacity(size);
        for (position, record) in records.iter().enumerate() {
            let candidate = self.intermediate_record(record, position)?;
            if queue.len() < size {
                queue.push(Reverse(candidate));
            } else if queue.peek().is_some_and(|Reverse(best)| candidate > *best) {
                queue.pop();
                queue.push(Reverse(candidate));
            }
        }
        Ok(queue)
    }

    /// Trim `records` to `trim_to_size`, keeping survivors in their original order.
    ///
    /// Without an order-by clause the first `trim_to_size` records survive.
    pub fn resize(&self, records: &mut Vec<Record>, trim_to_size: usize) -> TesseraResult<()> {
        let to_evict = records.len().saturating_sub(trim_to_size);
        if to_evict == 0 {
            return Ok(());
        }
        if !self.has_order_by() {
            records.truncate(trim_to_size);
            return Ok(());
        }
        let mut keep = vec![true; records.len()];
        if to_evict < trim_to_size {
            for Reverse(evicted) in self.evict_queue(records, to_evict)? {
                keep[evicted.position] = false;
            }
        } else {
            keep.fill(false);
            for retained in self.retain_queue(records, trim_to_size)? {
                keep[retained.position] = true;
            }
        }
        let mut keep = keep.into_iter();
        records.retain(|_| keep.next().unwrap_or(false));
        Ok(())
    }

    /// The best `trim_to_size` records in order-by order; ties keep table order.
    pub fn resize_and_sort(&self, records: Vec<Record>, trim_to_size: usize) -> TesseraResult<Vec<Record>> {
        let size = records.len().min(trim_to_size);
        if size == 0 {
            return Ok(Vec::new());
        }
        let mut retained = self.retain_queue(&records, size)?.into_vec();
        retained.sort();
        let mut records: Vec<Option<Record>> = records.into_iter().map(Some).collect();
        retained
            .into_iter()
            .map(|r| {
                records[r.position]
                    .take()
                    .ok_or_else(|| tessera_err!(InvalidState: "record {} retained twice", r.position))
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::SeedableRng;
    use rstest::rstest;
    use tessera_aggregate::{AggregationFunction, AggregationFunctionType, IntermediateResult};
    use tessera_dtype::Value;

    use crate::{DataSchema, Key, OrderByExpression, Record, TableResizer};

    fn functions() -> Vec<AggregationFunction> {
        vec![
            AggregationFunction::new(AggregationFunctionType::Sum, "salary"),
            AggregationFunction::new(AggregationFunctionType::Avg, "bonus"),
        ]
    }

    fn resizer(order_by: &[OrderByExpression]) -> TableResizer {
        let schema = DataSchema::new(vec!["id".to_string()], &functions());
        TableResizer::try_new(&schema, &functions(), order_by).unwrap()
    }

    /// Ten records with distinct sums in shuffled order; each AVG finalizes to `9 - sum`.
    fn records() -> Vec<Record> {
        let mut sums: Vec<i32> = (0..10).collect();
        sums.shuffle(&mut StdRng::seed_from_u64(7));
        sums.into_iter()
            .enumerate()
            .map(|(id, sum)| {
                let count = if id % 2 == 0 { 2 } else { 1 };
                Record::new(
                    Key(vec![Value::Int(id as i32)]),
                    vec![
                        IntermediateResult::Double(f64::from(sum)),
                        IntermediateResult::Avg {
                            sum: f64::from(9 - sum) * count as f64,
                            count,
                        },
                    ],
                )
            })
            .collect()
    }

    fn sorted_then_truncated(resizer: &TableResizer, k: usize) -> Vec<Record> {
        let mut all = records();
        all.sort_by(|a, b| resizer.compare(a, b).unwrap());
        all.truncate(k);
        all
    }

    fn keys(records: &[Record]) -> Vec<Key> {
        let mut keys: Vec<Key> = records.iter().map(|r| r.key.clone()).collect();
        keys.sort();
        keys
    }

    #[rstest]
    #[case(3, OrderByExpression::desc("sum_salary"))]
    #[case(8, OrderByExpression::desc("sum_salary"))]
    #[case(3, OrderByExpression::asc("sum_salary"))]
    #[case(8, OrderByExpression::asc("avg_bonus"))]
    #[case(3, OrderByExpression::desc("avg_bonus"))]
    #[case(3, OrderByExpression::desc("id"))]
    fn keeps_best_k(#[case] k: usize, #[case] order_by: OrderByExpression) {
        let resizer = resizer(&[order_by]);
        let expected = sorted_then_truncated(&resizer, k);

        let mut resized = records();
        resizer.resize(&mut resized, k).unwrap();
        assert_eq!(keys(&resized), keys(&expected));

        assert_eq!(resizer.resize_and_sort(records(), k).unwrap(), expected);
    }

    #[test]
    fn survivors_keep_table_order() {
        let resizer = resizer(&[OrderByExpression::desc("sum_salary")]);
        let mut resized = records();
        resizer.resize(&mut resized, 8).unwrap();
        let positions: Vec<i32> = resized.iter().map(|r| r.key.values()[0].as_i32().unwrap()).collect();
        assert!(positions.is_sorted());
    }

    #[test]
    fn chains_order_by_columns() {
        // Both records sum to 5; the key breaks the tie.
        let tied = |id: i32| Record::new(
            Key(vec![Value::Int(id)]),
            vec![IntermediateResult::Double(5.0), IntermediateResult::Avg { sum: 1.0, count: 1 }],
        );
        let resizer = resizer(&[OrderByExpression::desc("sum_salary"), OrderByExpression::desc("id")]);
        let sorted = resizer.resize_and_sort(vec![tied(1), tied(2), tied(0)], 2).unwrap();
        assert_eq!(sorted, [tied(2), tied(1)]);
    }

    #[test]
    fn ties_keep_first_records() {
        let tied = |id: i32| Record::new(
            Key(vec![Value::Int(id)]),
            vec![IntermediateResult::Double(1.0), IntermediateResult::Avg { sum: 1.0, count: 1 }],
        );
        let resizer = resizer(&[OrderByExpression::asc("sum_salary")]);
        let mut resized = (0..5).map(tied).collect();
        resizer.resize(&mut resized, 2).unwrap();
        assert_eq!(resized, [tied(0), tied(1)]);
        assert_eq!(resizer.resize_and_sort((0..5).map(tied).collect(), 3).unwrap(), [tied(0), tied(1), tied(2)]);
    }

    #[rstest]
    #[case(8)]
    #[case(3)]
    fn ties_evict_last_records(#[case] k: usize) {
        let tied = |id: i32| Record::new(
            Key(vec![Value::Int(id)]),
            vec![IntermediateResult::Double(1.0), IntermediateResult::Avg { sum: 1.0, count: 1 }],
        );
        let resizer = resizer(&[OrderByExpression::desc("sum_salary")]);
        let mut resized: Vec<Record> = (0..10).map(tied).collect();
        resizer.resize(&mut resized, k).unwrap();
        assert_eq!(resized, (0..k as i32).map(tied).collect::<Vec<_>>());
    }

    #[test]
    fn without_order_by_keeps_insertion_order() {
        let resizer = resizer(&[]);
        let mut resized = records();
        resizer.resize(&mut resized, 4).unwrap();
        assert_eq!(resized, records()[..4]);
    }

    #[test]
    fn unknown_order_by_column_rejected() {
        let schema = DataSchema::new(vec!["id".to_string()], &functions());
        assert!(TableResizer::try_new(&schema, &functions(), &[OrderByExpression::asc("salary")]).is_err());
    }
}
