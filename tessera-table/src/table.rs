use rustc_hash::FxHashMap;
use tessera_aggregate::AggregationFunction;
use tessera_dtype::Value;
use tessera_error::{TesseraResult, tessera_bail};

use crate::{DataSchema, Key, OrderByExpression, Record, TableCapacity, TableResizer};

/// Group-by records indexed by key, trimmed as they accumulate.
///
/// Owned by one query and not meant for concurrent use; partial tables are combined with
/// [`IndexedTable::merge`]. [`IndexedTable::finish`] consumes the table.
#[derive(Debug)]
pub struct IndexedTable {
    schema: DataSchema,
    functions: Vec<AggregationFunction>,
    resizer: TableResizer,
    capacity: TableCapacity,
    records: Vec<Record>,
    lookup: FxHashMap<Key, usize>,
    num_resizes: usize,
}

impl IndexedTable {
    pub fn try_new(
        key_columns: Vec<String>,
        functions: Vec<AggregationFunction>,
        order_by: &[OrderByExpression],
        capacity: TableCapacity,
    ) -> TesseraResult<Self> {
        let schema = DataSchema::new(key_columns, &functions);
        let resizer = TableResizer::try_new(&schema, &functions, order_by)?;
        Ok(Self {
            schema,
            functions,
            resizer,
            capacity,
            records: Vec::new(),
            lookup: FxHashMap::default(),
            num_resizes: 0,
        })
    }

    pub fn schema(&self) -> &DataSchema {
        &self.schema
    }

    pub fn functions(&self) -> &[AggregationFunction] {
        &self.functions
    }

    pub fn capacity(&self) -> TableCapacity {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in insertion order.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn get(&self, key: &Key) -> Option<&Record> {
        self.lookup.get(key).map(|index| &self.records[*index])
    }

    /// Number of times the table was trimmed back to its evict capacity.
    pub fn num_resizes(&self) -> usize {
        self.num_resizes
    }

    /// Merge `record` into the record with the same key, or add it.
    pub fn upsert(&mut self, record: Record) -> TesseraResult<()> {
        if record.key.len() != self.schema.key_columns().len() {
            tessera_bail!(
                AssertionFailed: "key {} has {} columns, table has {}",
                record.key,
                record.key.len(),
                self.schema.key_columns().len()
            );
        }
        if record.values.len() != self.functions.len() {
            tessera_bail!(
                AssertionFailed: "record {} has {} values, table has {} aggregations",
                record.key,
                record.values.len(),
                self.functions.len()
            );
        }

        match self.lookup.get(&record.key) {
            Some(index) => {
                let existing = &mut self.records[*index];
                let merged = self
                    .functions
                    .iter()
                    .zip(&existing.values)
                    .zip(record.values)
                    .map(|((function, current), new)| function.merge(current.clone(), new))
                    .collect::<TesseraResult<_>>()?;
                existing.values = merged;
            }
            None => {
                self.lookup.insert(record.key.clone(), self.records.len());
                self.records.push(record);
            }
        }

        if self.records.len() >= self.capacity.buffered_capacity() {
            self.resize(self.capacity.evict_capacity())?;
        }
        Ok(())
    }

    /// Upsert every record of `other` in turn.
    pub fn merge(&mut self, other: IndexedTable) -> TesseraResult<()> {
        if other.schema != self.schema {
            tessera_bail!(
                AssertionFailed: "cannot merge table with columns [{}] into [{}]",
                other.schema.column_names().collect::<Vec<_>>().join(", "),
                self.schema.column_names().collect::<Vec<_>>().join(", ")
            );
        }
        other.records.into_iter().try_for_each(|record| self.upsert(record))
    }

    /// Drop every record, keeping the schema and capacity for reuse.
    pub fn clear(&mut self) {
        self.records.clear();
        self.lookup.clear();
    }

    fn resize(&mut self, trim_to_size: usize) -> TesseraResult<()> {
        let before = self.records.len();
        self.resizer.resize(&mut self.records, trim_to_size)?;
        self.lookup.clear();
        self.lookup.extend(
            self.records
                .iter()
                .enumerate()
                .map(|(index, record)| (record.key.clone(), index)),
        );
        self.num_resizes += 1;
        log::debug!("resized indexed table from {} to {} records", before, self.records.len());
        Ok(())
    }

    /// Trim to the result size and return the remaining records, sorted by the order-by
    /// clause when `sort` is set and there is one, otherwise in insertion order.
    pub fn finish(mut self, sort: bool) -> TesseraResult<Vec<Record>> {
        let result_size = self.capacity.result_size();
        if sort && self.resizer.has_order_by() {
            return self.resizer.resize_and_sort(self.records, result_size);
        }
        self.resize(result_size)?;
        Ok(self.records)
    }

    /// Like [`IndexedTable::finish`], with each row holding its key values followed by the
    /// final aggregation results.
    pub fn finish_rows(self, sort: bool) -> TesseraResult<Vec<Vec<Value>>> {
        let functions = self.functions.clone();
        self.finish(sort)?
            .into_iter()
            .map(|record| {
                let mut row = record.key.0;
                for (function, result) in functions.iter().zip(&record.values) {
                    row.push(function.extract_final_result(result)?);
                }
                Ok(row)
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use tessera_aggregate::{AggregationFunction, AggregationFunctionType, IntermediateResult};
    use tessera_dtype::Value;

    use crate::{IndexedTable, Key, OrderByExpression, Record, TableCapacity};

    fn sum_table(capacity: TableCapacity) -> IndexedTable {
        IndexedTable::try_new(
            vec!["country".to_string()],
            vec![AggregationFunction::new(AggregationFunctionType::Sum, "salary")],
            &[OrderByExpression::desc("sum_salary")],
            capacity,
        )
        .unwrap()
    }

    fn record(country: &str, salary: f64) -> Record {
        Record::new(
            Key(vec![Value::from(country)]),
            vec![IntermediateResult::Double(salary)],
        )
    }

    #[test]
    fn upserts_merge_like_merged_record() {
        let capacity = TableCapacity::from_result_size(10);
        let mut twice = sum_table(capacity);
        twice.upsert(record("IN", 3.0)).unwrap();
        twice.upsert(record("IN", 5.0)).unwrap();
        let mut once = sum_table(capacity);
        once.upsert(record("IN", 8.0)).unwrap();
        assert_eq!(twice.records(), once.records());
    }

    #[test]
    fn end_to_end_keeps_top_groups() {
        let mut table = sum_table(TableCapacity::new(2, 2, 3).unwrap());
        for (country, salary) in [("IN", 3.0), ("IN", 5.0), ("CH", 2.0), ("CH", 8.0), ("CH", 9.0), ("US", 1.0)] {
            table.upsert(record(country, salary)).unwrap();
        }
        assert_eq!(table.num_resizes(), 1);
        assert_eq!(
            table.finish_rows(true).unwrap(),
            [
                vec![Value::from("CH"), Value::Double(19.0)],
                vec![Value::from("IN"), Value::Double(8.0)]
            ]
        );
    }

    #[test]
    fn finish_without_sort_keeps_insertion_order() {
        let mut table = sum_table(TableCapacity::new(2, 4, 8).unwrap());
        for (country, salary) in [("US", 1.0), ("IN", 8.0), ("CH", 19.0)] {
            table.upsert(record(country, salary)).unwrap();
        }
        let records = table.finish(false).unwrap();
        assert_eq!(records, [record("IN", 8.0), record("CH", 19.0)]);
    }

    #[test]
    fn merge_combines_tables() {
        let capacity = TableCapacity::from_result_size(10);
        let mut left = sum_table(capacity);
        left.upsert(record("IN", 3.0)).unwrap();
        let mut right = sum_table(capacity);
        right.upsert(record("IN", 5.0)).unwrap();
        right.upsert(record("US", 1.0)).unwrap();
        left.merge(right).unwrap();
        assert_eq!(left.get(&Key(vec![Value::from("IN")])), Some(&record("IN", 8.0)));
        assert_eq!(left.len(), 2);
    }

    #[test]
    fn arity_mismatch_rejected() {
        let mut table = sum_table(TableCapacity::from_result_size(10));
        let wide = Record::new(
            Key(vec![Value::from("IN"), Value::from("Hin")]),
            vec![IntermediateResult::Double(1.0)],
        );
        assert!(table.upsert(wide).is_err());
        let no_values = Record::new(Key(vec![Value::from("IN")]), vec![]);
        assert!(table.upsert(no_values).is_err());
        assert!(table.is_empty());
    }

    #[test]
    fn clear_forgets_keys() {
        let mut table = sum_table(TableCapacity::from_result_size(10));
        table.upsert(record("IN", 3.0)).unwrap();
        table.clear();
        assert!(table.is_empty());
        table.upsert(record("IN", 5.0)).unwrap();
        assert_eq!(table.records(), [record("IN", 5.0)]);
    }

    #[test]
    fn failed_merge_keeps_record() {
        let mut table = sum_table(TableCapacity::from_result_size(10));
        table.upsert(record("IN", 3.0)).unwrap();
        let mismatched = Record::new(
            Key(vec![Value::from("IN")]),
            vec![IntermediateResult::Avg { sum: 1.0, count: 1 }],
        );
        assert!(table.upsert(mismatched).is_err());
        assert_eq!(table.get(&Key(vec![Value::from("IN")])), Some(&record("IN", 3.0)));
        assert_eq!(
            table.finish_rows(false).unwrap(),
            [vec![Value::from("IN"), Value::Double(3.0)]]
        );
    }

    #[test]
    fn merging_different_schemas_rejected() {
        let capacity = TableCapacity::from_result_size(10);
        let mut table = sum_table(capacity);
        let other = IndexedTable::try_new(
            vec!["name".to_string()],
            vec![AggregationFunction::new(AggregationFunctionType::Sum, "salary")],
            &[],
            capacity,
        )
        .unwrap();
        assert!(table.merge(other).is_err());
    }
}
