use tessera_aggregate::AggregationFunction;
use tessera_dtype::Value;
use tessera_error::{TesseraResult, tessera_bail};
use tessera_segment::filter::{FilterExpr, FilterOperator};
use tessera_segment::{DataFetcher, ImmutableSegment, MAX_DOC_PER_CALL};

use crate::{IndexedTable, Key, Record};

/// Where an aggregation reads its input from.
enum Input {
    /// `COUNT(*)`: one unit per document.
    Documents,
    Single(Vec<Value>),
    Multi(Vec<Vec<Value>>),
}

/// Aggregates the filtered documents of one segment into an [`IndexedTable`].
#[derive(Debug)]
pub struct GroupByExecutor<'a> {
    segment: &'a ImmutableSegment,
    group_by: Vec<String>,
    functions: Vec<AggregationFunction>,
    filter: Option<FilterExpr>,
}

impl<'a> GroupByExecutor<'a> {
    pub fn new(segment: &'a ImmutableSegment, group_by: Vec<String>, functions: Vec<AggregationFunction>) -> Self {
        Self {
            segment,
            group_by,
            functions,
            filter: None,
        }
    }

    pub fn with_filter(mut self, filter: FilterExpr) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Upsert one record per matching document into `table`, returning the number of documents.
    pub fn execute(&self, table: &mut IndexedTable) -> TesseraResult<usize> {
        for column in &self.group_by {
            if !self.segment.column(column)?.is_single_value() {
                tessera_bail!(NotImplemented: "group by", format!("multi-value column {column}"));
            }
        }
        let mut inputs = self
            .functions
            .iter()
            .map(|function| match function.column() {
                "*" => Ok(Input::Documents),
                column if self.segment.column(column)?.is_single_value() => Ok(Input::Single(Vec::new())),
                _ => Ok(Input::Multi(Vec::new())),
            })
            .collect::<TesseraResult<Vec<_>>>()?;

        let operator = FilterOperator::plan(self.segment, self.filter.as_ref())?;
        let doc_ids: Vec<u32> = operator.doc_ids()?.iter().collect();
        log::debug!(
            "group-by over {} of {} documents of segment {} using {} filter",
            doc_ids.len(),
            self.segment.num_docs(),
            self.segment.name(),
            operator.name()
        );

        let mut fetcher = DataFetcher::new(self.segment);
        let mut keys = vec![Vec::new(); self.group_by.len()];
        for batch in doc_ids.chunks(MAX_DOC_PER_CALL) {
            for (column, values) in self.group_by.iter().zip(&mut keys) {
                fetcher.fetch_values(column, batch, values)?;
            }
            for (function, input) in self.functions.iter().zip(&mut inputs) {
                match input {
                    Input::Documents => {}
                    Input::Single(values) => fetcher.fetch_values(function.column(), batch, values)?,
                    Input::Multi(values) => fetcher.fetch_values_mv(function.column(), batch, values)?,
                }
            }
            for doc in 0..batch.len() {
                let key = Key(keys.iter().map(|column| column[doc].clone()).collect());
                let values = self
                    .functions
                    .iter()
                    .zip(&inputs)
                    .map(|(function, input)| {
                        let mut result = function.init();
                        match input {
                            Input::Documents => function.aggregate(&mut result, &Value::Long(1))?,
                            Input::Single(values) => function.aggregate(&mut result, &values[doc])?,
                            Input::Multi(values) => function.aggregate_mv(&mut result, &values[doc])?,
                        }
                        Ok(result)
                    })
                    .collect::<TesseraResult<Vec<_>>>()?;
                table.upsert(Record::new(key, values))?;
            }
        }
        Ok(doc_ids.len())
    }
}

#[cfg(test)]
mod test {
    use tessera_aggregate::{AggregationFunction, AggregationFunctionType};
    use tessera_dtype::Value;
    use tessera_segment::filter::{FilterExpr, Predicate};
    use tessera_segment::test_harness::{config, employee_segment};
    use tessera_segment::IndexLoadingConfig;

    use crate::{GroupByExecutor, IndexedTable, OrderByExpression, TableCapacity};

    fn sum(column: &str) -> AggregationFunction {
        AggregationFunction::new(AggregationFunctionType::Sum, column)
    }

    fn row(key: &str, value: f64) -> Vec<Value> {
        vec![Value::from(key), Value::Double(value)]
    }

    #[test]
    fn top_countries_by_salary() {
        let dir = tempfile::tempdir().unwrap();
        let segment = employee_segment(dir.path(), config(), &IndexLoadingConfig::default());
        let mut table = IndexedTable::try_new(
            vec!["country".to_string()],
            vec![sum("salary")],
            &[OrderByExpression::desc("sum_salary")],
            TableCapacity::new(2, 2, 3).unwrap(),
        )
        .unwrap();
        let executor = GroupByExecutor::new(&segment, vec!["country".to_string()], vec![sum("salary")]);
        assert_eq!(executor.execute(&mut table).unwrap(), 6);
        assert_eq!(table.finish_rows(true).unwrap(), [row("CH", 19.0), row("IN", 8.0)]);
    }

    #[test]
    fn filtered_group_by() {
        let dir = tempfile::tempdir().unwrap();
        let segment = employee_segment(dir.path(), config(), &IndexLoadingConfig::default());
        let mut table = IndexedTable::try_new(
            vec!["country".to_string()],
            vec![sum("salary")],
            &[OrderByExpression::asc("country")],
            TableCapacity::from_result_size(10),
        )
        .unwrap();
        GroupByExecutor::new(&segment, vec!["country".to_string()], vec![sum("salary")])
            .with_filter(FilterExpr::from(Predicate::equals("language", "Eng")))
            .execute(&mut table)
            .unwrap();
        assert_eq!(table.finish_rows(true).unwrap(), [row("CH", 19.0), row("US", 1.0)]);
    }

    #[test]
    fn multi_value_and_raw_metrics() {
        let dir = tempfile::tempdir().unwrap();
        let segment = employee_segment(dir.path(), config(), &IndexLoadingConfig::default());
        let functions = vec![
            sum("tags"),
            AggregationFunction::new(AggregationFunctionType::Avg, "bonus"),
            AggregationFunction::new(AggregationFunctionType::Count, "*"),
        ];
        let mut table = IndexedTable::try_new(
            vec!["name".to_string()],
            functions.clone(),
            &[OrderByExpression::desc("avg_bonus")],
            TableCapacity::from_result_size(10),
        )
        .unwrap();
        GroupByExecutor::new(&segment, vec!["name".to_string()], functions)
            .execute(&mut table)
            .unwrap();
        assert_eq!(
            table.finish_rows(true).unwrap(),
            [
                vec![Value::from("Zackie"), Value::Double(10.0), Value::Double(4.5), Value::Long(3)],
                vec![Value::from("Rahul"), Value::Double(11.0), Value::Double(1.5), Value::Long(3)],
            ]
        );
    }

    #[test]
    fn segments_merge_sequentially() {
        let dir = tempfile::tempdir().unwrap();
        let segment = employee_segment(dir.path(), config(), &IndexLoadingConfig::default());
        let table = || {
            IndexedTable::try_new(
                vec!["country".to_string()],
                vec![sum("salary")],
                &[OrderByExpression::desc("sum_salary")],
                TableCapacity::from_result_size(10),
            )
            .unwrap()
        };
        let executor = GroupByExecutor::new(&segment, vec!["country".to_string()], vec![sum("salary")]);
        let (mut first, mut second) = (table(), table());
        executor.execute(&mut first).unwrap();
        executor.execute(&mut second).unwrap();
        first.merge(second).unwrap();
        assert_eq!(
            first.finish_rows(true).unwrap(),
            [row("CH", 38.0), row("IN", 16.0), row("US", 2.0)]
        );
    }

    #[test]
    fn multi_value_group_by_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let segment = employee_segment(dir.path(), config(), &IndexLoadingConfig::default());
        let mut table = IndexedTable::try_new(
            vec!["tags".to_string()],
            vec![sum("salary")],
            &[],
            TableCapacity::from_result_size(10),
        )
        .unwrap();
        assert!(
            GroupByExecutor::new(&segment, vec!["tags".to_string()], vec![sum("salary")])
                .execute(&mut table)
                .is_err()
        );
    }
}
