use rustc_hash::FxHashSet;
use tessera_dtype::Value;
use tessera_error::{TesseraResult, tessera_bail, tessera_err};

use crate::{AggregationFunctionType, IntermediateResult};

type InitFn = fn() -> IntermediateResult;
type AggregateFn = fn(&mut IntermediateResult, &Value) -> TesseraResult<()>;
type MergeFn = fn(IntermediateResult, IntermediateResult) -> TesseraResult<IntermediateResult>;
type ExtractFn = fn(&IntermediateResult) -> TesseraResult<Value>;

/// An aggregation over one column, resolved once per query.
#[derive(Debug, Clone)]
pub struct AggregationFunction {
    function_type: AggregationFunctionType,
    column: String,
    init: InitFn,
    aggregate: AggregateFn,
    merge: MergeFn,
    extract_final_result: ExtractFn,
    is_intermediate_result_comparable: bool,
}

fn numeric(value: &Value) -> TesseraResult<f64> {
    value
        .as_f64()
        .ok_or_else(|| tessera_err!(MismatchedTypes: "numeric", value.data_type()))
}

fn mismatch(left: &IntermediateResult, right: &IntermediateResult) -> TesseraResult<IntermediateResult> {
    Err(tessera_err!(MismatchedTypes: left.name(), right.name()))
}

macro_rules! expect_result {
    ($result:expr, $variant:literal) => {
        tessera_err!(MismatchedTypes: $variant, $result.name())
    };
}

fn count_init() -> IntermediateResult {
    IntermediateResult::Long(0)
}

fn count_aggregate(acc: &mut IntermediateResult, _value: &Value) -> TesseraResult<()> {
    match acc {
        IntermediateResult::Long(count) => {
            *count += 1;
            Ok(())
        }
        other => Err(expect_result!(other, "long")),
    }
}

fn long_merge(left: IntermediateResult, right: IntermediateResult) -> TesseraResult<IntermediateResult> {
    match (&left, &right) {
        (IntermediateResult::Long(a), IntermediateResult::Long(b)) => Ok(IntermediateResult::Long(a + b)),
        _ => mismatch(&left, &right),
    }
}

fn sum_init() -> IntermediateResult {
    IntermediateResult::Double(0.0)
}

fn sum_aggregate(acc: &mut IntermediateResult, value: &Value) -> TesseraResult<()> {
    match acc {
        IntermediateResult::Double(sum) => {
            *sum += numeric(value)?;
            Ok(())
        }
        other => Err(expect_result!(other, "double")),
    }
}

fn sum_merge(left: IntermediateResult, right: IntermediateResult) -> TesseraResult<IntermediateResult> {
    match (&left, &right) {
        (IntermediateResult::Double(a), IntermediateResult::Double(b)) => Ok(IntermediateResult::Double(a + b)),
        _ => mismatch(&left, &right),
    }
}

fn min_init() -> IntermediateResult {
    IntermediateResult::Double(f64::INFINITY)
}

fn min_aggregate(acc: &mut IntermediateResult, value: &Value) -> TesseraResult<()> {
    match acc {
        IntermediateResult::Double(min) => {
            *min = min.min(numeric(value)?);
            Ok(())
        }
        other => Err(expect_result!(other, "double")),
    }
}

fn min_merge(left: IntermediateResult, right: IntermediateResult) -> TesseraResult<IntermediateResult> {
    match (&left, &right) {
        (IntermediateResult::Double(a), IntermediateResult::Double(b)) => Ok(IntermediateResult::Double(a.min(*b))),
        _ => mismatch(&left, &right),
    }
}

fn max_init() -> IntermediateResult {
    IntermediateResult::Double(f64::NEG_INFINITY)
}

fn max_aggregate(acc: &mut IntermediateResult, value: &Value) -> TesseraResult<()> {
    match acc {
        IntermediateResult::Double(max) => {
            *max = max.max(numeric(value)?);
            Ok(())
        }
        other => Err(expect_result!(other, "double")),
    }
}

fn max_merge(left: IntermediateResult, right: IntermediateResult) -> TesseraResult<IntermediateResult> {
    match (&left, &right) {
        (IntermediateResult::Double(a), IntermediateResult::Double(b)) => Ok(IntermediateResult::Double(a.max(*b))),
        _ => mismatch(&left, &right),
    }
}

fn scalar_final(result: &IntermediateResult) -> TesseraResult<Value> {
    result
        .as_value()
        .ok_or_else(|| expect_result!(result, "long or double"))
}

fn avg_init() -> IntermediateResult {
    IntermediateResult::Avg { sum: 0.0, count: 0 }
}

fn avg_aggregate(acc: &mut IntermediateResult, value: &Value) -> TesseraResult<()> {
    match acc {
        IntermediateResult::Avg { sum, count } => {
            *sum += numeric(value)?;
            *count += 1;
            Ok(())
        }
        other => Err(expect_result!(other, "avg")),
    }
}

fn avg_merge(left: IntermediateResult, right: IntermediateResult) -> TesseraResult<IntermediateResult> {
    match (&left, &right) {
        (
            IntermediateResult::Avg { sum: s1, count: c1 },
            IntermediateResult::Avg { sum: s2, count: c2 },
        ) => Ok(IntermediateResult::Avg {
            sum: s1 + s2,
            count: c1 + c2,
        }),
        _ => mismatch(&left, &right),
    }
}

fn avg_final(result: &IntermediateResult) -> TesseraResult<Value> {
    match result {
        IntermediateResult::Avg { count: 0, .. } => Ok(Value::Double(f64::NEG_INFINITY)),
        IntermediateResult::Avg { sum, count } => Ok(Value::Double(sum / *count as f64)),
        other => Err(expect_result!(other, "avg")),
    }
}

fn range_init() -> IntermediateResult {
    IntermediateResult::MinMax {
        min: f64::INFINITY,
        max: f64::NEG_INFINITY,
    }
}

fn range_aggregate(acc: &mut IntermediateResult, value: &Value) -> TesseraResult<()> {
    match acc {
        IntermediateResult::MinMax { min, max } => {
            let v = numeric(value)?;
            *min = min.min(v);
            *max = max.max(v);
            Ok(())
        }
        other => Err(expect_result!(other, "minmax")),
    }
}

fn range_merge(left: IntermediateResult, right: IntermediateResult) -> TesseraResult<IntermediateResult> {
    match (&left, &right) {
        (
            IntermediateResult::MinMax { min: min1, max: max1 },
            IntermediateResult::MinMax { min: min2, max: max2 },
        ) => Ok(IntermediateResult::MinMax {
            min: min1.min(*min2),
            max: max1.max(*max2),
        }),
        _ => mismatch(&left, &right),
    }
}

fn range_final(result: &IntermediateResult) -> TesseraResult<Value> {
    match result {
        IntermediateResult::MinMax { min, max } if min > max => Ok(Value::Double(f64::NEG_INFINITY)),
        IntermediateResult::MinMax { min, max } => Ok(Value::Double(max - min)),
        other => Err(expect_result!(other, "minmax")),
    }
}

fn distinct_init() -> IntermediateResult {
    IntermediateResult::Distinct(FxHashSet::default())
}

fn distinct_aggregate(acc: &mut IntermediateResult, value: &Value) -> TesseraResult<()> {
    match acc {
        IntermediateResult::Distinct(values) => {
            values.insert(value.clone());
            Ok(())
        }
        other => Err(expect_result!(other, "distinct")),
    }
}

fn distinct_merge(left: IntermediateResult, right: IntermediateResult) -> TesseraResult<IntermediateResult> {
    match (left, right) {
        (IntermediateResult::Distinct(mut a), IntermediateResult::Distinct(b)) => {
            if a.len() < b.len() {
                return distinct_merge(IntermediateResult::Distinct(b), IntermediateResult::Distinct(a));
            }
            a.extend(b);
            Ok(IntermediateResult::Distinct(a))
        }
        (left, right) => mismatch(&left, &right),
    }
}

fn distinct_final(result: &IntermediateResult) -> TesseraResult<Value> {
    match result {
        IntermediateResult::Distinct(values) => Ok(Value::Long(i64::try_from(values.len())?)),
        other => Err(expect_result!(other, "distinct")),
    }
}

impl AggregationFunction {
    pub fn new(function_type: AggregationFunctionType, column: impl Into<String>) -> Self {
        let (init, aggregate, merge, extract_final_result): (InitFn, AggregateFn, MergeFn, ExtractFn) =
            match function_type {
                AggregationFunctionType::Count => (count_init, count_aggregate, long_merge, scalar_final),
                AggregationFunctionType::Sum => (sum_init, sum_aggregate, sum_merge, scalar_final),
                AggregationFunctionType::Min => (min_init, min_aggregate, min_merge, scalar_final),
                AggregationFunctionType::Max => (max_init, max_aggregate, max_merge, scalar_final),
                AggregationFunctionType::Avg => (avg_init, avg_aggregate, avg_merge, avg_final),
                AggregationFunctionType::MinMaxRange => {
                    (range_init, range_aggregate, range_merge, range_final)
                }
                AggregationFunctionType::DistinctCount => {
                    (distinct_init, distinct_aggregate, distinct_merge, distinct_final)
                }
            };
        Self {
            function_type,
            column: column.into(),
            init,
            aggregate,
            merge,
            extract_final_result,
            is_intermediate_result_comparable: function_type.is_intermediate_result_comparable(),
        }
    }

    /// Parse a `(function, column)` pair such as `("SUM", "salary")`.
    pub fn parse(function: &str, column: impl Into<String>) -> TesseraResult<Self> {
        Ok(Self::new(function.parse()?, column))
    }

    pub fn function_type(&self) -> AggregationFunctionType {
        self.function_type
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    /// Name of the result column, e.g. `sum_salary`.
    pub fn result_column_name(&self) -> String {
        let column = if self.column == "*" { "star" } else { &self.column };
        format!("{}_{}", self.function_type.name(), column.to_lowercase())
    }

    pub fn is_intermediate_result_comparable(&self) -> bool {
        self.is_intermediate_result_comparable
    }

    /// The empty intermediate result.
    pub fn init(&self) -> IntermediateResult {
        (self.init)()
    }

    /// Fold one value into `acc`.
    pub fn aggregate(&self, acc: &mut IntermediateResult, value: &Value) -> TesseraResult<()> {
        (self.aggregate)(acc, value)
    }

    /// Fold every value of a multi-value cell into `acc`.
    pub fn aggregate_mv(&self, acc: &mut IntermediateResult, values: &[Value]) -> TesseraResult<()> {
        values.iter().try_for_each(|v| (self.aggregate)(acc, v))
    }

    /// The intermediate result of a single value.
    pub fn from_value(&self, value: &Value) -> TesseraResult<IntermediateResult> {
        let mut acc = self.init();
        self.aggregate(&mut acc, value)?;
        Ok(acc)
    }

    /// Combine two intermediate results; associative and commutative.
    pub fn merge(&self, left: IntermediateResult, right: IntermediateResult) -> TesseraResult<IntermediateResult> {
        (self.merge)(left, right)
    }

    pub fn extract_final_result(&self, result: &IntermediateResult) -> TesseraResult<Value> {
        (self.extract_final_result)(result)
    }

    /// The value to order by: the intermediate result when it is comparable, else the final one.
    pub fn order_by_value(&self, result: &IntermediateResult) -> TesseraResult<Value> {
        if self.is_intermediate_result_comparable {
            if let Some(value) = result.as_value() {
                return Ok(value);
            }
            tessera_bail!(MismatchedTypes: "long or double", result.name());
        }
        self.extract_final_result(result)
    }
}

#[cfg(test)]
mod test {
    use rstest::rstest;
    use tessera_dtype::Value;

    use crate::{AggregationFunction, AggregationFunctionType, IntermediateResult};

    const SALARIES: [i32; 6] = [3, 5, 2, 8, 9, 1];

    fn fold(function: &AggregationFunction, values: &[i32]) -> IntermediateResult {
        let mut acc = function.init();
        for v in values {
            function.aggregate(&mut acc, &Value::Int(*v)).unwrap();
        }
        acc
    }

    #[rstest]
    #[case(AggregationFunctionType::Count, Value::Long(6))]
    #[case(AggregationFunctionType::Sum, Value::Double(28.0))]
    #[case(AggregationFunctionType::Min, Value::Double(1.0))]
    #[case(AggregationFunctionType::Max, Value::Double(9.0))]
    #[case(AggregationFunctionType::Avg, Value::Double(28.0 / 6.0))]
    #[case(AggregationFunctionType::MinMaxRange, Value::Double(8.0))]
    #[case(AggregationFunctionType::DistinctCount, Value::Long(6))]
    fn split_merge_equals_whole(#[case] function_type: AggregationFunctionType, #[case] expected: Value) {
        let function = AggregationFunction::new(function_type, "salary");
        let whole = fold(&function, &SALARIES);
        let merged = function
            .merge(fold(&function, &SALARIES[..2]), fold(&function, &SALARIES[2..]))
            .unwrap();
        assert_eq!(function.extract_final_result(&whole).unwrap(), expected);
        assert_eq!(function.extract_final_result(&merged).unwrap(), expected);
    }

    #[test]
    fn result_column_names() {
        assert_eq!(AggregationFunction::new(AggregationFunctionType::Sum, "Salary").result_column_name(), "sum_salary");
        assert_eq!(AggregationFunction::new(AggregationFunctionType::Count, "*").result_column_name(), "count_star");
    }

    #[test]
    fn empty_results() {
        let avg = AggregationFunction::new(AggregationFunctionType::Avg, "salary");
        assert_eq!(avg.extract_final_result(&avg.init()).unwrap(), Value::Double(f64::NEG_INFINITY));
        let range = AggregationFunction::new(AggregationFunctionType::MinMaxRange, "salary");
        assert_eq!(range.extract_final_result(&range.init()).unwrap(), Value::Double(f64::NEG_INFINITY));
    }

    #[test]
    fn order_by_value_uses_final_result_when_not_comparable() {
        let avg = AggregationFunction::new(AggregationFunctionType::Avg, "salary");
        let acc = IntermediateResult::Avg { sum: 9.0, count: 2 };
        assert_eq!(avg.order_by_value(&acc).unwrap(), Value::Double(4.5));
        let sum = AggregationFunction::new(AggregationFunctionType::Sum, "salary");
        assert_eq!(sum.order_by_value(&IntermediateResult::Double(3.0)).unwrap(), Value::Double(3.0));
    }

    #[test]
    fn mismatched_results_rejected() {
        let sum = AggregationFunction::new(AggregationFunctionType::Sum, "salary");
        assert!(sum.merge(IntermediateResult::Double(1.0), IntermediateResult::Long(1)).is_err());
        let mut acc = sum.init();
        assert!(sum.aggregate(&mut acc, &Value::from("x")).is_err());
    }

    #[test]
    fn distinct_count_over_strings() {
        let distinct = AggregationFunction::parse("distinctCount", "country").unwrap();
        let mut acc = distinct.init();
        distinct
            .aggregate_mv(&mut acc, &["IN", "CH", "IN"].map(Value::from))
            .unwrap();
        assert_eq!(distinct.extract_final_result(&acc).unwrap(), Value::Long(2));
    }
}
