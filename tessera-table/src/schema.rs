use serde::{Deserialize, Serialize};
use tessera_aggregate::AggregationFunction;
use tessera_error::{TesseraError, TesseraResult, tessera_bail};

/// Column names of a result table: the key columns followed by one column per aggregation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSchema {
    key_columns: Vec<String>,
    aggregation_columns: Vec<String>,
}

impl DataSchema {
    pub fn new(key_columns: Vec<String>, functions: &[AggregationFunction]) -> Self {
        Self {
            key_columns,
            aggregation_columns: functions.iter().map(AggregationFunction::result_column_name).collect(),
        }
    }

    pub fn key_columns(&self) -> &[String] {
        &self.key_columns
    }

    pub fn aggregation_columns(&self) -> &[String] {
        &self.aggregation_columns
    }

    pub fn num_columns(&self) -> usize {
        self.key_columns.len() + self.aggregation_columns.len()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.key_columns
            .iter()
            .chain(&self.aggregation_columns)
            .map(String::as_str)
    }
}

/// One column of an order-by clause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderByExpression {
    pub column: String,
    #[serde(default = "ascending_by_default")]
    pub ascending: bool,
}

fn ascending_by_default() -> bool {
    true
}

impl OrderByExpression {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ascending: true,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ascending: false,
        }
    }
}

/// Sizes governing when and how far an indexed table is trimmed.
///
/// `result_size <= evict_capacity < buffered_capacity`: records accumulate up to the buffered
/// capacity, are trimmed back to the evict capacity, and `finish` trims to the result size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawTableCapacity")]
pub struct TableCapacity {
    result_size: usize,
    evict_capacity: usize,
    buffered_capacity: usize,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTableCapacity {
    result_size: usize,
    evict_capacity: usize,
    buffered_capacity: usize,
}

impl TryFrom<RawTableCapacity> for TableCapacity {
    type Error = TesseraError;

    fn try_from(raw: RawTableCapacity) -> Result<Self, Self::Error> {
        Self::new(raw.result_size, raw.evict_capacity, raw.buffered_capacity)
    }
}

impl TableCapacity {
    /// Smallest evict capacity derived from a result size.
    pub const MIN_EVICT_CAPACITY: usize = 5_000;

    pub fn new(result_size: usize, evict_capacity: usize, buffered_capacity: usize) -> TesseraResult<Self> {
        if evict_capacity == 0 {
            tessera_bail!("evict capacity must be positive");
        }
        if result_size > evict_capacity {
            tessera_bail!(
                "result size {} exceeds evict capacity {}",
                result_size,
                evict_capacity
            );
        }
        if buffered_capacity <= evict_capacity {
            tessera_bail!(
                "buffered capacity {} must exceed evict capacity {}",
                buffered_capacity,
                evict_capacity
            );
        }
        Ok(Self {
            result_size,
            evict_capacity,
            buffered_capacity,
        })
    }

    /// Keep five times the result size, at least [`Self::MIN_EVICT_CAPACITY`], and buffer twice that.
    pub fn from_result_size(result_size: usize) -> Self {
        let evict_capacity = result_size.saturating_mul(5).max(Self::MIN_EVICT_CAPACITY);
        Self {
            result_size,
            evict_capacity,
            buffered_capacity: evict_capacity.saturating_mul(2),
        }
    }

    pub fn result_size(&self) -> usize {
        self.result_size
    }

    pub fn evict_capacity(&self) -> usize {
        self.evict_capacity
    }

    pub fn buffered_capacity(&self) -> usize {
        self.buffered_capacity
    }
}
