use std::fmt::{Display, Formatter};
use std::str::FromStr;

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use tessera_aggregate::AggregationFunctionType;
use tessera_error::{TesseraError, TesseraResult, tessera_bail, tessera_err};
use tessera_segment::SegmentMetadata;

/// Column name that stands for "every document" in a `COUNT` pair.
pub const STAR_COLUMN: &str = "*";

fn default_max_leaf_records() -> usize {
    StarTreeConfig::DEFAULT_MAX_LEAF_RECORDS
}

/// One pre-aggregated `(function, column)` pair, written `SUM__salary`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FunctionColumnPair {
    pub function: AggregationFunctionType,
    pub column: String,
}

impl FunctionColumnPair {
    pub fn new(function: AggregationFunctionType, column: impl Into<String>) -> Self {
        Self {
            function,
            column: column.into(),
        }
    }

    pub fn count_star() -> Self {
        Self::new(AggregationFunctionType::Count, STAR_COLUMN)
    }
}

impl Display for FunctionColumnPair {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}__{}", self.function, self.column)
    }
}

impl FromStr for FunctionColumnPair {
    type Err = TesseraError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (function, column) = s
            .split_once("__")
            .ok_or_else(|| tessera_err!("function column pair {} is not of the form FUNCTION__column", s))?;
        Ok(Self::new(function.parse()?, column))
    }
}

impl TryFrom<String> for FunctionColumnPair {
    type Error = TesseraError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FunctionColumnPair> for String {
    fn from(pair: FunctionColumnPair) -> Self {
        pair.to_string()
    }
}

/// How a star-tree is built over a segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StarTreeConfig {
    /// Dimensions in the order the tree splits on them.
    pub dimensions_split_order: Vec<String>,
    /// Dimensions that never get a star child.
    #[serde(default)]
    pub skip_star_node_creation: Vec<String>,
    pub function_column_pairs: Vec<FunctionColumnPair>,
    /// Nodes with at most this many documents are not split further.
    #[serde(default = "default_max_leaf_records")]
    pub max_leaf_records: usize,
}

impl StarTreeConfig {
    pub const DEFAULT_MAX_LEAF_RECORDS: usize = 10_000;

    pub fn new(dimensions_split_order: Vec<String>, function_column_pairs: Vec<FunctionColumnPair>) -> Self {
        Self {
            dimensions_split_order,
            skip_star_node_creation: Vec::new(),
            function_column_pairs,
            max_leaf_records: Self::DEFAULT_MAX_LEAF_RECORDS,
        }
    }

    pub fn with_skip_star_node_creation(mut self, dimensions: Vec<String>) -> Self {
        self.skip_star_node_creation = dimensions;
        self
    }

    pub fn with_max_leaf_records(mut self, max_leaf_records: usize) -> Self {
        self.max_leaf_records = max_leaf_records;
        self
    }

    pub fn from_json(json: &str) -> TesseraResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Check the configuration against the columns of the segment it will be built over.
    pub fn validate(&self, metadata: &SegmentMetadata) -> TesseraResult<()> {
        if self.dimensions_split_order.is_empty() {
            tessera_bail!("star-tree needs at least one split dimension");
        }
        if self.max_leaf_records == 0 {
            tessera_bail!("star-tree max leaf records must be positive");
        }
        let mut seen = FxHashSet::default();
        for dimension in &self.dimensions_split_order {
            if !seen.insert(dimension.as_str()) {
                tessera_bail!("dimension {} appears twice in the split order", dimension);
            }
            let column = metadata.column(dimension)?;
            if !column.is_single_value || !column.has_dictionary {
                tessera_bail!(
                    "star-tree dimension {} must be a single-value dictionary-encoded column",
                    dimension
                );
            }
        }
        if let Some(unknown) = self
            .skip_star_node_creation
            .iter()
            .find(|d| !seen.contains(d.as_str()))
        {
            tessera_bail!("star node exclusion {} is not a split dimension", unknown);
        }
        if self.function_column_pairs.is_empty() {
            tessera_bail!("star-tree needs at least one function column pair");
        }
        for pair in &self.function_column_pairs {
            if !pair.function.is_star_tree_supported() {
                tessera_bail!("{} cannot be pre-aggregated by a star-tree", pair.function);
            }
            if pair.column == STAR_COLUMN {
                if pair.function != AggregationFunctionType::Count {
                    tessera_bail!("only COUNT may aggregate over {}", STAR_COLUMN);
                }
                continue;
            }
            let column = metadata.column(&pair.column)?;
            if !column.is_single_value || !column.data_type.is_numeric() {
                tessera_bail!("star-tree metric {} must be a single-value numeric column", pair.column);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use tessera_aggregate::AggregationFunctionType;

    use crate::{FunctionColumnPair, StarTreeConfig};

    #[test]
    fn parses_json() {
        let config = StarTreeConfig::from_json(
            r#"{
                "dimensionsSplitOrder": ["name", "country"],
                "skipStarNodeCreation": ["country"],
                "functionColumnPairs": ["SUM__salary", "count__*"]
            }"#,
        )
        .unwrap();
        assert_eq!(config.dimensions_split_order, ["name", "country"]);
        assert_eq!(config.skip_star_node_creation, ["country"]);
        assert_eq!(
            config.function_column_pairs,
            [
                FunctionColumnPair::new(AggregationFunctionType::Sum, "salary"),
                FunctionColumnPair::count_star()
            ]
        );
        assert_eq!(config.max_leaf_records, StarTreeConfig::DEFAULT_MAX_LEAF_RECORDS);
    }

    #[test]
    fn rejects_malformed_pair() {
        assert!("SUM_salary".parse::<FunctionColumnPair>().is_err());
        assert!("MEDIAN__salary".parse::<FunctionColumnPair>().is_err());
    }
}
