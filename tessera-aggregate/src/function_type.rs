use std::fmt::{Display, Formatter};
use std::str::FromStr;

use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
use tessera_error::{TesseraError, tessera_err};

/// The closed set of supported aggregation functions.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    IntoPrimitive,
    TryFromPrimitive,
    Serialize,
    Deserialize,
)]
#[repr(u8)]
#[serde(rename_all = "UPPERCASE")]
pub enum AggregationFunctionType {
    Count = 0,
    Sum = 1,
    Min = 2,
    Max = 3,
    Avg = 4,
    MinMaxRange = 5,
    DistinctCount = 6,
}

impl AggregationFunctionType {
    pub const ALL: [Self; 7] = [
        Self::Count,
        Self::Sum,
        Self::Min,
        Self::Max,
        Self::Avg,
        Self::MinMaxRange,
        Self::DistinctCount,
    ];

    /// Lower-case name, used as the prefix of result column names.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Sum => "sum",
            Self::Min => "min",
            Self::Max => "max",
            Self::Avg => "avg",
            Self::MinMaxRange => "minmaxrange",
            Self::DistinctCount => "distinctcount",
        }
    }

    /// Whether intermediate results order the same way as final results.
    pub fn is_intermediate_result_comparable(&self) -> bool {
        !matches!(self, Self::Avg | Self::MinMaxRange | Self::DistinctCount)
    }

    /// Whether a star-tree can pre-aggregate this function into a single number per node.
    pub fn is_star_tree_supported(&self) -> bool {
        matches!(self, Self::Count | Self::Sum | Self::Min | Self::Max)
    }
}

impl Display for AggregationFunctionType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name().to_uppercase())
    }
}

impl FromStr for AggregationFunctionType {
    type Err = TesseraError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| tessera_err!("unknown aggregation function {}", s))
    }
}

#[cfg(test)]
mod test {
    use rstest::rstest;

    use crate::AggregationFunctionType;

    #[rstest]
    #[case("sum", AggregationFunctionType::Sum)]
    #[case("COUNT", AggregationFunctionType::Count)]
    #[case("MinMaxRange", AggregationFunctionType::MinMaxRange)]
    fn parse(#[case] name: &str, #[case] expected: AggregationFunctionType) {
        assert_eq!(name.parse::<AggregationFunctionType>().unwrap(), expected);
    }

    #[test]
    fn unknown_name_rejected() {
        assert!("median".parse::<AggregationFunctionType>().is_err());
    }

    #[test]
    fn serde_names() {
        assert_eq!(
            serde_json::to_string(&AggregationFunctionType::DistinctCount).unwrap(),
            "\"DISTINCTCOUNT\""
        );
        let parsed: AggregationFunctionType = serde_json::from_str("\"MAX\"").unwrap();
        assert_eq!(parsed, AggregationFunctionType::Max);
    }

    #[test]
    fn comparability() {
        assert!(AggregationFunctionType::Sum.is_intermediate_result_comparable());
        assert!(!AggregationFunctionType::Avg.is_intermediate_result_comparable());
        assert!(!AggregationFunctionType::DistinctCount.is_star_tree_supported());
    }
}
