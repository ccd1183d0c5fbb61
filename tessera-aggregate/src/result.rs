use rustc_hash::FxHashSet;
use tessera_dtype::Value;

/// Partial state of an aggregation, merged across documents, segments and tables.
#[derive(Debug, Clone, PartialEq)]
pub enum IntermediateResult {
    Long(i64),
    Double(f64),
    Avg { sum: f64, count: u64 },
    MinMax { min: f64, max: f64 },
    Distinct(FxHashSet<Value>),
}

impl IntermediateResult {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Long(_) => "long",
            Self::Double(_) => "double",
            Self::Avg { .. } => "avg",
            Self::MinMax { .. } => "minmax",
            Self::Distinct(_) => "distinct",
        }
    }

    /// The result as a comparable value, for the variants that have one.
    pub fn as_value(&self) -> Option<Value> {
        match self {
            Self::Long(v) => Some(Value::Long(*v)),
            Self::Double(v) => Some(Value::Double(*v)),
            Self::Avg { .. } | Self::MinMax { .. } | Self::Distinct(_) => None,
        }
    }
}
