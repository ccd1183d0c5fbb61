use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use std::ops::Bound;

use tessera_dtype::Value;

/// Comparison applied to the values of one column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PredicateOp {
    Eq(Value),
    NotEq(Value),
    In(Vec<Value>),
    NotIn(Vec<Value>),
    Range { lower: Bound<Value>, upper: Bound<Value> },
}

/// A predicate over a single column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    pub column: String,
    pub op: PredicateOp,
}

/// Boolean combination of predicates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterExpr {
    Predicate(Predicate),
    And(Vec<FilterExpr>),
    Or(Vec<FilterExpr>),
}

impl Predicate {
    pub fn new(column: impl Into<String>, op: PredicateOp) -> Self {
        Self {
            column: column.into(),
            op,
        }
    }

    pub fn equals(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, PredicateOp::Eq(value.into()))
    }

    pub fn not_equals(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, PredicateOp::NotEq(value.into()))
    }

    pub fn in_values<V: Into<Value>>(column: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Self::new(column, PredicateOp::In(values.into_iter().map(Into::into).collect()))
    }

    pub fn not_in<V: Into<Value>>(column: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Self::new(column, PredicateOp::NotIn(values.into_iter().map(Into::into).collect()))
    }

    pub fn range<V: Into<Value>>(column: impl Into<String>, lower: Bound<V>, upper: Bound<V>) -> Self {
        Self::new(
            column,
            PredicateOp::Range {
                lower: lower.map(Into::into),
                upper: upper.map(Into::into),
            },
        )
    }
}

impl From<Predicate> for FilterExpr {
    fn from(predicate: Predicate) -> Self {
        FilterExpr::Predicate(predicate)
    }
}

impl FilterExpr {
    pub fn and(children: impl IntoIterator<Item = FilterExpr>) -> Self {
        FilterExpr::And(children.into_iter().collect())
    }

    pub fn or(children: impl IntoIterator<Item = FilterExpr>) -> Self {
        FilterExpr::Or(children.into_iter().collect())
    }
}

/// Compare a column value with a literal of possibly different type.
///
/// Integers compare as `i64`, mixed integer and float as `f64`, strings and bytes bytewise.
/// Numbers never compare with strings or bytes.
pub fn compare_literal(value: &Value, literal: &Value) -> Option<Ordering> {
    let (value_type, literal_type) = (value.data_type(), literal.data_type());
    if value_type == literal_type {
        return Some(value.cmp(literal));
    }
    match (value.as_bytes(), literal.as_bytes()) {
        (Some(a), Some(b)) => Some(a.cmp(b)),
        (None, None) if !value_type.is_float() && !literal_type.is_float() => {
            Some(value.as_i64()?.cmp(&literal.as_i64()?))
        }
        (None, None) => Some(value.as_f64()?.total_cmp(&literal.as_f64()?)),
        _ => None,
    }
}

fn within(value: &Value, lower: &Bound<Value>, upper: &Bound<Value>) -> bool {
    let above = match lower {
        Bound::Unbounded => true,
        Bound::Included(l) => compare_literal(value, l).is_some_and(Ordering::is_ge),
        Bound::Excluded(l) => compare_literal(value, l).is_some_and(Ordering::is_gt),
    };
    above
        && match upper {
            Bound::Unbounded => true,
            Bound::Included(u) => compare_literal(value, u).is_some_and(Ordering::is_le),
            Bound::Excluded(u) => compare_literal(value, u).is_some_and(Ordering::is_lt),
        }
}

impl PredicateOp {
    /// Whether a single column value satisfies this comparison.
    pub fn matches(&self, value: &Value) -> bool {
        let equals = |literal: &Value| compare_literal(value, literal) == Some(Ordering::Equal);
        match self {
            Self::Eq(literal) => equals(literal),
            Self::NotEq(literal) => !equals(literal),
            Self::In(literals) => literals.iter().any(equals),
            Self::NotIn(literals) => !literals.iter().any(equals),
            Self::Range { lower, upper } => within(value, lower, upper),
        }
    }
}

fn fmt_bound(bound: &Bound<Value>, f: &mut Formatter<'_>, open: &str, closed: &str, none: &str) -> std::fmt::Result {
    match bound {
        Bound::Included(v) => write!(f, "{closed}{v}"),
        Bound::Excluded(v) => write!(f, "{open}{v}"),
        Bound::Unbounded => write!(f, "{none}"),
    }
}

impl Display for Predicate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let list = |values: &[Value]| values.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
        match &self.op {
            PredicateOp::Eq(v) => write!(f, "{} = {}", self.column, v),
            PredicateOp::NotEq(v) => write!(f, "{} != {}", self.column, v),
            PredicateOp::In(vs) => write!(f, "{} IN ({})", self.column, list(vs)),
            PredicateOp::NotIn(vs) => write!(f, "{} NOT IN ({})", self.column, list(vs)),
            PredicateOp::Range { lower, upper } => {
                write!(f, "{} IN ", self.column)?;
                fmt_bound(lower, f, "(", "[", "(*")?;
                write!(f, ", ")?;
                fmt_bound(upper, f, "", "", "*")?;
                let close = if matches!(upper, Bound::Included(_)) { "]" } else { ")" };
                write!(f, "{close}")
            }
        }
    }
}
