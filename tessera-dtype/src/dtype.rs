use std::fmt::{Display, Formatter};

use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};

/// The physical type of a column.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    IntoPrimitive,
    TryFromPrimitive,
    Serialize,
    Deserialize,
)]
#[repr(u8)]
#[serde(rename_all = "UPPERCASE")]
pub enum DataType {
    /// 32-bit signed integer.
    Int = 0,
    /// 64-bit signed integer.
    Long = 1,
    /// 32-bit IEEE float.
    Float = 2,
    /// 64-bit IEEE float.
    Double = 3,
    /// UTF-8 string.
    String = 4,
    /// Opaque bytes.
    Bytes = 5,
}

impl DataType {
    /// Width in bytes of a single value, or `None` for variable-width types.
    pub const fn byte_width(&self) -> Option<usize> {
        match self {
            Self::Int | Self::Float => Some(4),
            Self::Long | Self::Double => Some(8),
            Self::String | Self::Bytes => None,
        }
    }

    /// Whether values of this type are numbers.
    pub const fn is_numeric(&self) -> bool {
        self.byte_width().is_some()
    }

    /// Whether values of this type are floating point numbers.
    pub const fn is_float(&self) -> bool {
        matches!(self, Self::Float | Self::Double)
    }
}

impl Display for DataType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int => write!(f, "INT"),
            Self::Long => write!(f, "LONG"),
            Self::Float => write!(f, "FLOAT"),
            Self::Double => write!(f, "DOUBLE"),
            Self::String => write!(f, "STRING"),
            Self::Bytes => write!(f, "BYTES"),
        }
    }
}

#[cfg(test)]
mod test {
    use rstest::rstest;

    use crate::DataType;

    #[rstest]
    #[case(DataType::Int, Some(4))]
    #[case(DataType::Double, Some(8))]
    #[case(DataType::String, None)]
    fn widths(#[case] dtype: DataType, #[case] width: Option<usize>) {
        assert_eq!(dtype.byte_width(), width);
        assert_eq!(dtype.is_numeric(), width.is_some());
    }

    #[test]
    fn serde_names() {
        assert_eq!(serde_json::to_string(&DataType::Long).unwrap(), "\"LONG\"");
        let parsed: DataType = serde_json::from_str("\"STRING\"").unwrap();
        assert_eq!(parsed, DataType::String);
        assert_eq!(DataType::try_from(3u8).unwrap(), DataType::Double);
    }
}
