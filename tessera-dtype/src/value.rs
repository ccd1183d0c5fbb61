use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};

use num_traits::NumCast;
use paste::paste;
use serde::{Deserialize, Serialize};
use tessera_error::{TesseraResult, tessera_bail, tessera_err};

use crate::DataType;

/// A single typed cell.
///
/// Floats compare and hash by their IEEE total order, so every value can be used as a key.
/// Values of different types are never equal and order by their [`DataType`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    /// An [`DataType::Int`] value.
    Int(i32),
    /// A [`DataType::Long`] value.
    Long(i64),
    /// A [`DataType::Float`] value.
    Float(f32),
    /// A [`DataType::Double`] value.
    Double(f64),
    /// A [`DataType::String`] value.
    String(String),
    /// A [`DataType::Bytes`] value.
    Bytes(Vec<u8>),
}

macro_rules! as_primitive {
    ($T:ty) => {
        paste! {
            #[doc = "Access a numeric value as `" $T "`, returning `None` for non-numeric values or lossy conversions"]
            pub fn [<as_ $T>](&self) -> Option<$T> {
                match self {
                    Value::Int(v) => <$T as NumCast>::from(*v),
                    Value::Long(v) => <$T as NumCast>::from(*v),
                    Value::Float(v) => <$T as NumCast>::from(*v),
                    Value::Double(v) => <$T as NumCast>::from(*v),
                    Value::String(_) | Value::Bytes(_) => None,
                }
            }
        }
    };
}

impl Value {
    /// The type of this value.
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Int(_) => DataType::Int,
            Self::Long(_) => DataType::Long,
            Self::Float(_) => DataType::Float,
            Self::Double(_) => DataType::Double,
            Self::String(_) => DataType::String,
            Self::Bytes(_) => DataType::Bytes,
        }
    }

    as_primitive!(i32);
    as_primitive!(i64);
    as_primitive!(f32);
    as_primitive!(f64);

    /// Borrow a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Borrow the bytes of a string or bytes value.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::String(s) => Some(s.as_bytes()),
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Convert this value to `dtype`.
    ///
    /// Numbers convert between numeric types when the conversion is lossless for integers, and
    /// with rounding for floats. Strings and bytes only convert between each other.
    pub fn cast(&self, dtype: DataType) -> TesseraResult<Value> {
        if self.data_type() == dtype {
            return Ok(self.clone());
        }
        let cast = match dtype {
            DataType::Int => self.as_i32().map(Value::Int),
            DataType::Long => self.as_i64().map(Value::Long),
            DataType::Float => self.as_f32().map(Value::Float),
            DataType::Double => self.as_f64().map(Value::Double),
            DataType::String => match self {
                Self::Bytes(b) => String::from_utf8(b.clone()).ok().map(Value::String),
                _ => None,
            },
            DataType::Bytes => self.as_bytes().map(|b| Value::Bytes(b.to_vec())),
        };
        cast.ok_or_else(|| tessera_err!(MismatchedTypes: dtype, self.data_type()))
    }

    /// Append the little-endian encoding of a fixed-width value to `out`.
    pub fn write_le(&self, out: &mut Vec<u8>) {
        match self {
            Self::Int(v) => out.extend_from_slice(&v.to_le_bytes()),
            Self::Long(v) => out.extend_from_slice(&v.to_le_bytes()),
            Self::Float(v) => out.extend_from_slice(&v.to_le_bytes()),
            Self::Double(v) => out.extend_from_slice(&v.to_le_bytes()),
            Self::String(s) => out.extend_from_slice(s.as_bytes()),
            Self::Bytes(b) => out.extend_from_slice(b),
        }
    }

    /// Decode a value of type `dtype` from exactly its encoded bytes.
    pub fn from_le_bytes(dtype: DataType, bytes: &[u8]) -> TesseraResult<Value> {
        if let Some(width) = dtype.byte_width() {
            if bytes.len() != width {
                tessera_bail!(
                    InvalidSerde: "expected {} bytes for {}, found {}",
                    width,
                    dtype,
                    bytes.len()
                );
            }
        }
        Ok(match dtype {
            DataType::Int => Value::Int(i32::from_le_bytes(fixed(bytes)?)),
            DataType::Long => Value::Long(i64::from_le_bytes(fixed(bytes)?)),
            DataType::Float => Value::Float(f32::from_le_bytes(fixed(bytes)?)),
            DataType::Double => Value::Double(f64::from_le_bytes(fixed(bytes)?)),
            DataType::String => Value::String(
                std::str::from_utf8(bytes)
                    .map_err(|e| tessera_err!(InvalidSerde: "invalid utf-8 string: {}", e))?
                    .to_string(),
            ),
            DataType::Bytes => Value::Bytes(bytes.to_vec()),
        })
    }

    fn compare_same_type(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (Self::Long(a), Self::Long(b)) => Some(a.cmp(b)),
            (Self::Float(a), Self::Float(b)) => Some(a.total_cmp(b)),
            (Self::Double(a), Self::Double(b)) => Some(a.total_cmp(b)),
            (Self::String(a), Self::String(b)) => Some(a.cmp(b)),
            (Self::Bytes(a), Self::Bytes(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

/// Decode a fixed-width little-endian number of type `dtype` straight into `T`.
pub fn numeric_from_le_bytes<T: NumCast>(dtype: DataType, bytes: &[u8]) -> TesseraResult<T> {
    let cast = match dtype {
        DataType::Int => <T as NumCast>::from(i32::from_le_bytes(fixed(bytes)?)),
        DataType::Long => <T as NumCast>::from(i64::from_le_bytes(fixed(bytes)?)),
        DataType::Float => <T as NumCast>::from(f32::from_le_bytes(fixed(bytes)?)),
        DataType::Double => <T as NumCast>::from(f64::from_le_bytes(fixed(bytes)?)),
        DataType::String | DataType::Bytes => {
            tessera_bail!(MismatchedTypes: "numeric", dtype)
        }
    };
    cast.ok_or_else(|| tessera_err!(InvalidArgument: "{} value does not fit the requested type", dtype))
}

fn fixed<const N: usize>(bytes: &[u8]) -> TesseraResult<[u8; N]> {
    <[u8; N]>::try_from(bytes)
        .map_err(|_| tessera_err!(InvalidSerde: "expected {} bytes, found {}", N, bytes.len()))
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare_same_type(other)
            .unwrap_or_else(|| self.data_type().cmp(&other.data_type()))
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.data_type().hash(state);
        match self {
            Self::Int(v) => v.hash(state),
            Self::Long(v) => v.hash(state),
            Self::Float(v) => v.to_bits().hash(state),
            Self::Double(v) => v.to_bits().hash(state),
            Self::String(v) => v.hash(state),
            Self::Bytes(v) => v.hash(state),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Long(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "{v}"),
            Self::Bytes(v) => {
                for b in v {
                    write!(f, "{b:02x}")?;
                }
                Ok(())
            }
        }
    }
}

macro_rules! value_from {
    ($T:ty, $variant:ident) => {
        impl From<$T> for Value {
            fn from(value: $T) -> Self {
                Value::$variant(value)
            }
        }
    };
}

value_from!(i32, Int);
value_from!(i64, Long);
value_from!(f32, Float);
value_from!(f64, Double);
value_from!(String, String);
value_from!(Vec<u8>, Bytes);

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashSet;

    use rstest::rstest;

    use crate::{DataType, Value, numeric_from_le_bytes};

    #[test]
    fn floats_are_totally_ordered() {
        let mut values = vec![
            Value::Double(f64::NAN),
            Value::Double(1.5),
            Value::Double(-0.0),
            Value::Double(0.0),
        ];
        values.sort();
        assert_eq!(values[0], Value::Double(-0.0));
        assert_eq!(values[1], Value::Double(0.0));
        assert_eq!(values[2], Value::Double(1.5));
        assert_ne!(Value::Double(0.0), Value::Double(-0.0));
        let set: HashSet<Value> = values.into_iter().collect();
        assert_eq!(set.len(), 4);
    }

    #[test]
    fn different_types_are_not_equal() {
        assert_ne!(Value::Int(1), Value::Long(1));
        assert!(Value::Int(100) < Value::Long(1));
    }

    #[rstest]
    #[case(Value::Int(7), DataType::Long, Value::Long(7))]
    #[case(Value::Long(3), DataType::Double, Value::Double(3.0))]
    #[case(Value::Double(2.0), DataType::Int, Value::Int(2))]
    #[case(Value::Bytes(b"ab".to_vec()), DataType::String, Value::from("ab"))]
    fn casts(#[case] value: Value, #[case] dtype: DataType, #[case] expected: Value) {
        assert_eq!(value.cast(dtype).unwrap(), expected);
    }

    #[test]
    fn cast_string_to_number_fails() {
        assert!(Value::from("IN").cast(DataType::Int).is_err());
        assert!(Value::Long(i64::MAX).cast(DataType::Int).is_err());
    }

    #[rstest]
    #[case(Value::Int(-12))]
    #[case(Value::Long(1 << 40))]
    #[case(Value::Float(0.25))]
    #[case(Value::Double(-3.75))]
    #[case(Value::from("Zackie"))]
    fn le_encoding(#[case] value: Value) {
        let mut out = Vec::new();
        value.write_le(&mut out);
        assert_eq!(Value::from_le_bytes(value.data_type(), &out).unwrap(), value);
    }

    #[test]
    fn numeric_decoding() {
        let bytes = 42i64.to_le_bytes();
        assert_eq!(numeric_from_le_bytes::<f64>(DataType::Long, &bytes).unwrap(), 42.0);
        assert_eq!(numeric_from_le_bytes::<i32>(DataType::Long, &bytes).unwrap(), 42);
        assert!(numeric_from_le_bytes::<i32>(DataType::String, b"ab").is_err());
    }

    #[test]
    fn short_fixed_width_rejected() {
        assert!(Value::from_le_bytes(DataType::Long, &[0u8; 4]).is_err());
    }
}
