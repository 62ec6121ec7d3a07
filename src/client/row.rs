//! Row-oriented view of query results.
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::value::{Decimal, Value};

/// One result row: the values of every column, with the column names shared across the
/// rows of a block.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<Vec<String>>,
    values: Vec<Value>,
}

impl Row {
    pub(crate) fn new(columns: Arc<Vec<String>>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// The raw value at a position or under a column name.
    pub fn value<I: ColumnIndex>(&self, index: I) -> Option<&Value> {
        index.position(&self.columns).and_then(|i| self.values.get(i))
    }

    /// Converts the value at `index`.
    ///
    /// ```ignore
    /// let id: u64 = row.get(0)?;
    /// let name: Option<String> = row.get("userName")?;
    /// ```
    pub fn get<T: FromValue, I: ColumnIndex>(&self, index: I) -> Result<T> {
        let value = index
            .position(&self.columns)
            .and_then(|i| self.values.get(i))
            .ok_or_else(|| Error::Conversion(format!("no column {}", index.describe())))?;
        T::from_value(value.clone())
    }
}

/// Something that picks a column out of a row.
pub trait ColumnIndex {
    fn position(&self, columns: &[String]) -> Option<usize>;

    fn describe(&self) -> String;
}

impl ColumnIndex for usize {
    fn position(&self, columns: &[String]) -> Option<usize> {
        (*self < columns.len()).then_some(*self)
    }

    fn describe(&self) -> String {
        format!("at index {self}")
    }
}

/// Name lookup tries an exact match, then ignores case, then the snake_case and camelCase
/// spellings of the name.
impl ColumnIndex for &str {
    fn position(&self, columns: &[String]) -> Option<usize> {
        let name = *self;
        columns
            .iter()
            .position(|c| c == name)
            .or_else(|| columns.iter().position(|c| c.eq_ignore_ascii_case(name)))
            .or_else(|| {
                let snake = to_snake_case(name);
                columns.iter().position(|c| *c == snake)
            })
            .or_else(|| {
                let camel = to_camel_case(name);
                columns.iter().position(|c| *c == camel)
            })
    }

    fn describe(&self) -> String {
        format!("named {self:?}")
    }
}

fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, ch) in name.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

fn to_camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = false;
    for ch in name.chars() {
        if ch == '_' {
            upper = !out.is_empty();
        } else if upper {
            out.push(ch.to_ascii_uppercase());
            upper = false;
        } else {
            out.push(ch);
        }
    }
    out
}

/// Conversion out of a dynamically-typed [`Value`].
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self>;
}

fn mismatch<T>(expected: &str, value: &Value) -> Result<T> {
    if value.is_null() {
        Err(Error::Conversion(format!("NULL cannot be read as {expected}")))
    } else {
        Err(Error::Conversion(format!("cannot read {} as {expected}", value.kind())))
    }
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self> {
        Ok(value)
    }
}

macro_rules! from_integer {
    ($($ty:ty),*) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: Value) -> Result<Self> {
                    match value.as_i128() {
                        Some(v) => <$ty>::try_from(v).map_err(|_| {
                            Error::Conversion(format!("{v} out of range for {}", stringify!($ty)))
                        }),
                        None => mismatch(stringify!($ty), &value),
                    }
                }
            }
        )*
    };
}

from_integer!(i8, i16, i32, i64, i128, u8, u16, u32, u64, u128, isize, usize);

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self> {
        value.as_f64().map_or_else(|| mismatch("f64", &value), Ok)
    }
}

impl FromValue for f32 {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Float32(v) => Ok(v),
            other => other.as_f64().map_or_else(|| mismatch("f32", &other), |v| Ok(v as f32)),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Bool(v) => Ok(v),
            other => other.as_i128().map_or_else(|| mismatch("bool", &other), |v| Ok(v != 0)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::String(s) => Ok(s),
            Value::Bytes(b) => {
                String::from_utf8(b).map_err(|e| Error::Conversion(format!("bytes are not UTF-8: {e}")))
            }
            other => mismatch("String", &other),
        }
    }
}

impl FromValue for Uuid {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Uuid(u) => Ok(u),
            Value::String(s) => {
                Uuid::parse_str(&s).map_err(|e| Error::Conversion(format!("invalid UUID {s:?}: {e}")))
            }
            other => mismatch("Uuid", &other),
        }
    }
}

impl FromValue for Decimal {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Decimal(d) => Ok(d),
            other => match other.as_i128().map(i64::try_from) {
                Some(Ok(v)) => Ok(Decimal::from(v)),
                _ => mismatch("Decimal", &other),
            },
        }
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Timestamp(t) => Ok(t),
            other => mismatch("DateTime", &other),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

/// Arrays convert element by element. Byte strings read as sequences of `UInt8`.
impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Array(items) => items.into_iter().map(T::from_value).collect(),
            Value::Bytes(bytes) => bytes.into_iter().map(|b| T::from_value(Value::UInt8(b))).collect(),
            Value::String(s) => s.into_bytes().into_iter().map(|b| T::from_value(Value::UInt8(b))).collect(),
            other => mismatch("Array", &other),
        }
    }
}

/// Conversion of a whole row.
pub trait FromRow: Sized {
    fn from_row(row: Row) -> Result<Self>;
}

impl FromRow for Row {
    fn from_row(row: Row) -> Result<Self> {
        Ok(row)
    }
}

macro_rules! from_tuple {
    ($len:literal => $($name:ident),+) => {
        impl<$($name: FromValue),+> FromRow for ($($name,)+) {
            fn from_row(row: Row) -> Result<Self> {
                if row.len() != $len {
                    return Err(Error::Conversion(format!(
                        "row has {} columns, expected {}",
                        row.len(),
                        $len
                    )));
                }
                let mut values = row.into_values().into_iter();
                Ok(($($name::from_value(values.next().unwrap_or_default())?,)+))
            }
        }
    };
}

from_tuple!(1 => A);
from_tuple!(2 => A, B);
from_tuple!(3 => A, B, C);
from_tuple!(4 => A, B, C, D);

#[cfg(test)]
mod tests {
    use super::*;

    fn row(names: &[&str], values: Vec<Value>) -> Row {
        Row::new(Arc::new(names.iter().map(|n| n.to_string()).collect()), values)
    }

    #[test]
    fn lookup_by_index_and_name() {
        let row = row(
            &["user_id", "DisplayName", "createdAt"],
            vec![Value::UInt64(7), Value::from("ann"), Value::Null],
        );
        assert_eq!(row.get::<u64, _>(0usize).unwrap(), 7);
        assert_eq!(row.get::<u64, _>("user_id").unwrap(), 7);
        assert_eq!(row.get::<u64, _>("userId").unwrap(), 7);
        assert_eq!(row.get::<String, _>("displayname").unwrap(), "ann");
        assert_eq!(row.get::<Option<String>, _>("created_at").unwrap(), None);
        assert!(matches!(row.get::<u64, _>(3usize), Err(Error::Conversion(_))));
        assert!(matches!(row.get::<u64, _>("missing"), Err(Error::Conversion(_))));
    }

    #[test]
    fn null_requires_option() {
        let row = row(&["x"], vec![Value::Null]);
        let err = row.get::<i32, _>(0usize).unwrap_err();
        assert_eq!(err.to_string(), "conversion error: NULL cannot be read as i32");
        assert_eq!(row.get::<Option<i32>, _>(0usize).unwrap(), None);
    }

    #[test]
    fn integer_range_is_checked() {
        assert_eq!(u8::from_value(Value::Int64(255)).unwrap(), 255);
        assert!(u8::from_value(Value::Int64(256)).is_err());
        assert!(u32::from_value(Value::Int8(-1)).is_err());
        assert_eq!(i128::from_value(Value::UInt64(u64::MAX)).unwrap(), i128::from(u64::MAX));
        assert!(i32::from_value(Value::from("1")).is_err());
    }

    #[test]
    fn composite_conversions() {
        let array = Value::Array(vec![Value::Int32(1), Value::Null, Value::Int32(3)]);
        assert_eq!(Vec::<Option<i32>>::from_value(array).unwrap(), vec![Some(1), None, Some(3)]);
        assert_eq!(Vec::<u8>::from_value(Value::Bytes(vec![1, 2])).unwrap(), vec![1, 2]);
        assert_eq!(String::from_value(Value::Bytes(b"hi".to_vec())).unwrap(), "hi");
        assert!(bool::from_value(Value::UInt8(1)).unwrap());
        assert_eq!(f64::from_value(Value::Float32(1.5)).unwrap(), 1.5);

        let id = Uuid::new_v4();
        assert_eq!(Uuid::from_value(Value::String(id.to_string())).unwrap(), id);
        assert_eq!(
            Decimal::from_value(Value::Int32(12)).unwrap(),
            Decimal::from(12i64)
        );
    }

    #[test]
    fn tuples_from_rows() {
        let r = row(&["a", "b"], vec![Value::UInt8(1), Value::from("x")]);
        let (a, b): (u8, String) = FromRow::from_row(r.clone()).unwrap();
        assert_eq!((a, b.as_str()), (1, "x"));
        assert!(<(u8,)>::from_row(r.clone()).is_err());
        assert_eq!(Row::from_row(r.clone()).unwrap(), r);
    }

    #[test]
    fn case_conversions() {
        assert_eq!(to_snake_case("createdAtUtc"), "created_at_utc");
        assert_eq!(to_camel_case("created_at_utc"), "createdAtUtc");
        assert_eq!(to_camel_case("_leading"), "leading");
    }
}
