//! Column type system.
//!
//! A [`DataType`] names a wire-level column type and owns the column codec for it: decoding
//! `rows` values from a [`BinaryReader`] and encoding a slice of [`Value`]s into a
//! [`BinaryWriter`]. Composite types own their nested types, forming a simple tree.
//!
//! Type names as the server reports them (`Map(String, Nullable(Int32))`) are turned into a
//! `DataType` by [`DataType::parse`] / [`DataType::parse_with_context`]. The canonical name of a
//! type (its `Display` form) is what block validation compares.
//!
//! # Null handling
//!
//! Only `Nullable`, `Nothing` and `LowCardinality(Nullable(..))` produce [`Value::Null`] on
//! decode, except for enum codes missing from the enum table. On encode, a null passed to a
//! non-nullable column writes the type's default value.
mod composite;
mod decimal;
mod enums;
mod low_cardinality;
mod network;
mod numeric;
mod parser;
mod string;
mod temporal;

use std::fmt;

use chrono::{DateTime, Utc};

use crate::binary::{BinaryError, BinaryReader, BinaryWriter};
use crate::value::{Decimal, Value};

pub use parser::{DEFAULT_TIMEZONE, TypeLexer};

/// Timezone attached to `DateTime` and `DateTime64` columns. Used for display only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zone {
    pub name: String,
    /// Whether the type name spelled the zone out, as in `DateTime('UTC')`.
    pub explicit: bool,
}

impl Zone {
    pub fn explicit(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            explicit: true,
        }
    }

    pub fn implicit(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            explicit: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataType {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    Bool,
    String,
    Json,
    FixedString(usize),
    Uuid,
    IPv4,
    IPv6,
    Date,
    Date32,
    DateTime(Zone),
    DateTime64(u8, Zone),
    Decimal { precision: u8, scale: u8 },
    Enum8(Vec<(String, i8)>),
    Enum16(Vec<(String, i16)>),
    Array(Box<DataType>),
    Tuple(Vec<DataType>),
    Map(Box<DataType>, Box<DataType>),
    Nullable(Box<DataType>),
    LowCardinality(Box<DataType>),
    Nothing,
}

impl DataType {
    /// Canonical type name, identical to the `Display` output.
    pub fn name(&self) -> String {
        self.to_string()
    }

    pub fn is_nullable(&self) -> bool {
        matches!(self, DataType::Nullable(_))
    }

    /// Display timezone of temporal types.
    pub fn timezone(&self) -> Option<&str> {
        match self {
            DataType::DateTime(zone) | DataType::DateTime64(_, zone) => Some(&zone.name),
            _ => None,
        }
    }

    /// Value written in place of a null, and decoded when nothing else is known.
    pub fn default_value(&self) -> Value {
        match self {
            DataType::Int8 => Value::Int8(0),
            DataType::Int16 => Value::Int16(0),
            DataType::Int32 => Value::Int32(0),
            DataType::Int64 => Value::Int64(0),
            DataType::UInt8 => Value::UInt8(0),
            DataType::UInt16 => Value::UInt16(0),
            DataType::UInt32 | DataType::IPv4 => Value::UInt32(0),
            DataType::UInt64 => Value::UInt64(0),
            DataType::Float32 => Value::Float32(0.0),
            DataType::Float64 => Value::Float64(0.0),
            DataType::Bool => Value::Bool(false),
            DataType::String | DataType::Json => Value::String(String::new()),
            DataType::FixedString(n) => Value::Bytes(vec![0; *n]),
            DataType::Uuid => Value::Uuid(uuid::Uuid::nil()),
            DataType::IPv6 => Value::Bytes(vec![0; 16]),
            DataType::Date | DataType::Date32 | DataType::DateTime(_) | DataType::DateTime64(..) => {
                Value::Timestamp(DateTime::<Utc>::UNIX_EPOCH)
            }
            DataType::Decimal { scale, .. } => Value::Decimal(Decimal::new(0, *scale)),
            DataType::Enum8(entries) => entries
                .iter()
                .find(|(_, code)| *code == 0)
                .map_or(Value::Null, |(name, _)| Value::String(name.clone())),
            DataType::Enum16(entries) => entries
                .iter()
                .find(|(_, code)| *code == 0)
                .map_or(Value::Null, |(name, _)| Value::String(name.clone())),
            DataType::Array(_) => Value::Array(Vec::new()),
            DataType::Tuple(items) => Value::Tuple(items.iter().map(DataType::default_value).collect()),
            DataType::Map(..) => Value::Map(Vec::new()),
            DataType::Nullable(_) | DataType::Nothing => Value::Null,
            DataType::LowCardinality(nested) => nested.default_value(),
        }
    }

    /// Decodes `rows` values of this type.
    pub fn decode_column(&self, rows: usize, reader: &mut BinaryReader<'_>) -> Result<Vec<Value>, BinaryError> {
        match self {
            DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
            | DataType::Bool => numeric::decode(self, rows, reader),
            DataType::String | DataType::Json | DataType::FixedString(_) => string::decode(self, rows, reader),
            DataType::Uuid | DataType::IPv4 | DataType::IPv6 => network::decode(self, rows, reader),
            DataType::Date | DataType::Date32 | DataType::DateTime(_) | DataType::DateTime64(..) => {
                temporal::decode(self, rows, reader)
            }
            DataType::Decimal { precision, scale } => decimal::decode(*precision, *scale, rows, reader),
            DataType::Enum8(_) | DataType::Enum16(_) => enums::decode(self, rows, reader),
            DataType::Array(nested) => composite::decode_array(nested, rows, reader),
            DataType::Tuple(items) => composite::decode_tuple(items, rows, reader),
            DataType::Map(key, value) => composite::decode_map(key, value, rows, reader),
            DataType::Nullable(nested) => composite::decode_nullable(nested, rows, reader),
            DataType::LowCardinality(nested) => low_cardinality::decode(nested, rows, reader),
            DataType::Nothing => Ok(vec![Value::Null; rows]),
        }
    }

    /// Encodes one column. The row count is `values.len()`.
    pub fn encode_column(&self, values: &[Value], writer: &mut BinaryWriter) -> Result<(), BinaryError> {
        match self {
            DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
            | DataType::Bool => numeric::encode(self, values, writer),
            DataType::String | DataType::Json | DataType::FixedString(_) => string::encode(self, values, writer),
            DataType::Uuid | DataType::IPv4 | DataType::IPv6 => network::encode(self, values, writer),
            DataType::Date | DataType::Date32 | DataType::DateTime(_) | DataType::DateTime64(..) => {
                temporal::encode(self, values, writer)
            }
            DataType::Decimal { precision, scale } => decimal::encode(self, *precision, *scale, values, writer),
            DataType::Enum8(_) | DataType::Enum16(_) => enums::encode(self, values, writer),
            DataType::Array(nested) => composite::encode_array(self, nested, values, writer),
            DataType::Tuple(items) => composite::encode_tuple(self, items, values, writer),
            DataType::Map(key, value) => composite::encode_map(self, key, value, values, writer),
            DataType::Nullable(nested) => composite::encode_nullable(nested, values, writer),
            DataType::LowCardinality(nested) => low_cardinality::encode(nested, values, writer),
            DataType::Nothing => Ok(()),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Int8 => f.write_str("Int8"),
            DataType::Int16 => f.write_str("Int16"),
            DataType::Int32 => f.write_str("Int32"),
            DataType::Int64 => f.write_str("Int64"),
            DataType::UInt8 => f.write_str("UInt8"),
            DataType::UInt16 => f.write_str("UInt16"),
            DataType::UInt32 => f.write_str("UInt32"),
            DataType::UInt64 => f.write_str("UInt64"),
            DataType::Float32 => f.write_str("Float32"),
            DataType::Float64 => f.write_str("Float64"),
            DataType::Bool => f.write_str("Bool"),
            DataType::String => f.write_str("String"),
            DataType::Json => f.write_str("JSON"),
            DataType::FixedString(n) => write!(f, "FixedString({n})"),
            DataType::Uuid => f.write_str("UUID"),
            DataType::IPv4 => f.write_str("IPv4"),
            DataType::IPv6 => f.write_str("IPv6"),
            DataType::Date => f.write_str("Date"),
            DataType::Date32 => f.write_str("Date32"),
            DataType::DateTime(zone) if zone.explicit => write!(f, "DateTime('{}')", zone.name),
            DataType::DateTime(_) => f.write_str("DateTime"),
            DataType::DateTime64(scale, zone) if zone.explicit => {
                write!(f, "DateTime64({scale}, '{}')", zone.name)
            }
            DataType::DateTime64(scale, _) => write!(f, "DateTime64({scale})"),
            DataType::Decimal { precision, scale } => write!(f, "Decimal({precision}, {scale})"),
            DataType::Enum8(entries) => write_enum(f, "Enum8", entries.iter().map(|(n, c)| (n, i16::from(*c)))),
            DataType::Enum16(entries) => write_enum(f, "Enum16", entries.iter().map(|(n, c)| (n, *c))),
            DataType::Array(nested) => write!(f, "Array({nested})"),
            DataType::Tuple(items) => {
                f.write_str("Tuple(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            }
            DataType::Map(key, value) => write!(f, "Map({key}, {value})"),
            DataType::Nullable(nested) => write!(f, "Nullable({nested})"),
            DataType::LowCardinality(nested) => write!(f, "LowCardinality({nested})"),
            DataType::Nothing => f.write_str("Nothing"),
        }
    }
}

fn write_enum<'a>(
    f: &mut fmt::Formatter<'_>,
    kind: &str,
    entries: impl Iterator<Item = (&'a String, i16)>,
) -> fmt::Result {
    write!(f, "{kind}(")?;
    for (i, (name, code)) in entries.enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "'{}' = {code}", name.replace('\'', "\\'"))?;
    }
    f.write_str(")")
}

/// Upper bound on speculative allocation for row counts read off the wire.
fn capacity(rows: usize) -> usize {
    rows.min(64 * 1024)
}

fn mismatch(ty: &DataType, value: &Value) -> BinaryError {
    BinaryError::malformed(format!("cannot encode {} value as {ty}", value.kind()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(ty: &DataType, values: &[Value]) -> Vec<Value> {
        let mut writer = BinaryWriter::new();
        ty.encode_column(values, &mut writer).unwrap();
        let bytes = writer.into_inner();

        let mut reader = BinaryReader::new(&bytes);
        let decoded = ty.decode_column(values.len(), &mut reader).unwrap();
        assert!(reader.is_empty(), "{ty} left {} bytes unread", reader.remaining());
        decoded
    }

    fn parse(name: &str) -> DataType {
        DataType::parse(name).unwrap()
    }

    #[test]
    fn integers_round_trip() {
        let cases = vec![
            (DataType::Int8, vec![Value::Int8(i8::MIN), Value::Int8(0), Value::Int8(i8::MAX)]),
            (DataType::Int16, vec![Value::Int16(i16::MIN), Value::Int16(-1), Value::Int16(i16::MAX)]),
            (DataType::Int32, vec![Value::Int32(i32::MIN), Value::Int32(0), Value::Int32(i32::MAX)]),
            (DataType::Int64, vec![Value::Int64(i64::MIN), Value::Int64(-7), Value::Int64(i64::MAX)]),
            (DataType::UInt8, vec![Value::UInt8(0), Value::UInt8(u8::MAX)]),
            (DataType::UInt16, vec![Value::UInt16(0), Value::UInt16(u16::MAX)]),
            (DataType::UInt32, vec![Value::UInt32(0), Value::UInt32(u32::MAX)]),
            (DataType::UInt64, vec![Value::UInt64(0), Value::UInt64(u64::MAX)]),
            (DataType::Bool, vec![Value::Bool(true), Value::Bool(false)]),
        ];

        for (ty, values) in cases {
            assert_eq!(round_trip(&ty, &values), values, "{ty}");
        }
    }

    #[test]
    fn floats_round_trip_bit_exact() {
        let values: Vec<Value> = [f64::NAN, f64::INFINITY, f64::NEG_INFINITY, -0.0, 0.0, f64::MIN]
            .into_iter()
            .map(Value::Float64)
            .collect();
        let decoded = round_trip(&DataType::Float64, &values);
        for (a, b) in values.iter().zip(&decoded) {
            match (a, b) {
                (Value::Float64(a), Value::Float64(b)) => assert_eq!(a.to_bits(), b.to_bits()),
                other => panic!("unexpected pair {other:?}"),
            }
        }

        let values: Vec<Value> = [f32::NAN, f32::NEG_INFINITY, -0.0].into_iter().map(Value::Float32).collect();
        let decoded = round_trip(&DataType::Float32, &values);
        for (a, b) in values.iter().zip(&decoded) {
            match (a, b) {
                (Value::Float32(a), Value::Float32(b)) => assert_eq!(a.to_bits(), b.to_bits()),
                other => panic!("unexpected pair {other:?}"),
            }
        }
    }

    #[test]
    fn integers_accept_other_widths() {
        let mut writer = BinaryWriter::new();
        DataType::Int32
            .encode_column(&[Value::Int64(-5), Value::UInt8(7), Value::Null], &mut writer)
            .unwrap();
        let bytes = writer.into_inner();
        let decoded = DataType::Int32.decode_column(3, &mut BinaryReader::new(&bytes)).unwrap();
        assert_eq!(decoded, vec![Value::Int32(-5), Value::Int32(7), Value::Int32(0)]);
    }

    #[test]
    fn wrong_variant_is_malformed() {
        let mut writer = BinaryWriter::new();
        let err = DataType::Int32
            .encode_column(&[Value::from("nope")], &mut writer)
            .unwrap_err();
        assert!(matches!(err, BinaryError::Malformed(_)));
    }

    #[test]
    fn nested_composites_round_trip() {
        let ty = parse("Array(Array(String))");
        let values = vec![
            Value::Array(vec![
                Value::Array(vec![Value::from("a"), Value::from("b")]),
                Value::Array(vec![]),
            ]),
            Value::Array(vec![]),
            Value::Array(vec![Value::Array(vec![Value::from("c")])]),
        ];
        assert_eq!(round_trip(&ty, &values), values);

        let ty = parse("Tuple(Array(Nullable(String)), Nullable(UInt8))");
        let values = vec![
            Value::Tuple(vec![
                Value::Array(vec![Value::from("x"), Value::Null]),
                Value::UInt8(3),
            ]),
            Value::Tuple(vec![Value::Array(vec![]), Value::Null]),
        ];
        assert_eq!(round_trip(&ty, &values), values);

        let ty = parse("Array(Tuple(UInt32, Nullable(String)))");
        let values = vec![Value::Array(vec![
            Value::Tuple(vec![Value::UInt32(1), Value::Null]),
            Value::Tuple(vec![Value::UInt32(2), Value::from("two")]),
        ])];
        assert_eq!(round_trip(&ty, &values), values);
    }

    #[test]
    fn map_round_trip() {
        let ty = parse("Map(String, Nullable(Int32))");
        let values = vec![
            Value::Map(vec![
                (Value::from("a"), Value::Int32(1)),
                (Value::from("b"), Value::Null),
            ]),
            Value::Map(vec![]),
        ];
        assert_eq!(round_trip(&ty, &values), values);
    }

    #[test]
    fn empty_columns_read_nothing() {
        for name in ["Array(UInt8)", "Map(String, String)", "LowCardinality(String)", "Nullable(Int8)"] {
            let ty = parse(name);
            let mut writer = BinaryWriter::new();
            ty.encode_column(&[], &mut writer).unwrap();
            let bytes = writer.into_inner();
            let mut reader = BinaryReader::new(&bytes);
            assert_eq!(ty.decode_column(0, &mut reader).unwrap(), vec![]);
            assert!(reader.is_empty(), "{name}");
        }
    }

    #[test]
    fn nullable_writes_defaults_under_the_mask() {
        let ty = parse("Nullable(UInt16)");
        let mut writer = BinaryWriter::new();
        ty.encode_column(&[Value::UInt16(9), Value::Null], &mut writer).unwrap();
        assert_eq!(writer.as_slice(), &[0, 1, 9, 0, 0, 0]);

        let bytes = [0u8, 1, 9, 0, 42, 0];
        let decoded = ty.decode_column(2, &mut BinaryReader::new(&bytes)).unwrap();
        assert_eq!(decoded, vec![Value::UInt16(9), Value::Null]);
    }

    #[test]
    fn nothing_is_zero_width() {
        let mut writer = BinaryWriter::new();
        DataType::Nothing.encode_column(&[Value::Null, Value::Null], &mut writer).unwrap();
        assert!(writer.is_empty());
        let decoded = DataType::Nothing.decode_column(2, &mut BinaryReader::new(&[])).unwrap();
        assert_eq!(decoded, vec![Value::Null, Value::Null]);
    }

    #[test]
    fn canonical_names() {
        let cases = vec![
            ("array(nullable(int32))", "Array(Nullable(Int32))"),
            ("Map(String,Array(UInt8))", "Map(String, Array(UInt8))"),
            ("Tuple(String,UInt64,DateTime64(3,'UTC'))", "Tuple(String, UInt64, DateTime64(3, 'UTC'))"),
            ("Enum8('a'=1,'b'=-2)", "Enum8('a' = 1, 'b' = -2)"),
            ("Decimal128(4)", "Decimal(38, 4)"),
            ("Binary(4)", "FixedString(4)"),
            ("LowCardinality(Nullable(String))", "LowCardinality(Nullable(String))"),
        ];

        for (input, expected) in cases {
            assert_eq!(parse(input).name(), expected, "{input}");
        }
    }
}
