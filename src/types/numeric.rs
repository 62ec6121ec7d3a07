use crate::binary::{BinaryError, BinaryReader, BinaryWriter};
use crate::value::Value;

use super::{DataType, capacity, mismatch};

macro_rules! decode_fixed {
    ($reader:expr, $rows:expr, $read:ident, $variant:ident) => {{
        let mut out = Vec::with_capacity(capacity($rows));
        for _ in 0..$rows {
            out.push(Value::$variant($reader.$read()?));
        }
        out
    }};
}

pub(super) fn decode(ty: &DataType, rows: usize, reader: &mut BinaryReader<'_>) -> Result<Vec<Value>, BinaryError> {
    Ok(match ty {
        DataType::Int8 => decode_fixed!(reader, rows, read_i8, Int8),
        DataType::Int16 => decode_fixed!(reader, rows, read_i16, Int16),
        DataType::Int32 => decode_fixed!(reader, rows, read_i32, Int32),
        DataType::Int64 => decode_fixed!(reader, rows, read_i64, Int64),
        DataType::UInt8 => decode_fixed!(reader, rows, read_u8, UInt8),
        DataType::UInt16 => decode_fixed!(reader, rows, read_u16, UInt16),
        DataType::UInt32 => decode_fixed!(reader, rows, read_u32, UInt32),
        DataType::UInt64 => decode_fixed!(reader, rows, read_u64, UInt64),
        DataType::Float32 => decode_fixed!(reader, rows, read_f32, Float32),
        DataType::Float64 => decode_fixed!(reader, rows, read_f64, Float64),
        DataType::Bool => {
            let mut out = Vec::with_capacity(capacity(rows));
            for _ in 0..rows {
                out.push(Value::Bool(reader.read_u8()? != 0));
            }
            out
        }
        other => return Err(BinaryError::unsupported(format!("{other} is not numeric"))),
    })
}

/// Integer payload of a value bound for an integer column. Wider values are truncated by the
/// caller's cast.
pub(super) fn integer_of(ty: &DataType, value: &Value) -> Result<i128, BinaryError> {
    match value {
        Value::Null => Ok(0),
        Value::Float32(v) => Ok(*v as i128),
        Value::Float64(v) => Ok(*v as i128),
        other => other.as_i128().ok_or_else(|| mismatch(ty, other)),
    }
}

fn float_of(ty: &DataType, value: &Value) -> Result<f64, BinaryError> {
    match value {
        Value::Null => Ok(0.0),
        other => other.as_f64().ok_or_else(|| mismatch(ty, other)),
    }
}

pub(super) fn encode(ty: &DataType, values: &[Value], writer: &mut BinaryWriter) -> Result<(), BinaryError> {
    for value in values {
        match ty {
            DataType::Int8 => writer.write_i8(integer_of(ty, value)? as i8),
            DataType::Int16 => writer.write_i16(integer_of(ty, value)? as i16),
            DataType::Int32 => writer.write_i32(integer_of(ty, value)? as i32),
            DataType::Int64 => writer.write_i64(integer_of(ty, value)? as i64),
            DataType::UInt8 => writer.write_u8(integer_of(ty, value)? as u8),
            DataType::UInt16 => writer.write_u16(integer_of(ty, value)? as u16),
            DataType::UInt32 => writer.write_u32(integer_of(ty, value)? as u32),
            DataType::UInt64 => writer.write_u64(integer_of(ty, value)? as u64),
            DataType::Float32 => match value {
                Value::Float32(v) => writer.write_f32(*v),
                other => writer.write_f32(float_of(ty, other)? as f32),
            },
            DataType::Float64 => writer.write_f64(float_of(ty, value)?),
            DataType::Bool => writer.write_u8(u8::from(integer_of(ty, value)? != 0)),
            other => return Err(BinaryError::unsupported(format!("{other} is not numeric"))),
        }
    }
    Ok(())
}
