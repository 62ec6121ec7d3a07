use crate::binary::{BinaryError, BinaryReader, BinaryWriter};
use crate::value::Value;

use super::{DataType, capacity, mismatch};

pub(super) fn decode(ty: &DataType, rows: usize, reader: &mut BinaryReader<'_>) -> Result<Vec<Value>, BinaryError> {
    let mut out = Vec::with_capacity(capacity(rows));
    match ty {
        DataType::String | DataType::Json => {
            for _ in 0..rows {
                out.push(Value::String(reader.read_string()?));
            }
        }
        DataType::FixedString(n) => {
            for _ in 0..rows {
                out.push(Value::Bytes(reader.read_bytes(*n)?.to_vec()));
            }
        }
        other => return Err(BinaryError::unsupported(format!("{other} is not a string type"))),
    }
    Ok(out)
}

pub(super) fn encode(ty: &DataType, values: &[Value], writer: &mut BinaryWriter) -> Result<(), BinaryError> {
    for value in values {
        let bytes: &[u8] = match value {
            Value::Null => &[],
            other => other.as_bytes().ok_or_else(|| mismatch(ty, other))?,
        };

        match ty {
            DataType::FixedString(n) => {
                let take = bytes.len().min(*n);
                writer.write_bytes(&bytes[..take]);
                writer.write_zeros(n - take);
            }
            _ => writer.write_binary(bytes),
        }
    }
    Ok(())
}
