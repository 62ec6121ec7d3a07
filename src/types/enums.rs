use crate::binary::{BinaryError, BinaryReader, BinaryWriter};
use crate::value::Value;

use super::{DataType, capacity, mismatch};

fn name_for<C: PartialEq + Copy>(entries: &[(String, C)], code: C) -> Value {
    entries
        .iter()
        .find(|(_, c)| *c == code)
        .map_or(Value::Null, |(name, _)| Value::String(name.clone()))
}

/// Code for a value bound for an enum column. Unknown names map to code 0.
fn code_for<C: Copy + Default>(
    ty: &DataType,
    entries: &[(String, C)],
    value: &Value,
    from_int: impl Fn(i128) -> C,
) -> Result<C, BinaryError> {
    match value {
        Value::Null => Ok(C::default()),
        Value::String(name) => Ok(entries
            .iter()
            .find(|(n, _)| n == name)
            .map_or(C::default(), |(_, code)| *code)),
        other => other.as_i128().map(from_int).ok_or_else(|| mismatch(ty, other)),
    }
}

pub(super) fn decode(ty: &DataType, rows: usize, reader: &mut BinaryReader<'_>) -> Result<Vec<Value>, BinaryError> {
    let mut out = Vec::with_capacity(capacity(rows));
    for _ in 0..rows {
        out.push(match ty {
            DataType::Enum8(entries) => name_for(entries, reader.read_i8()?),
            DataType::Enum16(entries) => name_for(entries, reader.read_i16()?),
            other => return Err(BinaryError::unsupported(format!("{other} is not an enum"))),
        });
    }
    Ok(out)
}

pub(super) fn encode(ty: &DataType, values: &[Value], writer: &mut BinaryWriter) -> Result<(), BinaryError> {
    for value in values {
        match ty {
            DataType::Enum8(entries) => writer.write_i8(code_for(ty, entries, value, |v| v as i8)?),
            DataType::Enum16(entries) => writer.write_i16(code_for(ty, entries, value, |v| v as i16)?),
            other => return Err(BinaryError::unsupported(format!("{other} is not an enum"))),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn colors() -> DataType {
        DataType::Enum8(vec![("red".to_string(), 1), ("green".to_string(), -2)])
    }

    #[test]
    fn names_map_to_codes() {
        let mut writer = BinaryWriter::new();
        colors()
            .encode_column(&[Value::from("green"), Value::from("red"), Value::from("blue")], &mut writer)
            .unwrap();
        // Unknown names fall back to code 0.
        assert_eq!(writer.as_slice(), &[0xfe, 1, 0]);
    }

    #[test]
    fn unknown_codes_decode_to_null() {
        let decoded = colors().decode_column(3, &mut BinaryReader::new(&[1, 0xfe, 7])).unwrap();
        assert_eq!(decoded, vec![Value::from("red"), Value::from("green"), Value::Null]);
    }

    #[test]
    fn enum16_round_trip() {
        let ty = DataType::Enum16(vec![("low".to_string(), -1000), ("high".to_string(), 1000)]);
        let values = vec![Value::from("high"), Value::from("low")];
        let mut writer = BinaryWriter::new();
        ty.encode_column(&values, &mut writer).unwrap();
        let bytes = writer.into_inner();
        assert_eq!(ty.decode_column(2, &mut BinaryReader::new(&bytes)).unwrap(), values);
    }
}
