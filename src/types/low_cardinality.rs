use std::collections::HashMap;

use crate::binary::{BinaryError, BinaryReader, BinaryWriter};
use crate::value::Value;

use super::{DataType, capacity};

/// Width in bytes of the per-row dictionary keys.
fn key_width(dictionary_size: usize) -> usize {
    if dictionary_size <= usize::from(u8::MAX) {
        1
    } else if dictionary_size <= usize::from(u16::MAX) {
        2
    } else if dictionary_size as u64 <= u64::from(u32::MAX) {
        4
    } else {
        8
    }
}

fn read_key(width: usize, reader: &mut BinaryReader<'_>) -> Result<u64, BinaryError> {
    Ok(match width {
        1 => u64::from(reader.read_u8()?),
        2 => u64::from(reader.read_u16()?),
        4 => u64::from(reader.read_u32()?),
        _ => reader.read_u64()?,
    })
}

fn write_key(key: usize, width: usize, writer: &mut BinaryWriter) {
    match width {
        1 => writer.write_u8(key as u8),
        2 => writer.write_u16(key as u16),
        4 => writer.write_u32(key as u32),
        _ => writer.write_u64(key as u64),
    }
}

pub(super) fn decode(nested: &DataType, rows: usize, reader: &mut BinaryReader<'_>) -> Result<Vec<Value>, BinaryError> {
    let size = usize::try_from(reader.read_varint()?)
        .map_err(|_| BinaryError::malformed("dictionary size overflows usize"))?;
    let dictionary = nested.decode_column(size, reader)?;
    let width = key_width(size);

    let mut out = Vec::with_capacity(capacity(rows));
    for _ in 0..rows {
        let key = read_key(width, reader)?;
        let value = usize::try_from(key)
            .ok()
            .and_then(|k| dictionary.get(k))
            .cloned()
            .unwrap_or(Value::Null);
        out.push(value);
    }
    Ok(out)
}

pub(super) fn encode(nested: &DataType, values: &[Value], writer: &mut BinaryWriter) -> Result<(), BinaryError> {
    // Values are deduplicated by their encoded form under the nested type.
    let mut index: HashMap<Vec<u8>, usize> = HashMap::new();
    let mut dictionary = Vec::new();
    let mut keys = Vec::with_capacity(values.len());

    for value in values {
        if value.is_null() && !nested.is_nullable() {
            return Err(BinaryError::malformed(format!(
                "null in LowCardinality({nested}) requires a Nullable dictionary type"
            )));
        }

        let mut probe = BinaryWriter::new();
        nested.encode_column(std::slice::from_ref(value), &mut probe)?;
        let next = dictionary.len();
        let key = *index.entry(probe.as_slice().to_vec()).or_insert(next);
        if key == next {
            dictionary.push(value.clone());
        }
        keys.push(key);
    }

    writer.write_varint(dictionary.len() as u64);
    nested.encode_column(&dictionary, writer)?;
    let width = key_width(dictionary.len());
    for key in keys {
        write_key(key, width, writer);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn low_cardinality(nested: DataType) -> DataType {
        DataType::LowCardinality(Box::new(nested))
    }

    #[test]
    fn deduplicates_in_first_occurrence_order() {
        let ty = low_cardinality(DataType::String);
        let values: Vec<Value> = ["b", "a", "b", "b", "a"].into_iter().map(Value::from).collect();

        let mut writer = BinaryWriter::new();
        ty.encode_column(&values, &mut writer).unwrap();
        let bytes = writer.into_inner();

        let mut reader = BinaryReader::new(&bytes);
        assert_eq!(reader.read_varint().unwrap(), 2);
        assert_eq!(reader.read_string().unwrap(), "b");
        assert_eq!(reader.read_string().unwrap(), "a");
        assert_eq!(reader.read_bytes(5).unwrap(), &[0, 1, 0, 0, 1]);

        let decoded = ty.decode_column(values.len(), &mut BinaryReader::new(&bytes)).unwrap();
        assert_eq!(decoded, values);
    }

    #[test]
    fn nullable_dictionary_keeps_nulls() {
        let ty = low_cardinality(DataType::Nullable(Box::new(DataType::String)));
        let values = vec![Value::Null, Value::from("x"), Value::Null, Value::from("")];

        let mut writer = BinaryWriter::new();
        ty.encode_column(&values, &mut writer).unwrap();
        let bytes = writer.into_inner();
        // Null and the empty string encode differently, so both get a slot.
        assert_eq!(bytes[0], 3);

        let decoded = ty.decode_column(values.len(), &mut BinaryReader::new(&bytes)).unwrap();
        assert_eq!(decoded, values);
    }

    #[test]
    fn null_without_nullable_is_malformed() {
        let ty = low_cardinality(DataType::String);
        let mut writer = BinaryWriter::new();
        let err = ty.encode_column(&[Value::Null], &mut writer).unwrap_err();
        assert!(matches!(err, BinaryError::Malformed(_)));
    }

    #[test]
    fn wide_dictionaries_use_wider_keys() {
        assert_eq!(key_width(255), 1);
        assert_eq!(key_width(256), 2);
        assert_eq!(key_width(65_535), 2);
        assert_eq!(key_width(65_536), 4);

        let ty = low_cardinality(DataType::UInt16);
        let values: Vec<Value> = (0..300u16).map(Value::UInt16).collect();
        let mut writer = BinaryWriter::new();
        ty.encode_column(&values, &mut writer).unwrap();
        let bytes = writer.into_inner();
        // varint(300) + 300 dictionary values + 300 two-byte keys
        assert_eq!(bytes.len(), 2 + 600 + 600);
        assert_eq!(ty.decode_column(300, &mut BinaryReader::new(&bytes)).unwrap(), values);
    }

    #[test]
    fn out_of_range_key_is_null() {
        let mut writer = BinaryWriter::new();
        writer.write_varint(1);
        writer.write_string("only");
        writer.write_u8(0);
        writer.write_u8(5);
        let bytes = writer.into_inner();

        let decoded = low_cardinality(DataType::String)
            .decode_column(2, &mut BinaryReader::new(&bytes))
            .unwrap();
        assert_eq!(decoded, vec![Value::from("only"), Value::Null]);
    }
}
