use crate::binary::{BinaryError, BinaryReader, BinaryWriter};
use crate::value::Value;

use super::{DataType, capacity, mismatch};

/// Reads one cumulative offset per row and checks they never decrease.
fn read_offsets(rows: usize, reader: &mut BinaryReader<'_>) -> Result<Vec<usize>, BinaryError> {
    let mut offsets = Vec::with_capacity(capacity(rows));
    let mut last = 0u64;
    for _ in 0..rows {
        let offset = reader.read_u64()?;
        if offset < last {
            return Err(BinaryError::malformed(format!("offset {offset} after {last}")));
        }
        last = offset;
        offsets.push(usize::try_from(offset).map_err(|_| BinaryError::malformed("offset overflows usize"))?);
    }
    Ok(offsets)
}

fn write_offsets(lengths: impl Iterator<Item = usize>, writer: &mut BinaryWriter) {
    let mut total = 0u64;
    for len in lengths {
        total += len as u64;
        writer.write_u64(total);
    }
}

pub(super) fn decode_array(
    nested: &DataType,
    rows: usize,
    reader: &mut BinaryReader<'_>,
) -> Result<Vec<Value>, BinaryError> {
    if rows == 0 {
        return Ok(Vec::new());
    }
    let offsets = read_offsets(rows, reader)?;
    let total = offsets.last().copied().unwrap_or(0);
    let mut elements = nested.decode_column(total, reader)?.into_iter();

    let mut out = Vec::with_capacity(offsets.len());
    let mut start = 0;
    for end in offsets {
        out.push(Value::Array(elements.by_ref().take(end - start).collect()));
        start = end;
    }
    Ok(out)
}

pub(super) fn encode_array(
    ty: &DataType,
    nested: &DataType,
    values: &[Value],
    writer: &mut BinaryWriter,
) -> Result<(), BinaryError> {
    let mut rows: Vec<&[Value]> = Vec::with_capacity(values.len());
    for value in values {
        rows.push(match value {
            Value::Null => &[],
            Value::Array(items) => items.as_slice(),
            other => return Err(mismatch(ty, other)),
        });
    }

    write_offsets(rows.iter().map(|r| r.len()), writer);
    let flat: Vec<Value> = rows.into_iter().flatten().cloned().collect();
    nested.encode_column(&flat, writer)
}

pub(super) fn decode_tuple(
    items: &[DataType],
    rows: usize,
    reader: &mut BinaryReader<'_>,
) -> Result<Vec<Value>, BinaryError> {
    let mut out: Vec<Vec<Value>> = (0..rows).map(|_| Vec::with_capacity(items.len())).collect();
    for item in items {
        let column = item.decode_column(rows, reader)?;
        for (row, value) in out.iter_mut().zip(column) {
            row.push(value);
        }
    }
    Ok(out.into_iter().map(Value::Tuple).collect())
}

pub(super) fn encode_tuple(
    ty: &DataType,
    items: &[DataType],
    values: &[Value],
    writer: &mut BinaryWriter,
) -> Result<(), BinaryError> {
    let mut rows: Vec<&[Value]> = Vec::with_capacity(values.len());
    for value in values {
        rows.push(match value {
            Value::Null => &[],
            Value::Tuple(elements) | Value::Array(elements) => elements.as_slice(),
            other => return Err(mismatch(ty, other)),
        });
    }

    for (i, item) in items.iter().enumerate() {
        let column: Vec<Value> = rows
            .iter()
            .map(|row| row.get(i).cloned().unwrap_or_else(|| item.default_value()))
            .collect();
        item.encode_column(&column, writer)?;
    }
    Ok(())
}

pub(super) fn decode_map(
    key: &DataType,
    value: &DataType,
    rows: usize,
    reader: &mut BinaryReader<'_>,
) -> Result<Vec<Value>, BinaryError> {
    if rows == 0 {
        return Ok(Vec::new());
    }
    let offsets = read_offsets(rows, reader)?;
    let total = offsets.last().copied().unwrap_or(0);
    let keys = key.decode_column(total, reader)?;
    let values = value.decode_column(total, reader)?;
    let mut pairs = keys.into_iter().zip(values);

    let mut out = Vec::with_capacity(offsets.len());
    let mut start = 0;
    for end in offsets {
        out.push(Value::Map(pairs.by_ref().take(end - start).collect()));
        start = end;
    }
    Ok(out)
}

pub(super) fn encode_map(
    ty: &DataType,
    key: &DataType,
    value: &DataType,
    values: &[Value],
    writer: &mut BinaryWriter,
) -> Result<(), BinaryError> {
    let mut rows: Vec<&[(Value, Value)]> = Vec::with_capacity(values.len());
    for v in values {
        rows.push(match v {
            Value::Null => &[],
            Value::Map(entries) => entries.as_slice(),
            other => return Err(mismatch(ty, other)),
        });
    }

    write_offsets(rows.iter().map(|r| r.len()), writer);
    let (keys, vals): (Vec<Value>, Vec<Value>) = rows.into_iter().flatten().cloned().unzip();
    key.encode_column(&keys, writer)?;
    value.encode_column(&vals, writer)
}

pub(super) fn decode_nullable(
    nested: &DataType,
    rows: usize,
    reader: &mut BinaryReader<'_>,
) -> Result<Vec<Value>, BinaryError> {
    let mask = reader.read_bytes(rows)?;
    // The nested column always holds `rows` slots, nulls included.
    let values = nested.decode_column(rows, reader)?;
    Ok(mask
        .iter()
        .zip(values)
        .map(|(null, value)| if *null != 0 { Value::Null } else { value })
        .collect())
}

pub(super) fn encode_nullable(nested: &DataType, values: &[Value], writer: &mut BinaryWriter) -> Result<(), BinaryError> {
    for value in values {
        writer.write_u8(u8::from(value.is_null()));
    }
    let filled: Vec<Value> = values
        .iter()
        .map(|v| if v.is_null() { nested.default_value() } else { v.clone() })
        .collect();
    nested.encode_column(&filled, writer)
}
