use crate::binary::{BinaryError, BinaryReader, BinaryWriter};
use crate::value::{Decimal, Value};

use super::{DataType, capacity, mismatch};

/// Highest precision with a wire representation.
pub(super) const MAX_PRECISION: u8 = 76;

/// Storage width in bytes for a decimal of the given precision.
pub(super) fn width_for(precision: u8) -> Result<usize, BinaryError> {
    match precision {
        0 => Err(BinaryError::malformed("decimal precision must be positive")),
        1..=9 => Ok(4),
        10..=18 => Ok(8),
        19..=38 => Ok(16),
        39..=76 => Ok(32),
        _ => Err(BinaryError::unsupported(format!("decimal precision {precision}"))),
    }
}

pub(super) fn decode(
    precision: u8,
    scale: u8,
    rows: usize,
    reader: &mut BinaryReader<'_>,
) -> Result<Vec<Value>, BinaryError> {
    let width = width_for(precision)?;
    let mut out = Vec::with_capacity(capacity(rows));
    for _ in 0..rows {
        let bytes = reader.read_bytes(width)?;
        out.push(Value::Decimal(Decimal::from_le_bytes(bytes, scale)));
    }
    Ok(out)
}

fn decimal_of(ty: &DataType, value: &Value) -> Result<Decimal, BinaryError> {
    match value {
        Value::Null => Ok(Decimal::default()),
        Value::Decimal(d) => Ok(*d),
        Value::String(s) => s.parse(),
        Value::Float32(v) => Decimal::from_f64(f64::from(*v)),
        Value::Float64(v) => Decimal::from_f64(*v),
        other => other
            .as_i128()
            .map(|v| Decimal::new(v, 0))
            .ok_or_else(|| mismatch(ty, other)),
    }
}

pub(super) fn encode(
    ty: &DataType,
    precision: u8,
    scale: u8,
    values: &[Value],
    writer: &mut BinaryWriter,
) -> Result<(), BinaryError> {
    let width = width_for(precision)?;
    for value in values {
        let decimal = decimal_of(ty, value)?.rescale(scale)?;
        writer.write_bytes(&decimal.to_le_bytes(width)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decimal(precision: u8, scale: u8) -> DataType {
        DataType::Decimal { precision, scale }
    }

    #[test]
    fn width_follows_precision() {
        assert_eq!(width_for(9).unwrap(), 4);
        assert_eq!(width_for(10).unwrap(), 8);
        assert_eq!(width_for(38).unwrap(), 16);
        assert_eq!(width_for(76).unwrap(), 32);
        assert!(matches!(width_for(77), Err(BinaryError::Unsupported(_))));
    }

    #[test]
    fn round_trip_every_width() {
        let cases = vec![
            (decimal(9, 2), vec!["1234567.89", "-0.01", "10.50"]),
            (decimal(18, 4), vec!["-99999999999999.9999", "0.0000", "1.2300"]),
            (decimal(38, 10), vec!["-1234567890123456789012345678.1234567890", "0.1000000000"]),
            (
                decimal(76, 20),
                vec![
                    "12345678901234567890123456789012345678901234567890.12345678901234567890",
                    "-0.00000000000000000001",
                ],
            ),
        ];

        for (ty, texts) in cases {
            let values: Vec<Value> = texts.iter().map(|t| Value::Decimal(t.parse().unwrap())).collect();
            let mut writer = BinaryWriter::new();
            ty.encode_column(&values, &mut writer).unwrap();
            let bytes = writer.into_inner();
            let decoded = ty.decode_column(values.len(), &mut BinaryReader::new(&bytes)).unwrap();

            let rendered: Vec<String> = decoded.iter().map(Value::to_string).collect();
            assert_eq!(rendered, texts, "{ty}");
        }
    }

    #[test]
    fn values_are_rescaled() {
        let ty = decimal(9, 3);
        let mut writer = BinaryWriter::new();
        ty.encode_column(&[Value::from("2.5"), Value::Int32(4), Value::Float64(0.0005)], &mut writer)
            .unwrap();
        let bytes = writer.into_inner();
        let decoded: Vec<String> = ty
            .decode_column(3, &mut BinaryReader::new(&bytes))
            .unwrap()
            .iter()
            .map(Value::to_string)
            .collect();
        assert_eq!(decoded, vec!["2.500", "4.000", "0.001"]);
    }

    #[test]
    fn overflow_is_malformed() {
        let mut writer = BinaryWriter::new();
        let err = decimal(9, 0)
            .encode_column(&[Value::from("99999999999")], &mut writer)
            .unwrap_err();
        assert!(matches!(err, BinaryError::Malformed(_)));
    }
}
