use std::net::{Ipv4Addr, Ipv6Addr};

use uuid::Uuid;

use crate::binary::{BinaryError, BinaryReader, BinaryWriter};
use crate::value::Value;

use super::numeric::integer_of;
use super::{DataType, capacity, mismatch};

pub(super) fn decode(ty: &DataType, rows: usize, reader: &mut BinaryReader<'_>) -> Result<Vec<Value>, BinaryError> {
    let mut out = Vec::with_capacity(capacity(rows));
    for _ in 0..rows {
        out.push(match ty {
            // Two little-endian words, most significant half first.
            DataType::Uuid => {
                let high = reader.read_u64()?;
                let low = reader.read_u64()?;
                Value::Uuid(Uuid::from_u64_pair(high, low))
            }
            DataType::IPv4 => Value::UInt32(reader.read_u32()?),
            DataType::IPv6 => Value::Bytes(reader.read_bytes(16)?.to_vec()),
            other => return Err(BinaryError::unsupported(format!("{other} is not a network type"))),
        });
    }
    Ok(out)
}

pub(super) fn encode(ty: &DataType, values: &[Value], writer: &mut BinaryWriter) -> Result<(), BinaryError> {
    for value in values {
        match ty {
            DataType::Uuid => {
                let (high, low) = uuid_of(ty, value)?.as_u64_pair();
                writer.write_u64(high);
                writer.write_u64(low);
            }
            DataType::IPv4 => {
                let addr = match value {
                    Value::String(s) => u32::from(
                        s.parse::<Ipv4Addr>()
                            .map_err(|e| BinaryError::malformed(format!("invalid IPv4 {s:?}: {e}")))?,
                    ),
                    other => integer_of(ty, other)? as u32,
                };
                writer.write_u32(addr);
            }
            DataType::IPv6 => {
                let octets = match value {
                    Value::Null => [0; 16],
                    Value::String(s) => s
                        .parse::<Ipv6Addr>()
                        .map_err(|e| BinaryError::malformed(format!("invalid IPv6 {s:?}: {e}")))?
                        .octets(),
                    Value::Bytes(b) => <[u8; 16]>::try_from(b.as_slice())
                        .map_err(|_| BinaryError::malformed(format!("IPv6 needs 16 bytes, got {}", b.len())))?,
                    other => return Err(mismatch(ty, other)),
                };
                writer.write_bytes(&octets);
            }
            other => return Err(BinaryError::unsupported(format!("{other} is not a network type"))),
        }
    }
    Ok(())
}

fn uuid_of(ty: &DataType, value: &Value) -> Result<Uuid, BinaryError> {
    match value {
        Value::Null => Ok(Uuid::nil()),
        Value::Uuid(u) => Ok(*u),
        Value::String(s) => Uuid::parse_str(s).map_err(|e| BinaryError::malformed(format!("invalid UUID {s:?}: {e}"))),
        Value::Bytes(b) => Uuid::from_slice(b).map_err(|e| BinaryError::malformed(format!("invalid UUID bytes: {e}"))),
        other => Err(mismatch(ty, other)),
    }
}
