use chrono::{DateTime, Utc};

use crate::binary::{BinaryError, BinaryReader, BinaryWriter};
use crate::value::Value;

use super::numeric::integer_of;
use super::{DataType, capacity, mismatch};

const SECONDS_PER_DAY: i64 = 86_400;

/// Highest sub-second precision a timestamp can carry.
pub(super) const MAX_DATETIME64_SCALE: u8 = 9;

fn checked_scale(scale: u8) -> Result<u8, BinaryError> {
    if scale > MAX_DATETIME64_SCALE {
        return Err(BinaryError::unsupported(format!("DateTime64 scale {scale}")));
    }
    Ok(scale)
}

fn timestamp(secs: i64, nanos: u32) -> Result<Value, BinaryError> {
    DateTime::<Utc>::from_timestamp(secs, nanos)
        .map(Value::Timestamp)
        .ok_or_else(|| BinaryError::malformed(format!("timestamp {secs}s out of range")))
}

pub(super) fn decode(ty: &DataType, rows: usize, reader: &mut BinaryReader<'_>) -> Result<Vec<Value>, BinaryError> {
    let mut out = Vec::with_capacity(capacity(rows));
    for _ in 0..rows {
        out.push(match ty {
            DataType::Date => timestamp(i64::from(reader.read_u16()?) * SECONDS_PER_DAY, 0)?,
            DataType::Date32 => timestamp(i64::from(reader.read_i32()?) * SECONDS_PER_DAY, 0)?,
            DataType::DateTime(_) => timestamp(i64::from(reader.read_u32()?), 0)?,
            DataType::DateTime64(scale, _) => {
                let scale = checked_scale(*scale)?;
                let per_second = 10i64.pow(u32::from(scale));
                let ticks = reader.read_i64()?;
                let secs = ticks.div_euclid(per_second);
                let frac = ticks.rem_euclid(per_second);
                let nanos = frac * 10i64.pow(u32::from(MAX_DATETIME64_SCALE - scale));
                timestamp(secs, nanos as u32)?
            }
            other => return Err(BinaryError::unsupported(format!("{other} is not temporal"))),
        });
    }
    Ok(out)
}

/// Whole seconds and nanoseconds of a value bound for a temporal column. Integers are taken as
/// the column's own unit (days for dates, seconds for `DateTime`).
fn parts_of(ty: &DataType, value: &Value) -> Result<Option<(i64, u32)>, BinaryError> {
    match value {
        Value::Null => Ok(Some((0, 0))),
        Value::Timestamp(ts) => Ok(Some((ts.timestamp(), ts.timestamp_subsec_nanos()))),
        Value::String(s) => {
            let parsed = DateTime::parse_from_rfc3339(s)
                .map(|ts| ts.with_timezone(&Utc))
                .or_else(|_| {
                    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").map(|naive| naive.and_utc())
                })
                .or_else(|_| {
                    chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
                        .map(|date| date.and_time(chrono::NaiveTime::default()).and_utc())
                })
                .map_err(|e| BinaryError::malformed(format!("invalid timestamp {s:?}: {e}")))?;
            Ok(Some((parsed.timestamp(), parsed.timestamp_subsec_nanos())))
        }
        other if other.as_i128().is_some() => Ok(None),
        other => Err(mismatch(ty, other)),
    }
}

pub(super) fn encode(ty: &DataType, values: &[Value], writer: &mut BinaryWriter) -> Result<(), BinaryError> {
    for value in values {
        let parts = parts_of(ty, value)?;
        match ty {
            DataType::Date => {
                let days = match parts {
                    Some((secs, _)) => secs.div_euclid(SECONDS_PER_DAY),
                    None => integer_of(ty, value)? as i64,
                };
                writer.write_u16(days as u16);
            }
            DataType::Date32 => {
                let days = match parts {
                    Some((secs, _)) => secs.div_euclid(SECONDS_PER_DAY),
                    None => integer_of(ty, value)? as i64,
                };
                writer.write_i32(days as i32);
            }
            DataType::DateTime(_) => {
                let secs = match parts {
                    Some((secs, _)) => secs,
                    None => integer_of(ty, value)? as i64,
                };
                writer.write_u32(secs as u32);
            }
            DataType::DateTime64(scale, _) => {
                let ticks = match parts {
                    Some((secs, nanos)) => to_ticks(secs, nanos, checked_scale(*scale)?),
                    None => integer_of(ty, value)?,
                };
                writer.write_i64(ticks as i64);
            }
            other => return Err(BinaryError::unsupported(format!("{other} is not temporal"))),
        }
    }
    Ok(())
}

/// Converts to ticks of `10^-scale` seconds, rounding to the nearest tick.
fn to_ticks(secs: i64, nanos: u32, scale: u8) -> i128 {
    let per_second = 10i128.pow(u32::from(scale));
    let divisor = 10i128.pow(u32::from(MAX_DATETIME64_SCALE - scale));
    let frac = (i128::from(nanos) + divisor / 2) / divisor;
    i128::from(secs) * per_second + frac
}
