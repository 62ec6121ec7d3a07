use log::trace;

use crate::binary::{BinaryError, BinaryReader, BinaryWriter};

use super::{CHECKSUM_LEN, CompressionMethod, HEADER_LEN, city_hash128};

/// Frames claiming a larger decompressed size are rejected before allocating.
const MAX_DECOMPRESSED_SIZE: usize = 1 << 30;

/// Reads one frame and returns its decompressed payload.
///
/// Nothing is consumed unless the whole frame is available.
pub fn read_frame(reader: &mut BinaryReader<'_>) -> Result<Vec<u8>, BinaryError> {
    let mut probe = reader.clone();
    let checksum = probe.read_bytes(CHECKSUM_LEN)?;
    let header = probe.read_bytes(HEADER_LEN)?;

    let mut fields = BinaryReader::new(header);
    let method = CompressionMethod::from_byte(fields.read_u8()?)?;
    let compressed_size = fields.read_u32()? as usize;
    let decompressed_size = fields.read_u32()? as usize;

    let payload_size = compressed_size
        .checked_sub(HEADER_LEN)
        .ok_or_else(|| BinaryError::malformed(format!("compressed size {compressed_size} below header size")))?;
    if decompressed_size > MAX_DECOMPRESSED_SIZE {
        return Err(BinaryError::malformed(format!("frame of {decompressed_size} bytes is too large")));
    }
    let payload = probe.read_bytes(payload_size)?;

    let mut hashed = Vec::with_capacity(HEADER_LEN + payload_size);
    hashed.extend_from_slice(header);
    hashed.extend_from_slice(payload);
    let (low, _) = city_hash128(&hashed);
    let mut expected = [0u8; 8];
    expected.copy_from_slice(&checksum[..8]);
    if u64::from_le_bytes(expected) != low {
        return Err(BinaryError::malformed("frame checksum mismatch"));
    }

    let data = match method {
        CompressionMethod::None => {
            if payload_size != decompressed_size {
                return Err(BinaryError::malformed(format!(
                    "stored frame holds {payload_size} bytes, header says {decompressed_size}"
                )));
            }
            payload.to_vec()
        }
        CompressionMethod::Lz4 => {
            let data = lz4_flex::block::decompress(payload, decompressed_size)
                .map_err(|e| BinaryError::malformed(format!("lz4: {e}")))?;
            if data.len() != decompressed_size {
                return Err(BinaryError::malformed("lz4 output shorter than declared"));
            }
            data
        }
    };

    trace!(
        "read {:?} frame: {} -> {} bytes",
        method, compressed_size, decompressed_size
    );
    *reader = probe;
    Ok(data)
}

/// Writes `payload` as a single frame.
pub fn write_frame(payload: &[u8], method: CompressionMethod, writer: &mut BinaryWriter) {
    let compressed = match method {
        CompressionMethod::None => payload.to_vec(),
        CompressionMethod::Lz4 => lz4_flex::block::compress(payload),
    };

    let mut framed = BinaryWriter::with_capacity(HEADER_LEN + compressed.len());
    framed.write_u8(method.byte());
    framed.write_u32((HEADER_LEN + compressed.len()) as u32);
    framed.write_u32(payload.len() as u32);
    framed.write_bytes(&compressed);

    let (low, high) = city_hash128(framed.as_slice());
    writer.write_u64(low);
    writer.write_u64(high);
    writer.write_bytes(framed.as_slice());

    trace!(
        "wrote {:?} frame: {} -> {} bytes",
        method,
        payload.len(),
        HEADER_LEN + compressed.len()
    );
}

/// Splits `payload` into frames of at most `max_frame` bytes. An empty payload still
/// produces one frame.
pub fn write_frames(payload: &[u8], method: CompressionMethod, max_frame: usize, writer: &mut BinaryWriter) {
    if payload.is_empty() {
        write_frame(payload, method, writer);
        return;
    }
    for chunk in payload.chunks(max_frame.max(1)) {
        write_frame(chunk, method, writer);
    }
}
