use bytes::Buf;

use super::{BinaryError, MAX_VARINT_LEN};

/// Forward-only cursor over a borrowed byte slice.
///
/// Fixed-width reads check the remaining length first, so a short read leaves the cursor
/// where it was and reports [`BinaryError::NeedMoreData`].
#[derive(Debug, Clone)]
pub struct BinaryReader<'a> {
    buf: &'a [u8],
    len: usize,
}

macro_rules! read_fixed {
    ($name:ident, $ty:ty, $get:ident) => {
        pub fn $name(&mut self) -> Result<$ty, BinaryError> {
            self.ensure(size_of::<$ty>())?;
            Ok(self.buf.$get())
        }
    };
}

impl<'a> BinaryReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            len: buf.len(),
        }
    }

    /// Number of bytes consumed so far.
    pub fn position(&self) -> usize {
        self.len - self.buf.len()
    }

    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn ensure(&self, n: usize) -> Result<(), BinaryError> {
        if self.buf.remaining() < n {
            return Err(BinaryError::NeedMoreData);
        }
        Ok(())
    }

    pub fn read_varint(&mut self) -> Result<u64, BinaryError> {
        let mut result = 0u64;
        for i in 0..MAX_VARINT_LEN {
            let byte = *self.buf.get(i).ok_or(BinaryError::NeedMoreData)?;
            if i == MAX_VARINT_LEN - 1 && byte & 0x7f > 1 {
                return Err(BinaryError::malformed("varint overflows 64 bits"));
            }
            result |= u64::from(byte & 0x7f) << (7 * i as u32);
            if byte & 0x80 == 0 {
                self.buf.advance(i + 1);
                return Ok(result);
            }
        }
        Err(BinaryError::malformed("varint longer than 10 bytes"))
    }

    /// Reads a varint encoded boolean.
    pub fn read_bool(&mut self) -> Result<bool, BinaryError> {
        Ok(self.read_varint()? != 0)
    }

    read_fixed!(read_u8, u8, get_u8);
    read_fixed!(read_i8, i8, get_i8);
    read_fixed!(read_u16, u16, get_u16_le);
    read_fixed!(read_i16, i16, get_i16_le);
    read_fixed!(read_u32, u32, get_u32_le);
    read_fixed!(read_i32, i32, get_i32_le);
    read_fixed!(read_u64, u64, get_u64_le);
    read_fixed!(read_i64, i64, get_i64_le);

    pub fn read_f32(&mut self) -> Result<f32, BinaryError> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    pub fn read_f64(&mut self) -> Result<f64, BinaryError> {
        Ok(f64::from_bits(self.read_u64()?))
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], BinaryError> {
        self.ensure(n)?;
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    /// Reads a varint length followed by that many raw bytes.
    pub fn read_binary(&mut self) -> Result<&'a [u8], BinaryError> {
        let mut probe = self.clone();
        let len = probe.read_varint()? as usize;
        let bytes = probe.read_bytes(len)?;
        *self = probe;
        Ok(bytes)
    }

    /// Reads a length-prefixed string. Invalid UTF-8 sequences are replaced.
    pub fn read_string(&mut self) -> Result<String, BinaryError> {
        let bytes = self.read_binary()?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}
