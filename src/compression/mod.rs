//! Compressed frame layer.
//!
//! When a session negotiates compression, every block travels inside one or more frames:
//!
//! ```text
//! [16-byte checksum][method: u8][compressed size incl. header: u32][decompressed size: u32][payload]
//! ```
//!
//! The checksum is [`city_hash128`] over header and payload, written low half first. A block
//! may span several frames, so readers decompress frame by frame into a buffer and reparse the
//! block until it is complete.
mod cityhash;
mod frame;

pub use cityhash::city_hash128;
pub use frame::{read_frame, write_frame, write_frames};

use crate::binary::BinaryError;

pub const CHECKSUM_LEN: usize = 16;
pub const HEADER_LEN: usize = 9;

/// Payload size used when splitting outgoing data into frames.
pub const DEFAULT_FRAME_SIZE: usize = 1 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    /// Payload stored verbatim.
    None,
    Lz4,
}

impl CompressionMethod {
    pub fn byte(self) -> u8 {
        match self {
            CompressionMethod::None => 0x02,
            CompressionMethod::Lz4 => 0x82,
        }
    }

    pub fn from_byte(byte: u8) -> Result<Self, BinaryError> {
        match byte {
            0x02 => Ok(CompressionMethod::None),
            0x82 => Ok(CompressionMethod::Lz4),
            other => Err(BinaryError::unsupported(format!("compression method {other:#04x}"))),
        }
    }
}
