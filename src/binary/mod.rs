//! Primitive wire codec.
//!
//! Every higher layer of the native protocol (column codecs, blocks, compressed frames and
//! protocol messages) is built on the two types in this module:
//!
//! - [`BinaryReader`]: a cursor over a borrowed byte slice.
//! - [`BinaryWriter`]: an append-only byte sink.
//!
//! # Encoding rules
//!
//! - Variable-length integers are unsigned LEB128: 7 data bits per byte, the high bit marks
//!   continuation. A varint longer than 10 bytes is malformed.
//! - Fixed-width integers and floats are little-endian; floats travel as their raw bit pattern.
//! - Strings and byte blobs are a varint length followed by the raw bytes.
//!
//! # Short reads
//!
//! Reading past the end of the available bytes yields [`BinaryError::NeedMoreData`] rather than
//! a hard failure. Callers that receive data incrementally (the response decoder and the
//! compressed block reader) buffer more bytes and retry the whole read.
mod reader;
mod writer;

use thiserror::Error;

pub use reader::BinaryReader;
pub use writer::BinaryWriter;

/// Maximum number of bytes a single varint may occupy on the wire.
pub const MAX_VARINT_LEN: usize = 10;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BinaryError {
    /// The buffer ended before the value was complete. Recoverable by buffering.
    #[error("need more data")]
    NeedMoreData,

    #[error("malformed: {0}")]
    Malformed(String),

    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl BinaryError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed(reason.into())
    }

    pub fn unsupported(reason: impl Into<String>) -> Self {
        Self::Unsupported(reason.into())
    }

    pub fn is_need_more_data(&self) -> bool {
        matches!(self, Self::NeedMoreData)
    }
}
