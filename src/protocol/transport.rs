use std::io::{self, Read, Write};

use bytes::{Buf, BytesMut};
use log::trace;
use thiserror::Error;

use crate::binary::{BinaryError, BinaryReader, BinaryWriter};

use super::{Request, Response, ServerContext};

/// Bytes requested from the stream per read.
const READ_CHUNK: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    Binary(#[from] BinaryError),
    #[error("transport io error: {0}")]
    Io(#[from] io::Error),
    #[error("connection closed by peer")]
    Closed,
}

impl TransportError {
    /// A read timeout on a stream with a short poll interval. Buffered bytes are kept, so
    /// the read can simply be retried.
    pub fn is_would_block(&self) -> bool {
        matches!(self, TransportError::Io(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut))
    }
}

/// Reads and writes protocol packets over a byte stream.
///
/// Incoming bytes are buffered until a whole packet decodes, so a packet split across
/// any number of reads comes out in one piece. Partial packets survive a failed read.
pub struct ProtocolTransport<T: Read + Write> {
    stream: T,
    buffer: BytesMut,
    compression: bool,
    context: Option<ServerContext>,
}

impl<T: Read + Write> ProtocolTransport<T> {
    pub fn new(stream: T) -> Self {
        Self {
            stream,
            buffer: BytesMut::with_capacity(READ_CHUNK),
            compression: false,
            context: None,
        }
    }

    /// Whether blocks in Data, Totals and Extremes packets are compressed.
    pub fn with_compression(mut self, compression: bool) -> Self {
        self.compression = compression;
        self
    }

    pub fn set_compression(&mut self, compression: bool) {
        self.compression = compression;
    }

    pub fn set_server_context(&mut self, context: ServerContext) {
        self.context = Some(context);
    }

    pub fn get_ref(&self) -> &T {
        &self.stream
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.stream
    }

    pub fn into_inner(self) -> T {
        self.stream
    }

    pub fn write_request(&mut self, request: &Request) -> Result<(), TransportError> {
        let mut writer = BinaryWriter::new();
        request.write(&mut writer, self.compression)?;
        self.flush_packet(writer)
    }

    pub fn write_response(&mut self, response: &Response) -> Result<(), TransportError> {
        let mut writer = BinaryWriter::new();
        response.write(&mut writer, self.compression)?;
        self.flush_packet(writer)
    }

    pub fn read_response(&mut self) -> Result<Response, TransportError> {
        let compression = self.compression;
        let context = self.context.clone();
        self.read_packet(|reader| Response::read(reader, compression, context.as_ref()))
    }

    pub fn read_request(&mut self) -> Result<Request, TransportError> {
        let compression = self.compression;
        self.read_packet(|reader| Request::read(reader, compression))
    }

    fn flush_packet(&mut self, writer: BinaryWriter) -> Result<(), TransportError> {
        self.stream.write_all(writer.as_slice())?;
        self.stream.flush()?;
        Ok(())
    }

    fn read_packet<P, F>(&mut self, mut parse: F) -> Result<P, TransportError>
    where
        F: FnMut(&mut BinaryReader<'_>) -> Result<P, BinaryError>,
    {
        loop {
            if !self.buffer.is_empty() {
                let mut reader = BinaryReader::new(&self.buffer);
                match parse(&mut reader) {
                    Ok(packet) => {
                        let consumed = reader.position();
                        self.buffer.advance(consumed);
                        return Ok(packet);
                    }
                    Err(BinaryError::NeedMoreData) => {}
                    Err(e) => return Err(e.into()),
                }
            }
            self.fill()?;
        }
    }

    fn fill(&mut self) -> Result<(), TransportError> {
        let mut chunk = [0u8; READ_CHUNK];
        let n = loop {
            match self.stream.read(&mut chunk) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        };
        if n == 0 {
            return Err(TransportError::Closed);
        }
        trace!("buffered {n} bytes, {} pending", self.buffer.len() + n);
        self.buffer.extend_from_slice(&chunk[..n]);
        Ok(())
    }
}
