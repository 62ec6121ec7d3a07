use thiserror::Error;

use crate::binary::{BinaryError, BinaryReader, BinaryWriter};

/// Chains deeper than this are rejected as malformed.
const MAX_NESTING: usize = 64;

/// An error reported by the server, optionally wrapping the exception that caused it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("server exception {code} ({name}): {message}")]
pub struct ServerException {
    pub code: i32,
    pub name: String,
    pub message: String,
    pub stack_trace: String,
    #[source]
    pub nested: Option<Box<ServerException>>,
}

impl ServerException {
    pub fn new(code: i32, name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            name: name.into(),
            message: message.into(),
            stack_trace: String::new(),
            nested: None,
        }
    }

    pub fn with_nested(mut self, nested: ServerException) -> Self {
        self.nested = Some(Box::new(nested));
        self
    }

    /// This exception followed by its nested chain.
    pub fn chain(&self) -> impl Iterator<Item = &ServerException> {
        std::iter::successors(Some(self), |e| e.nested.as_deref())
    }

    pub fn read(reader: &mut BinaryReader<'_>) -> Result<Self, BinaryError> {
        Self::read_nested(reader, 0)
    }

    fn read_nested(reader: &mut BinaryReader<'_>, depth: usize) -> Result<Self, BinaryError> {
        if depth > MAX_NESTING {
            return Err(BinaryError::malformed("exception chain too deep"));
        }
        let code = reader.read_i32()?;
        let name = reader.read_string()?;
        let message = reader.read_string()?;
        let stack_trace = reader.read_string()?;
        let nested = if reader.read_bool()? {
            Some(Box::new(Self::read_nested(reader, depth + 1)?))
        } else {
            None
        };
        Ok(Self {
            code,
            name,
            message,
            stack_trace,
            nested,
        })
    }

    pub fn write(&self, writer: &mut BinaryWriter) {
        for exception in self.chain() {
            writer.write_i32(exception.code);
            writer.write_string(&exception.name);
            writer.write_string(&exception.message);
            writer.write_string(&exception.stack_trace);
            writer.write_bool(exception.nested.is_some());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn nested_chain_round_trip() {
        let exception = ServerException::new(60, "DB::Exception", "Table default.t doesn't exist")
            .with_nested(ServerException::new(1000, "Poco::Exception", "inner"));
        let mut writer = BinaryWriter::new();
        exception.write(&mut writer);
        let bytes = writer.into_inner();

        let mut reader = BinaryReader::new(&bytes);
        let decoded = ServerException::read(&mut reader).unwrap();
        assert!(reader.is_empty());
        assert_eq!(decoded, exception);
        assert_eq!(decoded.chain().count(), 2);

        let source = decoded.source().unwrap();
        assert_eq!(source.to_string(), "server exception 1000 (Poco::Exception): inner");
    }

    #[test]
    fn code_is_little_endian_i32() {
        let mut writer = BinaryWriter::new();
        ServerException::new(-2, "", "").write(&mut writer);
        assert_eq!(&writer.as_slice()[..4], &[0xfe, 0xff, 0xff, 0xff]);
    }
}
