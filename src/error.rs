use std::io;

use thiserror::Error;

use crate::binary::BinaryError;
use crate::protocol::{ServerException, TransportError};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Binary(#[from] BinaryError),

    #[error(transparent)]
    Server(#[from] ServerException),

    /// A bounded wait elapsed. The connection was closed.
    #[error("timeout: {0}")]
    Timeout(String),

    /// The block passed to an insert does not fit the table. The exchange was aborted
    /// cleanly and the connection stays usable.
    #[error("malformed: insert block does not match table: {0}")]
    Mismatch(String),

    /// The connection went away in the middle of an exchange.
    #[error("protocol error: {0}")]
    Closed(String),

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("tls error: {0}")]
    Tls(String),

    #[error("conversion error: {0}")]
    Conversion(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            Error::Binary(BinaryError::Malformed(_)) | Error::Mismatch(_) | Error::Closed(_)
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }

    /// The server exception, if this error is one.
    pub fn server_exception(&self) -> Option<&ServerException> {
        match self {
            Error::Server(e) => Some(e),
            _ => None,
        }
    }

    /// Whether the connection that produced this error must be replaced. Only a server
    /// exception or an aborted insert leave the session in a known state.
    pub fn requires_reset(&self) -> bool {
        !matches!(self, Error::Server(_) | Error::Mismatch(_))
    }
}

impl From<TransportError> for Error {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Binary(e) => Error::Binary(e),
            TransportError::Io(e) => Error::Io(e),
            TransportError::Closed => Error::Closed("connection closed by server".to_string()),
        }
    }
}

impl From<rustls::Error> for Error {
    fn from(err: rustls::Error) -> Self {
        Error::Tls(err.to_string())
    }
}
