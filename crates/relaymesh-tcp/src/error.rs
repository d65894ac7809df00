//! TCP listener / framing error taxonomy.

use thiserror::Error;

pub type TcpResult<T> = std::result::Result<T, TcpError>;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TcpError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// A frame violated the wire format: a negative or over-limit length
    /// field, or an unrecognized type byte. The connection is aborted.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("io error: {0}")]
    Io(#[source] std::io::Error),
}
