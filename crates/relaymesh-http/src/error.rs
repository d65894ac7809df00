//! Listener-level error taxonomy: failures that happen before a request
//! ever becomes a [`relaymesh_core::Message`] (bind failures, malformed
//! bodies, TLS setup). Once a Context exists, handler/predicate errors
//! flow through `relaymesh_core::DispatchError` instead.

use thiserror::Error;

pub type HttpResult<T> = std::result::Result<T, HttpError>;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TLS configuration: {0}")]
    Tls(String),

    #[error("malformed request body: {0}")]
    MalformedBody(String),

    #[error("multipart decoding failed: {0}")]
    Multipart(String),
}
