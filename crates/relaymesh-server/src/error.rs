//! Host-level error taxonomy: configuration and startup/shutdown
//! failures. Per-request failures flow through
//! `relaymesh_core::DispatchError` instead.

use thiserror::Error;

pub type HostResult<T> = std::result::Result<T, HostError>;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HostError {
    #[error("failed to load host configuration: {0}")]
    Config(#[from] config::ConfigError),

    /// §6.4: `rabbit` entries must name exactly one of `queue`/`exchange`.
    #[error("invalid AMQP listener configuration: {0}")]
    Amqp(#[from] relaymesh_amqp::AmqpError),

    #[error("invalid TLS configuration: {0}")]
    Tls(String),

    /// §4.4/§C.2: the `router` host option named an unknown context kind.
    #[error("invalid router configuration: {0}")]
    Router(String),

    #[error("no listeners configured: at least one of 'server'/'http', 'tcp', or 'rabbit' is required")]
    NoListeners,

    #[error("dependency injection setup failed: {0}")]
    Di(#[from] relaymesh_di::DiError),

    #[error("http listener failed: {0}")]
    Http(#[from] relaymesh_http::HttpError),

    #[error("tcp listener failed: {0}")]
    Tcp(#[from] relaymesh_tcp::TcpError),
}
