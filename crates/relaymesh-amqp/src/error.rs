//! AMQP listener error taxonomy.

use thiserror::Error;

pub type AmqpResult<T> = std::result::Result<T, AmqpError>;

#[derive(Error, Debug)]
pub enum AmqpError {
    /// `queue` and `exchange` are mutually exclusive, and exactly one
    /// must be set (§6.4).
    #[error("exactly one of 'queue' or 'exchange' must be set in AMQP connection options")]
    TargetConflict,

    #[error("failed to connect to AMQP broker at {url}: {source}")]
    Connect { url: String, source: lapin::Error },

    #[error("AMQP protocol error: {0}")]
    Protocol(#[from] lapin::Error),

    /// The consumer stream ended without the broker reporting an error
    /// (e.g. the channel closed underneath us); treated the same as a
    /// protocol failure so the caller reconnects.
    #[error("AMQP consumer stream closed unexpectedly")]
    ConsumerClosed,
}
