//! WebSocket session/registry error taxonomy.

use thiserror::Error;

pub type WsResult<T> = std::result::Result<T, WsError>;

#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum WsError {
    #[error("session `{0}` is not registered")]
    UnknownSession(String),

    #[error("socket send failed: {0}")]
    SendFailed(String),
}
