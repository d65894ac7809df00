//! Dispatch-facing error taxonomy.
//!
//! Every variant maps onto a single wire response in the originating
//! transport's native shape: an HTTP status and JSON body, a TCP framed
//! payload, or a WebSocket text frame. AMQP consumers have no response
//! path, so errors raised while handling an AMQP message are logged only.

use serde_json::Value;
use thiserror::Error;

/// Result alias used throughout the dispatch path.
pub type DispatchResult<T> = std::result::Result<T, DispatchError>;

/// The error taxonomy a predicate, handler, or listener may raise.
///
/// Each variant carries an optional human-readable message and an
/// optional JSON data payload, mirroring the structured response body
/// written through the response sink.
#[derive(Error, Debug, Clone)]
pub enum DispatchError {
    /// Malformed input or a failed predicate side condition.
    #[error("bad request: {}", message.as_deref().unwrap_or("no detail"))]
    BadRequest {
        message: Option<String>,
        data: Option<Value>,
    },

    /// Raised by a predicate or handler to short-circuit authentication.
    #[error("unauthorized: {}", message.as_deref().unwrap_or("no detail"))]
    Unauthorized {
        message: Option<String>,
        data: Option<Value>,
    },

    /// Raised by a predicate or handler to short-circuit authorization.
    #[error("forbidden: {}", message.as_deref().unwrap_or("no detail"))]
    Forbidden {
        message: Option<String>,
        data: Option<Value>,
    },

    /// No handler matched the incoming request.
    #[error("not found: {}", message.as_deref().unwrap_or("no detail"))]
    NotFound {
        message: Option<String>,
        data: Option<Value>,
    },

    /// Unexpected failure in a handler, predicate, or listener, including
    /// DI resolution failures (reported with the failing parameter name
    /// folded into `message`).
    #[error("internal server error: {}", message.as_deref().unwrap_or("no detail"))]
    InternalServerError {
        message: Option<String>,
        data: Option<Value>,
    },
}

impl DispatchError {
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        DispatchError::BadRequest {
            message: Some(message.into()),
            data: None,
        }
    }

    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        DispatchError::Unauthorized {
            message: Some(message.into()),
            data: None,
        }
    }

    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        DispatchError::Forbidden {
            message: Some(message.into()),
            data: None,
        }
    }

    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        DispatchError::NotFound {
            message: Some(message.into()),
            data: None,
        }
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        DispatchError::InternalServerError {
            message: Some(message.into()),
            data: None,
        }
    }

    /// Attach or replace the JSON data payload.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        match &mut self {
            DispatchError::BadRequest { data: d, .. }
            | DispatchError::Unauthorized { data: d, .. }
            | DispatchError::Forbidden { data: d, .. }
            | DispatchError::NotFound { data: d, .. }
            | DispatchError::InternalServerError { data: d, .. } => *d = Some(data),
        }
        self
    }

    /// The equivalent HTTP status code, used by every transport that has
    /// a status-like concept (HTTP directly; TCP/WebSocket fold it into
    /// the framed/text error payload).
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            DispatchError::BadRequest { .. } => 400,
            DispatchError::Unauthorized { .. } => 401,
            DispatchError::Forbidden { .. } => 403,
            DispatchError::NotFound { .. } => 404,
            DispatchError::InternalServerError { .. } => 500,
        }
    }

    /// The short kind name surfaced in the structured error body, e.g.
    /// `"bad_request"`.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::BadRequest { .. } => "bad_request",
            DispatchError::Unauthorized { .. } => "unauthorized",
            DispatchError::Forbidden { .. } => "forbidden",
            DispatchError::NotFound { .. } => "not_found",
            DispatchError::InternalServerError { .. } => "internal_server_error",
        }
    }

    /// The structured JSON body written through the response sink:
    /// `{"error": kind, "message": ..., "data": ...}`.
    #[must_use]
    pub fn to_body(&self) -> Value {
        let (message, data) = match self {
            DispatchError::BadRequest { message, data }
            | DispatchError::Unauthorized { message, data }
            | DispatchError::Forbidden { message, data }
            | DispatchError::NotFound { message, data }
            | DispatchError::InternalServerError { message, data } => (message, data),
        };
        serde_json::json!({
            "error": self.kind(),
            "message": message,
            "data": data,
        })
    }

    /// True for a resolution failure surfaced with a failing parameter
    /// name, per the DI error-propagation policy: always maps onto
    /// `InternalServerError`.
    #[must_use]
    pub fn from_di_error(parameter: &str, reason: impl std::fmt::Display) -> Self {
        DispatchError::InternalServerError {
            message: Some(format!("failed to resolve parameter `{parameter}`: {reason}")),
            data: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_taxonomy() {
        assert_eq!(DispatchError::bad_request("x").status_code(), 400);
        assert_eq!(DispatchError::unauthorized("x").status_code(), 401);
        assert_eq!(DispatchError::forbidden("x").status_code(), 403);
        assert_eq!(DispatchError::not_found("x").status_code(), 404);
        assert_eq!(DispatchError::internal("x").status_code(), 500);
    }

    #[test]
    fn body_carries_kind_and_message() {
        let err = DispatchError::not_found("no route").with_data(serde_json::json!({"path": "/x"}));
        let body = err.to_body();
        assert_eq!(body["error"], "not_found");
        assert_eq!(body["message"], "no route");
        assert_eq!(body["data"]["path"], "/x");
    }
}
