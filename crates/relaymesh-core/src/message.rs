//! The normalized message envelope every listener produces and the
//! dispatcher consumes, plus the response sink used by request/response
//! transports to hand a result back to the originating listener.

use bytes::Bytes;
use tokio::sync::oneshot;

use crate::cms::CmsObject;

/// What a response sink delivers back to the listener that created it.
#[derive(Debug)]
pub enum ResponsePayload {
    /// A JSON-able cms-object response, the common case for HTTP and TCP
    /// handler return values.
    Cms(CmsObject),
    /// The dispatcher's encoding of a handler's ordinary return value
    /// (§4.4 step 5): any JSON value, object or not, written back as
    /// `application/json` with `Content-Type` implied by the transport.
    Json(serde_json::Value),
    /// A raw byte payload, used for TCP responses and binary WebSocket
    /// frames.
    Raw(Bytes),
    /// A structured error, carrying its HTTP-equivalent status so every
    /// transport can render it without re-deriving one.
    Error {
        status: u16,
        body: serde_json::Value,
    },
    /// The finalized body of a Context that transitioned to streaming
    /// mode via `start_stream_response` (§4.4.1): every chunk the
    /// handler wrote, concatenated, plus the status/headers it declared
    /// up front. The dispatcher sends this once the handler returns;
    /// the HTTP listener writes it with `Transfer-Encoding: chunked`.
    Stream {
        status: u16,
        headers: Vec<(String, String)>,
        body: Bytes,
    },
}

/// One-shot channel handed to a handler's caller; the dispatcher sends
/// exactly one [`ResponsePayload`] and the listener awaits it to finish
/// writing the transport-native response.
pub type ResponseSink = oneshot::Sender<ResponsePayload>;
pub type ResponseReceiver = oneshot::Receiver<ResponsePayload>;

#[must_use]
pub fn response_channel() -> (ResponseSink, ResponseReceiver) {
    oneshot::channel()
}

/// A WebSocket frame kind, mirroring the states a session's socket
/// stream can yield.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WsFrameKind {
    Connect,
    Text,
    Binary,
    Close,
    Disconnect,
    Error,
}

/// The normalized request envelope. Each variant carries what its
/// transport needs to write a response, if any.
pub enum Message {
    /// Parsed cms-object plus a sink for the structured HTTP-shaped
    /// response (status implied by `ResponsePayload`, headers fixed to
    /// `content-type: application/json` unless streaming).
    Http {
        cms: CmsObject,
        respond_to: ResponseSink,
    },
    /// One framed TCP request; the response is written back through the
    /// same connection using the binary framing codec, so the sink just
    /// carries the value to encode.
    Tcp {
        session_id: String,
        cms: CmsObject,
        respond_to: ResponseSink,
    },
    /// A WebSocket frame arriving on an existing session. Sends back to
    /// the client go through the session handle directly, not through a
    /// response sink (fire-and-forget from the dispatcher's point of
    /// view once it enqueues a reply via the session).
    WebSocket {
        session_id: String,
        kind: WsFrameKind,
        cms: CmsObject,
        payload: Option<Bytes>,
    },
    /// An AMQP delivery. No response path; handler errors are logged by
    /// the listener and do not propagate.
    Amqp {
        queue: Option<String>,
        routing_key: Option<String>,
        cms: CmsObject,
    },
}

impl Message {
    /// The cms-object carried by every variant.
    #[must_use]
    pub fn cms(&self) -> &CmsObject {
        match self {
            Message::Http { cms, .. }
            | Message::Tcp { cms, .. }
            | Message::WebSocket { cms, .. }
            | Message::Amqp { cms, .. } => cms,
        }
    }

    #[must_use]
    pub fn cms_mut(&mut self) -> &mut CmsObject {
        match self {
            Message::Http { cms, .. }
            | Message::Tcp { cms, .. }
            | Message::WebSocket { cms, .. }
            | Message::Amqp { cms, .. } => cms,
        }
    }

    /// The session id carried by TCP and WebSocket messages, if any.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Message::Tcp { session_id, .. } | Message::WebSocket { session_id, .. } => Some(session_id),
            Message::Http { .. } | Message::Amqp { .. } => None,
        }
    }
}
