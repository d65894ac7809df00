//! One active WebSocket connection, owned by the [`crate::registry::SessionRegistry`]
//! until it transitions to CLOSED.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use axum::extract::ws::{Message as WsMessage, Utf8Bytes};
use bytes::Bytes;
use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use relaymesh_core::CmsObject;
use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;

use crate::registry::SessionRegistry;

pub(crate) type WsSink = SplitSink<axum::extract::ws::WebSocket, WsMessage>;

/// Peer metadata captured from the upgrade request: the URL it upgraded
/// on and the request's headers.
#[derive(Debug, Clone, Default)]
pub struct PeerMeta {
    pub url: String,
    pub headers: HashMap<String, String>,
}

/// A payload fan-out sends hand to one or many sessions. Cheap to clone
/// so the registry can hand the same payload to every session in a
/// group or broadcast without re-serializing per recipient.
#[derive(Clone)]
pub enum Fanout {
    Text(Arc<str>),
    Bytes(Bytes),
}

impl Fanout {
    #[must_use]
    pub fn text(text: impl Into<Arc<str>>) -> Self {
        Fanout::Text(text.into())
    }

    #[must_use]
    pub fn json(value: &serde_json::Value) -> Self {
        Fanout::Text(Arc::from(value.to_string()))
    }

    #[must_use]
    pub fn bytes(bytes: impl Into<Bytes>) -> Self {
        Fanout::Bytes(bytes.into())
    }
}

/// One WebSocket session. Lifecycle states NEW -> OPEN -> (CLOSING) ->
/// CLOSED are modeled by the `closed` flag plus the owning lifecycle
/// task's loop; there is no separate CLOSING state machine to drive,
/// since the only transition out of OPEN is "stop reading and close".
pub struct Session {
    id: String,
    peer: PeerMeta,
    cms: CmsObject,
    sink: AsyncMutex<WsSink>,
    closed: AtomicBool,
    heartbeat_interval: std::time::Duration,
    /// Non-owning back-reference: sessions must not keep the registry
    /// (and through it, the host) alive past shutdown.
    registry: Weak<SessionRegistry>,
}

impl Session {
    pub(crate) fn new(
        id: String,
        peer: PeerMeta,
        cms: CmsObject,
        sink: WsSink,
        heartbeat_interval: std::time::Duration,
        registry: Weak<SessionRegistry>,
    ) -> Self {
        Self {
            id,
            peer,
            cms,
            sink: AsyncMutex::new(sink),
            closed: AtomicBool::new(false),
            heartbeat_interval,
            registry,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn peer(&self) -> &PeerMeta {
        &self.peer
    }

    #[must_use]
    pub fn cms(&self) -> &CmsObject {
        &self.cms
    }

    #[must_use]
    pub fn heartbeat_interval(&self) -> std::time::Duration {
        self.heartbeat_interval
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn registry(&self) -> Option<Arc<SessionRegistry>> {
        self.registry.upgrade()
    }

    /// Send a text frame. No-ops (returns `false`) if the socket is
    /// already closed, per §4.5's send contract.
    pub async fn send_text(&self, text: impl Into<String>) -> bool {
        self.write(WsMessage::Text(Utf8Bytes::from(text.into()))).await
    }

    /// Serialize `value` as JSON and send it as a text frame.
    pub async fn send_json(&self, value: &serde_json::Value) -> bool {
        self.send_text(value.to_string()).await
    }

    /// Send a binary frame.
    pub async fn send_bytes(&self, bytes: impl Into<Bytes>) -> bool {
        self.write(WsMessage::Binary(bytes.into())).await
    }

    pub(crate) async fn send_fanout(&self, payload: Fanout) -> bool {
        match payload {
            Fanout::Text(text) => self.send_text(text.to_string()).await,
            Fanout::Bytes(bytes) => self.send_bytes(bytes).await,
        }
    }

    pub(crate) async fn ping(&self) -> bool {
        self.write(WsMessage::Ping(Bytes::new())).await
    }

    /// Close the socket with the given close code/reason. No-op if
    /// already closed.
    pub async fn close(&self, code: u16, reason: impl Into<String>) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        let frame = axum::extract::ws::CloseFrame {
            code,
            reason: Utf8Bytes::from(reason.into()),
        };
        let mut sink = self.sink.lock().await;
        let sent = sink.send(WsMessage::Close(Some(frame))).await.is_ok();
        let _ = sink.close().await;
        sent
    }

    /// Mark the session closed without attempting another socket write,
    /// used when the peer already sent CLOSE or the read loop errored.
    pub(crate) fn mark_closed(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    async fn write(&self, message: WsMessage) -> bool {
        if self.is_closed() {
            return false;
        }
        let mut sink = self.sink.lock().await;
        match sink.send(message).await {
            Ok(()) => true,
            Err(err) => {
                debug!(session = %self.id, error = %err, "websocket send failed");
                false
            }
        }
    }
}
