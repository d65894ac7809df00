//! The per-session lifecycle task: a message-passing loop owned by each
//! session. §4.5 / §5.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Message as WsMessage;
use bytes::Bytes;
use futures_util::stream::SplitStream;
use futures_util::StreamExt;
use relaymesh_core::{Dispatch, Message, WsFrameKind};
use tracing::{debug, warn};

use crate::session::Session;

const CLOSE_TIMEOUT: Duration = Duration::from_secs(3);

/// Run one session end-to-end: enqueue CONNECT, heartbeat while reading
/// frames, enqueue DISCONNECT on exit. Returns once the socket is fully
/// closed; the caller (the registry) removes the session from its
/// indexes after this returns.
pub(crate) async fn run(
    session: Arc<Session>,
    mut stream: SplitStream<axum::extract::ws::WebSocket>,
    dispatch: Arc<dyn Dispatch>,
) {
    dispatch
        .dispatch(Message::WebSocket {
            session_id: session.id().to_string(),
            kind: WsFrameKind::Connect,
            cms: session.cms().clone(),
            payload: None,
        })
        .await;

    let mut heartbeat = tokio::time::interval(session.heartbeat_interval());
    heartbeat.tick().await; // first tick fires immediately; skip it

    let mut close_code: Option<u16> = None;
    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                if !session.ping().await {
                    break;
                }
            }
            frame = stream.next() => {
                match frame {
                    Some(Ok(WsMessage::Text(text))) => {
                        dispatch
                            .dispatch(Message::WebSocket {
                                session_id: session.id().to_string(),
                                kind: WsFrameKind::Text,
                                cms: session.cms().clone(),
                                payload: Some(Bytes::from(text.to_string())),
                            })
                            .await;
                    }
                    Some(Ok(WsMessage::Binary(bytes))) => {
                        dispatch
                            .dispatch(Message::WebSocket {
                                session_id: session.id().to_string(),
                                kind: WsFrameKind::Binary,
                                cms: session.cms().clone(),
                                payload: Some(bytes),
                            })
                            .await;
                    }
                    Some(Ok(WsMessage::Close(frame))) => {
                        close_code = frame.map(|f| f.code);
                        break;
                    }
                    Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_))) => {
                        // axum answers pings transparently; nothing to enqueue.
                    }
                    Some(Err(err)) => {
                        warn!(session = session.id(), error = %err, "websocket read error");
                        dispatch
                            .dispatch(Message::WebSocket {
                                session_id: session.id().to_string(),
                                kind: WsFrameKind::Error,
                                cms: session.cms().clone(),
                                payload: None,
                            })
                            .await;
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    session.mark_closed();
    let mut disconnect_cms = session.cms().clone();
    if let Some(code) = close_code {
        disconnect_cms.set("close_code", serde_json::json!(code));
    }
    dispatch
        .dispatch(Message::WebSocket {
            session_id: session.id().to_string(),
            kind: WsFrameKind::Disconnect,
            cms: disconnect_cms,
            payload: None,
        })
        .await;

    debug!(session = session.id(), "session lifecycle ended");
    let _ = tokio::time::timeout(CLOSE_TIMEOUT, session.close(1000, "session ended")).await;
}
