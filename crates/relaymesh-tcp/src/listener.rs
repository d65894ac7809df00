//! The TCP listener (§4.6, §6.1): accepts connections, reads framed
//! messages, dispatches each as a [`relaymesh_core::Message::Tcp`], and
//! writes the handler's result back using the same framing.

use std::net::SocketAddr;
use std::sync::Arc;

use relaymesh_core::{response_channel, CmsObject, Dispatch, Message, ResponsePayload};
use tokio::net::{TcpListener as TokioTcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::error::{TcpError, TcpResult};
use crate::frame::{Frame, FrameType, DEFAULT_MAX_FRAME_LEN};

/// TCP listener configuration.
#[derive(Debug, Clone)]
pub struct TcpListenerConfig {
    pub addr: SocketAddr,
    /// Ceiling on session-id/payload length fields; see §6.1.
    pub max_frame_len: u32,
}

impl TcpListenerConfig {
    #[must_use]
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

/// Bind and serve the TCP endpoint until `shutdown` fires. Each accepted
/// connection is handled on its own task; a connection reads frames until
/// it gets a non-continuation frame type, a `Disconnect`, or EOF.
pub async fn serve(
    config: TcpListenerConfig,
    dispatch: Arc<dyn Dispatch>,
    mut shutdown: broadcast::Receiver<()>,
) -> TcpResult<()> {
    let listener = TokioTcpListener::bind(config.addr)
        .await
        .map_err(|source| TcpError::Bind {
            addr: config.addr.to_string(),
            source,
        })?;
    info!(addr = %config.addr, "tcp listener bound");

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                info!("tcp listener shutting down");
                break;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        let dispatch = Arc::clone(&dispatch);
                        let max_frame_len = config.max_frame_len;
                        tokio::spawn(async move {
                            if let Err(err) = handle_connection(stream, peer, dispatch, max_frame_len).await {
                                warn!(%peer, error = %err, "tcp connection closed with error");
                            }
                        });
                    }
                    Err(err) => {
                        error!(error = %err, "tcp accept failed");
                    }
                }
            }
        }
    }
    Ok(())
}

async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    dispatch: Arc<dyn Dispatch>,
    max_frame_len: u32,
) -> TcpResult<()> {
    loop {
        let frame = match Frame::read_from(&mut stream, max_frame_len).await {
            Ok(frame) => frame,
            Err(TcpError::Io(err)) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Ok(());
            }
            Err(err) => return Err(err),
        };
        debug!(%peer, session = %frame.session_id, frame_type = ?frame.frame_type, "tcp frame received");

        if !frame.frame_type.carries_payload() {
            // Disconnect / NotExist frames carry nothing to dispatch;
            // the connection ends here per §4.6.
            return Ok(());
        }

        let cms = build_cms(&frame, peer);
        let (respond_to, response_rx) = response_channel();
        dispatch
            .dispatch(Message::Tcp {
                session_id: frame.session_id.clone(),
                cms,
                respond_to,
            })
            .await;

        let payload = response_rx.await.unwrap_or_else(|_| {
            ResponsePayload::Error {
                status: 500,
                body: serde_json::json!({"error": "internal_server_error", "message": "dispatcher dropped response"}),
            }
        });

        let response = Frame::new(frame.frame_type, frame.session_id.clone(), Some(encode_payload(payload)));
        response.write_to(&mut stream).await?;

        if !frame.frame_type.permits_continuation() {
            break;
        }
    }
    Ok(())
}

fn build_cms(frame: &Frame, peer: SocketAddr) -> CmsObject {
    let mut cms = CmsObject::for_request(
        relaymesh_core::RequestInfo {
            method: "TCP".to_string(),
            url: frame.session_id.clone(),
            raw_url: frame.session_id.clone(),
            path: frame.session_id.clone(),
            client_ip: Some(peer.ip().to_string()),
            request_id: frame.session_id.clone(),
            host: None,
            port: Some(peer.port()),
            query: Default::default(),
        },
        chrono::Utc::now(),
    );
    let body = frame
        .payload
        .as_ref()
        .map(|bytes| serde_json::from_slice(bytes).unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(bytes).into_owned())))
        .unwrap_or(serde_json::Value::Null);
    cms.set(relaymesh_core::cms::keys::BODY, body);
    cms
}

fn encode_payload(payload: ResponsePayload) -> bytes::Bytes {
    match payload {
        ResponsePayload::Cms(cms) => bytes::Bytes::from(serde_json::to_vec(&cms.into_value()).unwrap_or_default()),
        ResponsePayload::Json(value) => bytes::Bytes::from(serde_json::to_vec(&value).unwrap_or_default()),
        ResponsePayload::Raw(bytes) => bytes,
        ResponsePayload::Error { status, body } => {
            let value = serde_json::json!({"status": status, "body": body});
            bytes::Bytes::from(serde_json::to_vec(&value).unwrap_or_default())
        }
        ResponsePayload::Stream { body, .. } => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::io::AsyncReadExt;

    struct EchoDispatch {
        reached: AtomicBool,
    }

    #[async_trait::async_trait]
    impl Dispatch for EchoDispatch {
        async fn dispatch(&self, message: Message) {
            self.reached.store(true, Ordering::SeqCst);
            if let Message::Tcp { respond_to, .. } = message {
                let mut cms = CmsObject::new();
                cms.set("pong", serde_json::json!(1));
                let _ = respond_to.send(ResponsePayload::Cms(cms));
            }
        }
    }

    #[tokio::test]
    async fn ad_hoc_round_trip_echoes_session_id() {
        let dispatch: Arc<dyn Dispatch> = Arc::new(EchoDispatch { reached: AtomicBool::new(false) });
        let listener = TokioTcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, peer) = listener.accept().await.unwrap();
            handle_connection(stream, peer, dispatch, DEFAULT_MAX_FRAME_LEN).await.unwrap();
        });

        let mut client = TcpStream::connect(addr).await.unwrap();
        let request = Frame::new(FrameType::AdHoc, "S1", Some(Bytes::from_static(b"{\"ping\":1}")));
        request.write_to(&mut client).await.unwrap();

        let response = Frame::read_from(&mut client, DEFAULT_MAX_FRAME_LEN).await.unwrap();
        assert_eq!(response.frame_type, FrameType::AdHoc);
        assert_eq!(response.session_id, "S1");
        let body: serde_json::Value = serde_json::from_slice(&response.payload.unwrap()).unwrap();
        assert_eq!(body["pong"], 1);

        // Connection closes after one AD_HOC exchange.
        let mut buf = [0u8; 1];
        assert_eq!(client.read(&mut buf).await.unwrap(), 0);
        server.await.unwrap();
    }
}
