//! The HTTP listener (§4.6, §6.2): accepts any method, assembles the
//! cms-object, dispatches a [`relaymesh_core::Message::Http`], and writes
//! the handler's result back as status/headers/body. The WebSocket
//! upgrade path (§6.3) is handled on the same endpoint, delegated to
//! [`relaymesh_ws::SessionRegistry`] once a request negotiates an
//! upgrade.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{ConnectInfo, FromRequest, FromRequestParts, Multipart, Request, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use relaymesh_core::cms::keys;
use relaymesh_core::{response_channel, Dispatch, Message, ResponsePayload};
use relaymesh_ws::SessionRegistry;
use tokio::net::TcpListener as TokioTcpListener;
use tokio::sync::broadcast;
use tracing::info;

use crate::cms_builder;
use crate::error::{HttpError, HttpResult};
use crate::tls::{TlsAcceptor, TlsSource};
use crate::upgrade;

/// A request body larger than this is rejected before dispatch; keeps a
/// misbehaving client from forcing an unbounded in-memory buffer.
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// State shared by every request handler: the dispatcher every message
/// ultimately reaches, the WebSocket session registry for upgrades, and
/// the handful of per-listener settings those two paths need.
#[derive(Clone)]
pub struct ListenerState {
    pub dispatch: Arc<dyn Dispatch>,
    pub ws_registry: Arc<SessionRegistry>,
    pub tls: bool,
    pub heartbeat_interval: Duration,
}

/// HTTP listener configuration.
pub struct HttpListenerConfig {
    pub addr: SocketAddr,
    pub tls: Option<TlsSource>,
    /// WebSocket ping interval for sessions accepted on this listener
    /// (§6.3; default 30s).
    pub heartbeat_interval: Duration,
}

impl HttpListenerConfig {
    #[must_use]
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            tls: None,
            heartbeat_interval: Duration::from_secs(30),
        }
    }
}

/// Bind and serve the HTTP (+ WebSocket upgrade) endpoint until
/// `shutdown` fires.
pub async fn serve(
    config: HttpListenerConfig,
    dispatch: Arc<dyn Dispatch>,
    ws_registry: Arc<SessionRegistry>,
    mut shutdown: broadcast::Receiver<()>,
) -> HttpResult<()> {
    let state = ListenerState {
        dispatch,
        ws_registry,
        tls: config.tls.is_some(),
        heartbeat_interval: config.heartbeat_interval,
    };
    let app = Router::new()
        .fallback(any(handler))
        .with_state(state)
        .into_make_service_with_connect_info::<SocketAddr>();

    match config.tls {
        None => {
            let listener = TokioTcpListener::bind(config.addr)
                .await
                .map_err(|source| HttpError::Bind {
                    addr: config.addr.to_string(),
                    source,
                })?;
            info!(addr = %config.addr, "http listener bound");
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown.recv().await;
                })
                .await
                .map_err(|e| HttpError::Bind {
                    addr: config.addr.to_string(),
                    source: std::io::Error::other(e.to_string()),
                })?;
        }
        Some(source) => {
            let acceptor = TlsAcceptor::load(&source).await?;
            let handle = axum_server::Handle::new();
            let shutdown_handle = handle.clone();
            tokio::spawn(async move {
                let _ = shutdown.recv().await;
                shutdown_handle.graceful_shutdown(Some(Duration::from_secs(5)));
            });
            info!(addr = %config.addr, "https listener bound");
            let result = match acceptor {
                TlsAcceptor::Rustls(cfg) => {
                    axum_server::bind_rustls(config.addr, cfg)
                        .handle(handle)
                        .serve(app)
                        .await
                }
                TlsAcceptor::NativeTls(acceptor) => {
                    axum_server::bind(config.addr)
                        .acceptor(acceptor)
                        .handle(handle)
                        .serve(app)
                        .await
                }
            };
            result.map_err(|e| HttpError::Bind {
                addr: config.addr.to_string(),
                source: std::io::Error::other(e.to_string()),
            })?;
        }
    }
    Ok(())
}

async fn handler(
    State(state): State<ListenerState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    req: Request<Body>,
) -> Response {
    let (mut parts, body) = req.into_parts();

    if is_upgrade_request(&parts.headers) {
        return match WebSocketUpgrade::from_request_parts(&mut parts, &state).await {
            Ok(ws) => upgrade::handle(ws, parts, state, peer).await,
            Err(rejection) => rejection.into_response(),
        };
    }

    handle_request(parts, body, &state, peer).await
}

fn is_upgrade_request(headers: &HeaderMap) -> bool {
    let connection_upgrades = headers
        .get(header::CONNECTION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.to_ascii_lowercase().contains("upgrade"));
    let wants_websocket = headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"));
    connection_upgrades && wants_websocket
}

async fn handle_request(parts: Parts, body: Body, state: &ListenerState, peer: SocketAddr) -> Response {
    let mut cms = cms_builder::base_cms(&parts.method, &parts.uri, &parts.headers, peer, state.tls);

    let content_type = parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    if content_type.starts_with("multipart/form-data") {
        let request = Request::from_parts(parts, body);
        match Multipart::from_request(request, &()).await {
            Ok(multipart) => match cms_builder::parse_multipart(multipart).await {
                Ok((form, _files)) => cms.set(keys::FORM, form),
                Err(err) => return http_error_response(&err),
            },
            Err(rejection) => return rejection.into_response(),
        }
    } else {
        match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
            Ok(bytes) => match cms_builder::parse_simple_body(&content_type, &bytes) {
                Ok((body_val, form_val)) => {
                    cms.set(keys::BODY, body_val);
                    cms.set(keys::FORM, form_val);
                }
                Err(err) => return http_error_response(&err),
            },
            Err(_) => {
                return http_error_response(&HttpError::MalformedBody("body exceeds maximum size".into()));
            }
        }
    }

    let (respond_to, response_rx) = response_channel();
    state.dispatch.dispatch(Message::Http { cms, respond_to }).await;

    let payload = response_rx.await.unwrap_or_else(|_| ResponsePayload::Error {
        status: 500,
        body: serde_json::json!({"error": "internal_server_error", "message": "dispatcher dropped response"}),
    });
    payload_to_response(payload)
}

fn http_error_response(err: &HttpError) -> Response {
    let body = serde_json::json!({"error": "bad_request", "message": err.to_string()});
    (StatusCode::BAD_REQUEST, axum::Json(body)).into_response()
}

fn payload_to_response(payload: ResponsePayload) -> Response {
    match payload {
        ResponsePayload::Cms(cms) => {
            let body = serde_json::to_vec(&cms.into_value()).unwrap_or_default();
            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body))
                .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
        ResponsePayload::Json(value) => {
            let body = serde_json::to_vec(&value).unwrap_or_default();
            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body))
                .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
        ResponsePayload::Raw(bytes) => Response::builder()
            .status(StatusCode::OK)
            .body(Body::from(bytes))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()),
        ResponsePayload::Error { status, body } => {
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            let bytes = serde_json::to_vec(&body).unwrap_or_default();
            Response::builder()
                .status(status)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(bytes))
                .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
        ResponsePayload::Stream { status, headers, body } => {
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::OK);
            let mut builder = Response::builder().status(status).header(header::TRANSFER_ENCODING, "chunked");
            for (name, value) in headers {
                builder = builder.header(name, value);
            }
            builder
                .body(Body::from(body))
                .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upgrade_detection_requires_both_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(header::UPGRADE, "websocket".parse().unwrap());
        assert!(!is_upgrade_request(&headers));
        headers.insert(header::CONNECTION, "Upgrade".parse().unwrap());
        assert!(is_upgrade_request(&headers));
    }
}
