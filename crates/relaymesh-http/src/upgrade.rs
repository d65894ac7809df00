//! The WebSocket upgrade path: same HTTP endpoint, delegated to
//! `relaymesh-ws`'s [`SessionRegistry`] once the request negotiates an
//! upgrade (§4.6).

use std::collections::HashMap;
use std::net::SocketAddr;

use axum::extract::ws::WebSocketUpgrade;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use relaymesh_ws::PeerMeta;

use crate::cms_builder;
use crate::listener::ListenerState;

pub(crate) async fn handle(
    ws: WebSocketUpgrade,
    parts: Parts,
    state: ListenerState,
    peer: SocketAddr,
) -> Response {
    let cms = cms_builder::base_cms(&parts.method, &parts.uri, &parts.headers, peer, state.tls);
    let peer_meta = PeerMeta {
        url: parts.uri.to_string(),
        headers: flatten_headers(&parts.headers),
    };

    let dispatch = state.dispatch.clone();
    let registry = state.ws_registry.clone();
    let heartbeat_interval = state.heartbeat_interval;

    ws.on_upgrade(move |socket| async move {
        registry.accept(socket, peer_meta, cms, dispatch, heartbeat_interval);
    })
    .into_response()
}

fn flatten_headers(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
        .collect()
}
