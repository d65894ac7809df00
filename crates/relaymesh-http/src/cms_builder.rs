//! Assembles the cms-object (§3.3/§6.5) from a parsed HTTP request:
//! method/URL/query/headers/cookies/client-ip/request-id, plus the body
//! (JSON, form-urlencoded, or multipart).

use std::collections::HashMap;
use std::net::SocketAddr;

use axum::extract::Multipart;
use axum::http::{HeaderMap, Method, Uri};
use bytes::Bytes;
use relaymesh_core::{CmsObject, RequestInfo};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{HttpError, HttpResult};

/// Assemble `request`, `headers`, `cookie` and stamp `cms.received_at`
/// onto a fresh [`CmsObject`]; body-derived keys (`form`/`body`) are
/// added by the caller once the body has been parsed.
#[must_use]
pub fn base_cms(method: &Method, uri: &Uri, headers: &HeaderMap, peer: SocketAddr, tls: bool) -> CmsObject {
    let now = chrono::Utc::now();
    let mut cms = CmsObject::for_request(request_info(method, uri, headers, peer, tls), now);
    cms.set(relaymesh_core::cms::keys::HEADERS, headers_to_json(headers));
    cms.set(relaymesh_core::cms::keys::COOKIE, cookies_to_json(headers));
    cms
}

fn request_info(method: &Method, uri: &Uri, headers: &HeaderMap, peer: SocketAddr, tls: bool) -> RequestInfo {
    let (host, port) = host_port(headers, peer, tls);
    let path = uri.path().to_string();
    let query = query_map(uri.query().unwrap_or(""));
    let request_id = headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    RequestInfo {
        method: method.as_str().to_string(),
        url: uri.to_string(),
        raw_url: uri.to_string(),
        path,
        query,
        client_ip: Some(peer.ip().to_string()),
        request_id,
        host,
        port,
    }
}

fn host_port(headers: &HeaderMap, peer: SocketAddr, tls: bool) -> (Option<String>, Option<u16>) {
    if let Some(host_header) = headers.get(axum::http::header::HOST).and_then(|v| v.to_str().ok()) {
        if let Some((host, port)) = host_header.rsplit_once(':') {
            if let Ok(port) = port.parse::<u16>() {
                return (Some(host.to_string()), Some(port));
            }
        }
        return (Some(host_header.to_string()), Some(if tls { 443 } else { 80 }));
    }
    (Some(peer.ip().to_string()), Some(peer.port()))
}

fn query_map(query: &str) -> HashMap<String, Vec<String>> {
    let mut map: HashMap<String, Vec<String>> = HashMap::new();
    if let Ok(pairs) = serde_urlencoded::from_str::<Vec<(String, String)>>(query) {
        for (key, value) in pairs {
            map.entry(key).or_default().push(value);
        }
    }
    map
}

fn headers_to_json(headers: &HeaderMap) -> Value {
    let mut map: HashMap<String, Vec<String>> = HashMap::new();
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            map.entry(name.as_str().to_string()).or_default().push(value.to_string());
        }
    }
    serde_json::to_value(map).unwrap_or(Value::Null)
}

fn cookies_to_json(headers: &HeaderMap) -> Value {
    let mut map = Map::new();
    for raw in headers.get_all(axum::http::header::COOKIE) {
        let Ok(raw) = raw.to_str() else { continue };
        for part in raw.split(';') {
            if let Ok(parsed) = cookie::Cookie::parse(part.trim().to_string()) {
                map.insert(parsed.name().to_string(), Value::String(parsed.value().to_string()));
            }
        }
    }
    Value::Object(map)
}

/// Parse a non-multipart body according to its content type: JSON when
/// the Content-Type indicates JSON, key-value decoding for
/// form-urlencoded, and the raw bytes (base64-free, UTF-8 best-effort)
/// otherwise. Returns `(body, form)` to set under the `body`/`form` keys.
pub fn parse_simple_body(content_type: &str, bytes: &Bytes) -> HttpResult<(Value, Value)> {
    if bytes.is_empty() {
        return Ok((Value::Null, Value::Null));
    }
    if content_type.starts_with("application/json") || content_type.starts_with("text/json") {
        let body: Value = serde_json::from_slice(bytes)
            .map_err(|e| HttpError::MalformedBody(format!("invalid JSON body: {e}")))?;
        return Ok((body, Value::Null));
    }
    if content_type.starts_with("application/x-www-form-urlencoded") {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(bytes)
            .map_err(|e| HttpError::MalformedBody(format!("invalid form body: {e}")))?;
        let mut form: HashMap<String, Vec<String>> = HashMap::new();
        for (key, value) in pairs {
            form.entry(key).or_default().push(value);
        }
        let form_value = serde_json::to_value(&form).unwrap_or(Value::Null);
        return Ok((form_value.clone(), form_value));
    }
    match std::str::from_utf8(bytes) {
        Ok(text) => Ok((Value::String(text.to_string()), Value::Null)),
        Err(_) => Ok((Value::String(base64_lossy(bytes)), Value::Null)),
    }
}

fn base64_lossy(bytes: &Bytes) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// A single uploaded file from a `multipart/form-data` body.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// Decode a `multipart/form-data` body into the `form` cms key: text
/// fields land as strings (or arrays for repeated names), file fields
/// land as an object with `file_name`/`content_type`/`size` plus the raw
/// bytes, so handlers can read metadata from the cms-object itself and
/// fetch bytes from the companion map keyed by field name.
pub async fn parse_multipart(mut multipart: Multipart) -> HttpResult<(Value, HashMap<String, UploadedFile>)> {
    let mut fields: HashMap<String, Vec<String>> = HashMap::new();
    let mut files = HashMap::new();
    let mut form = Map::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| HttpError::Multipart(e.to_string()))?
    {
        let Some(name) = field.name().map(ToOwned::to_owned) else {
            continue;
        };
        let file_name = field.file_name().map(ToOwned::to_owned);
        let content_type = field.content_type().map(ToOwned::to_owned);
        let data = field.bytes().await.map_err(|e| HttpError::Multipart(e.to_string()))?;

        if file_name.is_some() {
            form.insert(
                name.clone(),
                serde_json::json!({
                    "file_name": file_name,
                    "content_type": content_type,
                    "size": data.len(),
                }),
            );
            files.insert(name, UploadedFile {
                file_name,
                content_type,
                data,
            });
        } else {
            let text = String::from_utf8_lossy(&data).into_owned();
            fields.entry(name).or_default().push(text);
        }
    }

    for (key, mut values) in fields {
        let value = if values.len() == 1 {
            Value::String(values.pop().unwrap())
        } else {
            Value::Array(values.into_iter().map(Value::String).collect())
        };
        form.insert(key, value);
    }

    Ok((Value::Object(form), files))
}
