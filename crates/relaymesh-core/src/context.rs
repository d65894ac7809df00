//! The per-request Context: the message being served, its URL segments,
//! the active scoped DI container, and a variant tag selecting which
//! handler registry it is dispatched against.

use std::collections::HashMap;

use bytes::Bytes;
use relaymesh_di::Scope;
use serde_json::Value;

use crate::cms::CmsObject;
use crate::error::DispatchError;

/// Which transport (and, for HTTP, which sub-flavor) produced this
/// Context. Handler registrations are keyed by this tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextKind {
    HttpRest,
    HttpWeb,
    WebSocket,
    TcpSocket,
    SourceClient,
    SourceServer,
    Amqp,
}

impl ContextKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ContextKind::HttpRest => "http-rest",
            ContextKind::HttpWeb => "http-web",
            ContextKind::WebSocket => "websocket",
            ContextKind::TcpSocket => "tcp-socket",
            ContextKind::SourceClient => "source-client",
            ContextKind::SourceServer => "source-server",
            ContextKind::Amqp => "amqp",
        }
    }

    /// Parse a context-kind name as it appears in the `router` host
    /// option (§6.6, §C.2), e.g. `"http-rest"` or `"websocket"`.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "http-rest" => ContextKind::HttpRest,
            "http-web" => ContextKind::HttpWeb,
            "websocket" => ContextKind::WebSocket,
            "tcp-socket" => ContextKind::TcpSocket,
            "source-client" => ContextKind::SourceClient,
            "source-server" => ContextKind::SourceServer,
            "amqp" => ContextKind::Amqp,
            _ => return None,
        })
    }
}

/// The in-progress streaming response state for one HTTP Context. Set at
/// most once per request via [`Context::start_stream_response`].
pub struct StreamState {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    chunks: Vec<Bytes>,
}

impl StreamState {
    fn new(status: u16, headers: Vec<(String, String)>) -> Self {
        Self {
            status,
            headers,
            chunks: Vec::new(),
        }
    }

    /// Queue a chunk; `drain` hands queued chunks to the listener.
    pub fn write(&mut self, bytes: Bytes) {
        self.chunks.push(bytes);
    }

    /// Take every chunk queued since the last drain.
    pub fn drain(&mut self) -> Vec<Bytes> {
        std::mem::take(&mut self.chunks)
    }
}

/// A per-request Context. Created fresh for every message, discarded at
/// the end of the request; never shared across tasks.
pub struct Context {
    kind: ContextKind,
    cms: CmsObject,
    url: String,
    segments: HashMap<String, String>,
    scope: Scope,
    stream: Option<StreamState>,
}

impl Context {
    #[must_use]
    pub fn new(kind: ContextKind, cms: CmsObject, url: String, scope: Scope) -> Self {
        Self {
            kind,
            cms,
            url,
            segments: HashMap::new(),
            scope,
            stream: None,
        }
    }

    #[must_use]
    pub fn kind(&self) -> ContextKind {
        self.kind
    }

    #[must_use]
    pub fn cms(&self) -> &CmsObject {
        &self.cms
    }

    #[must_use]
    pub fn cms_mut(&mut self) -> &mut CmsObject {
        &mut self.cms
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Named captures from the route pattern that matched this request,
    /// e.g. `{"id": "42"}` for pattern `/users/:id`.
    #[must_use]
    pub fn segments(&self) -> &HashMap<String, String> {
        &self.segments
    }

    /// Called by the `url` predicate on a match; not meant to be called
    /// from handler code.
    pub fn set_segments(&mut self, segments: HashMap<String, String>) {
        self.segments = segments;
    }

    /// Resolve a dotted-path expression against the Context, used by the
    /// `equal`/`in_list` predicates. `url` and `method` are synthetic
    /// paths resolved against the Context itself before falling back to
    /// the cms-object.
    #[must_use]
    pub fn resolve_path(&self, path: &str) -> Option<Value> {
        match path {
            "url" => return Some(Value::String(self.url.clone())),
            "method" => {
                return self
                    .cms
                    .request()
                    .map(|r| Value::String(r.method));
            }
            _ => {}
        }
        if let Some(rest) = path.strip_prefix("segments.") {
            return self.segments.get(rest).cloned().map(Value::String);
        }
        self.cms.get_path(path).cloned()
    }

    /// Transition into streaming mode. Legal at most once per request;
    /// a second call is a programming error surfaced as an
    /// `InternalServerError`.
    pub fn start_stream_response(
        &mut self,
        status: u16,
        headers: Vec<(String, String)>,
    ) -> Result<(), DispatchError> {
        if self.stream.is_some() {
            return Err(DispatchError::internal("stream response already started"));
        }
        self.stream = Some(StreamState::new(status, headers));
        Ok(())
    }

    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.stream.is_some()
    }

    #[must_use]
    pub fn stream_mut(&mut self) -> Option<&mut StreamState> {
        self.stream.as_mut()
    }

    /// Consume the Context's streaming state, if any, for the listener
    /// to finalize after the handler returns.
    pub fn take_stream(&mut self) -> Option<StreamState> {
        self.stream.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaymesh_di::ContainerBuilder;

    fn test_scope() -> Scope {
        ContainerBuilder::new().build().create_scope()
    }

    #[test]
    fn resolve_path_prefers_synthetic_fields() {
        let cms = CmsObject::new();
        let mut ctx = Context::new(ContextKind::HttpRest, cms, "/users/42".into(), test_scope());
        ctx.set_segments(HashMap::from([("id".to_string(), "42".to_string())]));
        assert_eq!(ctx.resolve_path("url").unwrap(), Value::String("/users/42".into()));
        assert_eq!(ctx.resolve_path("segments.id").unwrap(), Value::String("42".into()));
        assert!(ctx.resolve_path("segments.missing").is_none());
    }

    #[test]
    fn context_kind_parse_round_trips_as_str() {
        for kind in [
            ContextKind::HttpRest,
            ContextKind::HttpWeb,
            ContextKind::WebSocket,
            ContextKind::TcpSocket,
            ContextKind::SourceClient,
            ContextKind::SourceServer,
            ContextKind::Amqp,
        ] {
            assert_eq!(ContextKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ContextKind::parse("bogus"), None);
    }

    #[test]
    fn stream_response_starts_once() {
        let cms = CmsObject::new();
        let mut ctx = Context::new(ContextKind::HttpRest, cms, "/stream".into(), test_scope());
        assert!(ctx.start_stream_response(200, vec![]).is_ok());
        assert!(ctx.is_streaming());
        assert!(ctx.start_stream_response(200, vec![]).is_err());
    }
}
