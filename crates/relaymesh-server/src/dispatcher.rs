//! The Routing Dispatcher (§4.4, component G): converts a `Message` into
//! a `Context`, selects a handler by evaluating predicate chains in
//! registration order, resolves its parameters through the DI container,
//! invokes it, and writes the result back through the Message's
//! response sink.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use relaymesh_core::cms::keys;
use relaymesh_core::{
    Context, ContextKind, Dispatch, DispatchError, DispatchResult, Message, PredicateChain, ResponsePayload,
    WsFrameKind,
};
use relaymesh_di::{Container, DiError, InjectionPlan, ResolveArgs};
use tracing::{error, info};

use crate::registration::{Handler, HandlerOutput};
use crate::router::{ContextDetector, RouterConfig};

/// One registered handler: the Context variant it serves, an optional
/// URL pattern for auto-detection/diagnostics, its predicate chain, its
/// handler, and its pre-compiled injection plan (§3.7).
struct Registration {
    kind: ContextKind,
    predicates: PredicateChain,
    handler: Arc<dyn Handler>,
    plan: InjectionPlan,
}

/// Builds a [`Dispatcher`]. Registration happens exclusively through
/// this type; `build()` finalizes the context-type detector from
/// whatever `router()` config was supplied (or auto-generates one from
/// the HTTP-capable registrations observed along the way).
pub struct DispatcherBuilder {
    registrations: Vec<Registration>,
    pending_auto_routes: Vec<(ContextKind, String)>,
    router_config: Option<RouterConfig>,
    log_request: bool,
    log_error: bool,
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatcherBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            registrations: Vec::new(),
            pending_auto_routes: Vec::new(),
            router_config: None,
            log_request: false,
            log_error: false,
        }
    }

    /// Explicit router configuration (§6.6 `router` host option). When
    /// never called, the detector is auto-generated (§4.4's default
    /// case) from `url_pattern`s passed to `register`.
    pub fn router(&mut self, config: RouterConfig) -> &mut Self {
        self.router_config = Some(config);
        self
    }

    /// Gate per-request info logging (§6.6 `log_request`).
    pub fn log_request(&mut self, enabled: bool) -> &mut Self {
        self.log_request = enabled;
        self
    }

    /// Gate per-error logging before the error response is written
    /// (§6.6 `log_error`).
    pub fn log_error(&mut self, enabled: bool) -> &mut Self {
        self.log_error = enabled;
        self
    }

    /// Register one handler for `kind`. `url_pattern` feeds the
    /// auto-detector when no explicit `router()` config is set and
    /// `kind` is an HTTP-capable variant; pass `None` for transports
    /// whose Context variant is already unambiguous (WebSocket, TCP,
    /// AMQP).
    pub fn register(
        &mut self,
        kind: ContextKind,
        url_pattern: Option<&str>,
        predicates: PredicateChain,
        handler: impl Handler + 'static,
        plan: InjectionPlan,
    ) -> &mut Self {
        self.registrations.push(Registration {
            kind,
            predicates,
            handler: Arc::new(handler),
            plan,
        });
        if let Some(pattern) = url_pattern {
            self.pending_auto_routes.push((kind, pattern.to_string()));
        }
        self
    }

    #[must_use]
    pub fn build(self, container: Container) -> Dispatcher {
        let mut by_kind: HashMap<ContextKind, Vec<Registration>> = HashMap::new();
        for registration in self.registrations {
            by_kind.entry(registration.kind).or_default().push(registration);
        }

        let mut detector = ContextDetector::new(self.router_config.unwrap_or(RouterConfig::Auto));
        for (kind, pattern) in self.pending_auto_routes {
            detector.observe(kind, &pattern);
        }

        Dispatcher {
            container,
            by_kind,
            detector,
            log_request: self.log_request,
            log_error: self.log_error,
        }
    }
}

/// The routing dispatcher. Implements [`Dispatch`], the single seam
/// every listener calls into.
pub struct Dispatcher {
    container: Container,
    by_kind: HashMap<ContextKind, Vec<Registration>>,
    detector: ContextDetector,
    log_request: bool,
    log_error: bool,
}

#[async_trait]
impl Dispatch for Dispatcher {
    async fn dispatch(&self, message: Message) {
        match message {
            Message::Http { cms, respond_to } => {
                let url = request_url(&cms);
                let kind = match self.detector.detect(&url) {
                    Some(kind) => kind,
                    None => {
                        let _ = respond_to.send(not_found_payload());
                        return;
                    }
                };
                let payload = self.run(kind, cms).await;
                let _ = respond_to.send(payload);
            }
            Message::Tcp { cms, respond_to, .. } => {
                let payload = self.run(ContextKind::TcpSocket, cms).await;
                let _ = respond_to.send(payload);
            }
            Message::Amqp { cms, .. } => {
                // AMQP has no response sink (§3.4); the result is
                // discarded after logging, same as any handler error.
                let _ = self.run(ContextKind::Amqp, cms).await;
            }
            Message::WebSocket { session_id, kind, cms, payload } => {
                self.dispatch_websocket(session_id, kind, cms, payload).await;
            }
        }
    }
}

impl Dispatcher {
    async fn dispatch_websocket(
        &self,
        session_id: String,
        frame_kind: WsFrameKind,
        mut cms: relaymesh_core::CmsObject,
        payload: Option<bytes::Bytes>,
    ) {
        if let Some(bytes) = payload {
            let value = serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(&bytes).into_owned()));
            cms.set(keys::BODY, value);
        }
        cms.set("ws_event", serde_json::json!(frame_kind_name(&frame_kind)));
        cms.set("session_id", serde_json::json!(session_id));
        let _ = self.run(ContextKind::WebSocket, cms).await;
    }

    /// Run one Message through context construction, predicate
    /// evaluation, handler invocation, and response-payload assembly
    /// (§4.4 steps 2-5).
    async fn run(&self, kind: ContextKind, cms: relaymesh_core::CmsObject) -> ResponsePayload {
        if self.log_request {
            info!(kind = kind.as_str(), url = %request_url(&cms), "dispatching request");
        }

        let scope = self.container.create_scope();
        let url = request_url(&cms);
        let mut ctx = Context::new(kind, cms, url, scope);

        let outcome = self.select_and_run(kind, &mut ctx).await;

        let now = chrono::Utc::now();
        ctx.cms_mut().mark_completed(now);

        let payload = match outcome {
            Ok(_) if ctx.is_streaming() => {
                let stream = ctx.take_stream().expect("is_streaming implies a StreamState");
                let body: bytes::Bytes = stream.drain().concat().into();
                ResponsePayload::Stream {
                    status: stream.status,
                    headers: stream.headers,
                    body,
                }
            }
            Ok(output) => output_to_payload(output),
            Err(err) => {
                if self.log_error {
                    error!(error = %err, "handler error");
                }
                ResponsePayload::Error {
                    status: err.status_code(),
                    body: err.to_body(),
                }
            }
        };

        ctx.scope().clear();
        payload
    }

    async fn select_and_run(&self, kind: ContextKind, ctx: &mut Context) -> DispatchResult<HandlerOutput> {
        let Some(registrations) = self.by_kind.get(&kind) else {
            return Err(DispatchError::not_found("no handlers registered for this context"));
        };

        for registration in registrations {
            if registration.predicates.matches(ctx).await? {
                let args = registration
                    .plan
                    .resolve(ctx.scope(), &ResolveArgs::new())
                    .map_err(di_error_to_dispatch)?;
                return registration.handler.call(ctx, args).await;
            }
        }
        Err(DispatchError::not_found("no handler matched this request"))
    }
}

fn request_url(cms: &relaymesh_core::CmsObject) -> String {
    cms.request().map(|r| r.url).unwrap_or_default()
}

fn not_found_payload() -> ResponsePayload {
    let err = DispatchError::not_found("no context-type route matched this request");
    ResponsePayload::Error {
        status: err.status_code(),
        body: err.to_body(),
    }
}

fn output_to_payload(output: HandlerOutput) -> ResponsePayload {
    match output {
        HandlerOutput::Json(value) => ResponsePayload::Json(value),
        HandlerOutput::Cms(cms) => ResponsePayload::Cms(cms),
        HandlerOutput::Raw(bytes) => ResponsePayload::Raw(bytes),
    }
}

/// DI resolution failures surface as `InternalServerError` with the
/// failing parameter name attached (§7 "Errors inside DI resolution").
fn di_error_to_dispatch(err: DiError) -> DispatchError {
    DispatchError::internal(err.to_string())
}

fn frame_kind_name(kind: &WsFrameKind) -> &'static str {
    match kind {
        WsFrameKind::Connect => "connect",
        WsFrameKind::Text => "text",
        WsFrameKind::Binary => "binary",
        WsFrameKind::Close => "close",
        WsFrameKind::Disconnect => "disconnect",
        WsFrameKind::Error => "error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registration::{handler_fn, HandlerFuture};
    use relaymesh_core::predicate::get;
    use relaymesh_core::response_channel;
    use relaymesh_di::{ContainerBuilder, ResolvedArgs};
    use serde_json::Value;

    fn echo_handler() -> impl Handler + 'static {
        handler_fn(|ctx: &mut Context, _args: ResolvedArgs| {
            let id = ctx.segments().get("id").cloned().unwrap_or_default();
            Box::pin(async move { Ok(HandlerOutput::Json(serde_json::json!({"id": id}))) }) as HandlerFuture<'_>
        })
    }

    fn http_cms(method: &str, url: &str) -> relaymesh_core::CmsObject {
        relaymesh_core::CmsObject::for_request(
            relaymesh_core::RequestInfo {
                method: method.to_string(),
                url: url.to_string(),
                raw_url: url.to_string(),
                path: url.to_string(),
                request_id: "req-1".to_string(),
                ..Default::default()
            },
            chrono::Utc::now(),
        )
    }

    #[tokio::test]
    async fn rest_get_with_capture_returns_json_body() {
        let mut builder = DispatcherBuilder::new();
        builder.register(
            ContextKind::HttpRest,
            Some("/users/:id"),
            get("/users/:id"),
            echo_handler(),
            InjectionPlan::new(),
        );
        let dispatcher = builder.build(ContainerBuilder::new().build());

        let cms = http_cms("GET", "/users/42");
        let (respond_to, rx) = response_channel();
        dispatcher.dispatch(Message::Http { cms, respond_to }).await;
        match rx.await.unwrap() {
            ResponsePayload::Json(Value::Object(map)) => assert_eq!(map["id"], "42"),
            other => panic!("expected JSON payload, got a different variant: {}", matches!(other, ResponsePayload::Json(_))),
        }
    }

    #[tokio::test]
    async fn first_registered_handler_wins_on_tie() {
        let mut builder = DispatcherBuilder::new();
        builder.register(
            ContextKind::HttpRest,
            Some("/x"),
            get("/x"),
            handler_fn(|_ctx: &mut Context, _args: ResolvedArgs| {
                Box::pin(async move { Ok(HandlerOutput::Json(Value::String("first".into()))) }) as HandlerFuture<'_>
            }),
            InjectionPlan::new(),
        );
        builder.register(
            ContextKind::HttpRest,
            Some("/x"),
            get("/x"),
            handler_fn(|_ctx: &mut Context, _args: ResolvedArgs| {
                Box::pin(async move { Ok(HandlerOutput::Json(Value::String("second".into()))) }) as HandlerFuture<'_>
            }),
            InjectionPlan::new(),
        );
        let dispatcher = builder.build(ContainerBuilder::new().build());

        let cms = http_cms("GET", "/x");
        let (respond_to, rx) = response_channel();
        dispatcher.dispatch(Message::Http { cms, respond_to }).await;
        assert!(matches!(rx.await.unwrap(), ResponsePayload::Json(Value::String(s)) if s == "first"));
    }

    #[tokio::test]
    async fn unmatched_url_yields_not_found() {
        let mut builder = DispatcherBuilder::new();
        builder.register(
            ContextKind::HttpRest,
            Some("/users/:id"),
            get("/users/:id"),
            echo_handler(),
            InjectionPlan::new(),
        );
        let dispatcher = builder.build(ContainerBuilder::new().build());

        let cms = http_cms("GET", "/missing");
        let (respond_to, rx) = response_channel();
        dispatcher.dispatch(Message::Http { cms, respond_to }).await;
        assert!(matches!(rx.await.unwrap(), ResponsePayload::Error { status: 404, .. }));
    }
}
