//! relaymesh: a multi-transport request-dispatch framework.
//!
//! Accepts requests over HTTP, WebSocket, TCP (a length-prefixed binary
//! framing), and AMQP, normalizes each into a [`Message`](relaymesh_core::Message),
//! selects a registered handler by evaluating composable [`Predicate`](relaymesh_core::Predicate)
//! chains, resolves its parameters through a dependency-injection
//! container with singleton/scoped/transient/hosted lifetimes, and
//! writes the result back through the originating transport.
//!
//! This crate is a facade: it re-exports the public surface of
//! `relaymesh-core`, `relaymesh-di`, `relaymesh-ws`, `relaymesh-http`,
//! `relaymesh-tcp`, `relaymesh-amqp`, and `relaymesh-server` so a
//! consumer depends on one crate. Use [`prelude`] for the common
//! registration-time imports.
//!
//! ```no_run
//! use relaymesh::prelude::*;
//! use relaymesh::HandlerFuture;
//!
//! # async fn build() -> relaymesh::HostResult<()> {
//! let options = HostOptions::load(None)?;
//! let mut builder = HostBuilder::new(options);
//! builder.register(
//!     ContextKind::HttpRest,
//!     Some("/health"),
//!     get("/health"),
//!     handler_fn(|_ctx: &mut Context, _args: ResolvedArgs| {
//!         Box::pin(async move { Ok(HandlerOutput::json(serde_json::json!({"ok": true}))) }) as HandlerFuture<'_>
//!     }),
//!     InjectionPlan::new(),
//! );
//! let host = builder.build()?;
//! host.run().await?;
//! # Ok(())
//! # }
//! ```

pub use relaymesh_amqp::{AmqpError, AmqpListenerConfig, AmqpResult, AmqpTarget, QueueFlags};
pub use relaymesh_core::{
    callback_sync, delete, equal, get, head, in_list, options, patch, post, put, response_channel, url,
    CallbackPredicate, CmsObject, CmsTimestamps, Context, ContextKind, Dispatch, DispatchError, DispatchResult,
    EqualPredicate, InListPredicate, Message, Predicate, PredicateChain, RequestInfo, ResponsePayload,
    ResponseReceiver, ResponseSink, StreamState, UrlPredicate, WsFrameKind,
};
pub use relaymesh_di::{
    Container, ContainerBuilder, DiError, DiResult, HostedService, InjectionPlan, ParamStrategy, ResolveArgs,
    ResolvedArgs, ResolvedValue, Scope, ServiceKey, ServiceLifetime, ValueKind,
};
pub use relaymesh_http::{HttpError, HttpListenerConfig, HttpResult, TlsAcceptor, TlsSource};
pub use relaymesh_server::{
    handler_blocking, handler_fn, ConnectionStrings, ContextDetector, Dispatcher, DispatcherBuilder, FnHandler,
    GlobPattern, Handler, HandlerFuture, HandlerOutput, Host, HostBuilder, HostError, HostOptions, HostResult,
    RouterConfig,
};
pub use relaymesh_tcp::{Frame, FrameType, TcpError, TcpListenerConfig, TcpResult, DEFAULT_MAX_FRAME_LEN};
pub use relaymesh_ws::{Fanout, PeerMeta, Session, SessionRegistry, WsError, WsResult};

/// The common imports needed to register handlers and build a [`Host`].
pub mod prelude {
    pub use relaymesh_core::{
        delete, get, head, options, patch, post, put, url, CmsObject, Context, ContextKind, DispatchError,
        DispatchResult, PredicateChain,
    };
    pub use relaymesh_di::{Container, ContainerBuilder, InjectionPlan, ParamStrategy, ResolvedArgs};
    pub use relaymesh_server::{handler_blocking, handler_fn, Handler, HandlerOutput, Host, HostBuilder, HostOptions};
}
