//! Handler registration primitives (§3.7, §4.2): the `Handler` trait
//! invoked once a predicate chain matches, and the resolved-argument map
//! handed to it by the dispatcher after running the handler's
//! [`relaymesh_di::InjectionPlan`].
//!
//! Mirrors `relaymesh_core::predicate::CallbackPredicate`: Rust has no
//! reflection over a handler's parameter list, so a handler is a plain
//! `Fn(&mut Context, ResolvedArgs) -> Future<...>` rather than something
//! introspected at registration time.

use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use relaymesh_core::{CmsObject, Context, DispatchError, DispatchResult};
use relaymesh_di::ResolvedArgs;
use serde_json::Value;

/// What a handler hands back to the dispatcher to be written through the
/// Context's response sink (§4.4 step 5). Ignored by the dispatcher when
/// the Context has switched to streaming mode; handlers that stream
/// should return `HandlerOutput::Json(Value::Null)` by convention once
/// they've finished writing.
pub enum HandlerOutput {
    Json(Value),
    Cms(CmsObject),
    Raw(Bytes),
}

impl HandlerOutput {
    #[must_use]
    pub fn json(value: impl serde::Serialize) -> Self {
        HandlerOutput::Json(serde_json::to_value(value).unwrap_or(Value::Null))
    }
}

pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = DispatchResult<HandlerOutput>> + Send + 'a>>;

/// A registered request handler, invoked once its predicate chain
/// matches and its injection plan has resolved a parameter map from the
/// scoped DI container.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self, ctx: &mut Context, args: ResolvedArgs) -> DispatchResult<HandlerOutput>;
}

/// Adapter for an arbitrary async handler function, the handler-side
/// counterpart of `CallbackPredicate`.
pub struct FnHandler<F> {
    callback: F,
}

impl<F> FnHandler<F>
where
    F: for<'a> Fn(&'a mut Context, ResolvedArgs) -> HandlerFuture<'a> + Send + Sync,
{
    #[must_use]
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

#[async_trait]
impl<F> Handler for FnHandler<F>
where
    F: for<'a> Fn(&'a mut Context, ResolvedArgs) -> HandlerFuture<'a> + Send + Sync,
{
    async fn call(&self, ctx: &mut Context, args: ResolvedArgs) -> DispatchResult<HandlerOutput> {
        (self.callback)(ctx, args).await
    }
}

/// Wrap an async closure `Fn(&mut Context, ResolvedArgs) -> impl Future<...>`
/// as a `Handler`.
#[must_use]
pub fn handler_fn<F>(f: F) -> FnHandler<impl for<'a> Fn(&'a mut Context, ResolvedArgs) -> HandlerFuture<'a> + Send + Sync>
where
    F: for<'a> Fn(&'a mut Context, ResolvedArgs) -> HandlerFuture<'a> + Send + Sync,
{
    FnHandler::new(f)
}

/// Wrap a synchronous handler function so it runs on the blocking worker
/// pool (§5, §9 "Async/sync handler polymorphism") rather than in-loop.
/// A sync handler only sees a snapshot of the cms-object and URL
/// segments, not the live Context, since it must not touch
/// non-`Send`/non-`'static` borrows across the blocking thread; it
/// therefore cannot start a streaming response.
#[must_use]
pub fn handler_blocking<F>(
    f: F,
) -> FnHandler<impl for<'a> Fn(&'a mut Context, ResolvedArgs) -> HandlerFuture<'a> + Send + Sync>
where
    F: Fn(CmsObject, std::collections::HashMap<String, String>, ResolvedArgs) -> DispatchResult<HandlerOutput>
        + Send
        + Sync
        + Clone
        + 'static,
{
    FnHandler::new(move |ctx: &mut Context, args: ResolvedArgs| {
        let f = f.clone();
        let cms = ctx.cms().clone();
        let segments = ctx.segments().clone();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || f(cms, segments, args))
                .await
                .map_err(|e| DispatchError::internal(format!("blocking handler panicked: {e}")))?
        }) as HandlerFuture<'static>
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaymesh_core::ContextKind;
    use relaymesh_di::ContainerBuilder;

    fn test_ctx() -> Context {
        let scope = ContainerBuilder::new().build().create_scope();
        Context::new(ContextKind::HttpRest, CmsObject::new(), "/x".to_string(), scope)
    }

    #[tokio::test]
    async fn fn_handler_runs_closure() {
        let handler = handler_fn(|_ctx: &mut Context, _args: ResolvedArgs| {
            Box::pin(async move { Ok(HandlerOutput::Json(Value::String("ok".into()))) }) as HandlerFuture<'_>
        });
        let mut ctx = test_ctx();
        let out = handler.call(&mut ctx, ResolvedArgs::new()).await.unwrap();
        assert!(matches!(out, HandlerOutput::Json(Value::String(s)) if s == "ok"));
    }

    #[tokio::test]
    async fn blocking_handler_sees_cms_snapshot() {
        let mut cms = CmsObject::new();
        cms.set("marker", serde_json::json!(true));
        let scope = ContainerBuilder::new().build().create_scope();
        let mut ctx = Context::new(ContextKind::HttpRest, cms, "/x".to_string(), scope);

        let handler = handler_blocking(|cms, _segments, _args| {
            Ok(HandlerOutput::Json(cms.get("marker").cloned().unwrap_or(Value::Null)))
        });
        let out = handler.call(&mut ctx, ResolvedArgs::new()).await.unwrap();
        assert!(matches!(out, HandlerOutput::Json(Value::Bool(true))));
    }
}
