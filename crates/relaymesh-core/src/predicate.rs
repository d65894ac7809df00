//! Predicates: boolean tests over a Context, AND-joined within a
//! handler's chain and OR-joined (first match wins) across handlers of
//! the same Context variant.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::context::Context;
use crate::error::DispatchResult;

/// A boolean test over a Context. Evaluation may read the Context
/// (including writing URL captures on a match) but must never mutate
/// state that outlives the request.
#[async_trait]
pub trait Predicate: Send + Sync {
    async fn evaluate(&self, ctx: &mut Context) -> DispatchResult<bool>;
}

/// An ordered AND-chain of predicates. A failing predicate short-circuits
/// the remaining chain.
#[derive(Default, Clone)]
pub struct PredicateChain {
    predicates: Vec<Arc<dyn Predicate>>,
}

impl PredicateChain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn and(mut self, predicate: impl Predicate + 'static) -> Self {
        self.predicates.push(Arc::new(predicate));
        self
    }

    pub async fn matches(&self, ctx: &mut Context) -> DispatchResult<bool> {
        for predicate in &self.predicates {
            if !predicate.evaluate(ctx).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// One segment of a compiled URL pattern.
#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Capture(String),
    GreedyCapture(String),
}

/// `url(pattern)`: matches a slash-separated template against the
/// Context's URL, case-insensitively, storing named/greedy captures into
/// the Context's URL-segments map on a match.
pub struct UrlPredicate {
    segments: Vec<Segment>,
}

impl UrlPredicate {
    #[must_use]
    pub fn new(pattern: &str) -> Self {
        let segments = pattern
            .trim_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|raw| {
                if let Some(name) = raw.strip_prefix(":*") {
                    Segment::GreedyCapture(name.to_string())
                } else if let Some(name) = raw.strip_prefix(':') {
                    Segment::Capture(name.to_string())
                } else {
                    Segment::Literal(raw.to_string())
                }
            })
            .collect();
        Self { segments }
    }

    /// Attempt to match `url` against this pattern, returning the
    /// captured segments on success.
    #[must_use]
    pub fn try_match(&self, url: &str) -> Option<HashMap<String, String>> {
        let parts: Vec<&str> = url.trim_matches('/').split('/').filter(|s| !s.is_empty()).collect();
        let mut captures = HashMap::new();
        let mut parts_iter = parts.iter();

        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::GreedyCapture(name) => {
                    let rest: Vec<&str> = parts_iter.by_ref().copied().collect();
                    if rest.is_empty() {
                        return None;
                    }
                    captures.insert(name.clone(), rest.join("/"));
                    if i != self.segments.len() - 1 {
                        // A greedy capture must be the final segment.
                        return None;
                    }
                }
                Segment::Capture(name) => {
                    let part = parts_iter.next()?;
                    captures.insert(name.clone(), (*part).to_string());
                }
                Segment::Literal(literal) => {
                    let part = parts_iter.next()?;
                    if !part.eq_ignore_ascii_case(literal) {
                        return None;
                    }
                }
            }
        }
        // Non-greedy patterns must consume the whole URL.
        if !self.segments.iter().any(|s| matches!(s, Segment::GreedyCapture(_))) && parts_iter.next().is_some() {
            return None;
        }
        Some(captures)
    }
}

#[async_trait]
impl Predicate for UrlPredicate {
    async fn evaluate(&self, ctx: &mut Context) -> DispatchResult<bool> {
        let url = ctx.url().to_string();
        match self.try_match(&url) {
            Some(captures) => {
                let mut segments = ctx.segments().clone();
                segments.extend(captures);
                ctx.set_segments(segments);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[must_use]
pub fn url(pattern: &str) -> UrlPredicate {
    UrlPredicate::new(pattern)
}

/// `equal(expr, value)`: compares a dotted-path expression against a
/// literal JSON value.
pub struct EqualPredicate {
    path: String,
    value: Value,
}

#[async_trait]
impl Predicate for EqualPredicate {
    async fn evaluate(&self, ctx: &mut Context) -> DispatchResult<bool> {
        Ok(ctx.resolve_path(&self.path).as_ref() == Some(&self.value))
    }
}

#[must_use]
pub fn equal(path: impl Into<String>, value: Value) -> EqualPredicate {
    EqualPredicate {
        path: path.into(),
        value,
    }
}

/// `in_list(expr, values...)`: true if the resolved value matches any of
/// the given values.
pub struct InListPredicate {
    path: String,
    values: Vec<Value>,
}

#[async_trait]
impl Predicate for InListPredicate {
    async fn evaluate(&self, ctx: &mut Context) -> DispatchResult<bool> {
        let Some(resolved) = ctx.resolve_path(&self.path) else {
            return Ok(false);
        };
        Ok(self.values.iter().any(|v| v == &resolved))
    }
}

#[must_use]
pub fn in_list(path: impl Into<String>, values: Vec<Value>) -> InListPredicate {
    InListPredicate {
        path: path.into(),
        values,
    }
}

macro_rules! method_predicate {
    ($name:ident, $method:expr) => {
        #[must_use]
        pub fn $name(pattern: &str) -> PredicateChain {
            PredicateChain::new()
                .and(equal("method", Value::String($method.to_string())))
                .and(url(pattern))
        }
    };
}

method_predicate!(get, "GET");
method_predicate!(post, "POST");
method_predicate!(put, "PUT");
method_predicate!(delete, "DELETE");
method_predicate!(patch, "PATCH");
method_predicate!(head, "HEAD");
method_predicate!(options, "OPTIONS");

type CallbackFuture = Pin<Box<dyn Future<Output = DispatchResult<bool>> + Send>>;

/// Adapter for an arbitrary sync or async predicate function.
pub struct CallbackPredicate<F> {
    callback: F,
}

impl<F> CallbackPredicate<F>
where
    F: Fn(&mut Context) -> CallbackFuture + Send + Sync,
{
    #[must_use]
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

#[async_trait]
impl<F> Predicate for CallbackPredicate<F>
where
    F: Fn(&mut Context) -> CallbackFuture + Send + Sync,
{
    async fn evaluate(&self, ctx: &mut Context) -> DispatchResult<bool> {
        (self.callback)(ctx).await
    }
}

/// Wrap a synchronous closure `Fn(&Context) -> bool` as a predicate.
#[must_use]
pub fn callback_sync(f: impl Fn(&Context) -> bool + Send + Sync + 'static) -> CallbackPredicate<impl Fn(&mut Context) -> CallbackFuture + Send + Sync> {
    CallbackPredicate::new(move |ctx: &mut Context| {
        let result = f(ctx);
        Box::pin(async move { Ok(result) }) as CallbackFuture
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cms::CmsObject;
    use crate::context::ContextKind;
    use relaymesh_di::ContainerBuilder;

    fn test_ctx(url: &str) -> Context {
        let scope = ContainerBuilder::new().build().create_scope();
        Context::new(ContextKind::HttpRest, CmsObject::new(), url.to_string(), scope)
    }

    #[tokio::test]
    async fn route_capture_matches_named_and_greedy_segments() {
        let p = url("/a/:x/b/:*y");
        let mut ctx = test_ctx("/a/42/b/p/q");
        assert!(p.evaluate(&mut ctx).await.unwrap());
        assert_eq!(ctx.segments().get("x").unwrap(), "42");
        assert_eq!(ctx.segments().get("y").unwrap(), "p/q");
    }

    #[tokio::test]
    async fn url_predicate_is_case_insensitive_on_literals() {
        let p = url("/Users/:id");
        let mut ctx = test_ctx("/users/7");
        assert!(p.evaluate(&mut ctx).await.unwrap());
        assert_eq!(ctx.segments().get("id").unwrap(), "7");
    }

    #[tokio::test]
    async fn non_greedy_pattern_rejects_extra_segments() {
        let p = url("/a/:x");
        let mut ctx = test_ctx("/a/1/2");
        assert!(!p.evaluate(&mut ctx).await.unwrap());
    }

    #[tokio::test]
    async fn and_chain_short_circuits_on_first_failure() {
        let mut cms = CmsObject::new();
        cms.set("request", serde_json::json!({"method": "POST"}));
        let scope = ContainerBuilder::new().build().create_scope();
        let mut ctx = Context::new(ContextKind::HttpRest, cms, "/x".to_string(), scope);
        let chain = get("/x");
        assert!(!chain.matches(&mut ctx).await.unwrap());
        assert!(ctx.segments().is_empty(), "url predicate must not run after method mismatch");
    }
}
