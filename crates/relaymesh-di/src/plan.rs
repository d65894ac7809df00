//! Injection plans: a pre-compiled per-callable parameter-resolution
//! strategy.
//!
//! A plan is built once, at registration time, from a declared parameter
//! list, since there is no reflection over a Rust function's signature to
//! drive this automatically; callers declare their own parameters instead.
//! The same `InjectionPlan` is reused on every invocation of its target.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use crate::descriptor::AnyInstance;
use crate::error::{DiError, DiResult};
use crate::resolver::DynResolver;

/// The scalar/collection shape a `Value` strategy parameter converts into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// A UTF-8 string, used as-is.
    String,
    /// Parsed via `str::parse::<i64>`.
    Integer,
    /// Parsed via `str::parse::<f64>`.
    Float,
    /// Used as-is.
    Bool,
    /// A JSON array; a bare scalar is promoted to a one-element array.
    List,
}

/// How one named parameter of a target is resolved.
#[derive(Clone)]
pub enum ParamStrategy {
    /// Resolved from caller-supplied named arguments (`ResolveArgs::kwargs`).
    Value {
        /// Target scalar/collection shape, used for the conversion rules
        /// below (string→int/float, scalar→collection promotion).
        kind: ValueKind,
        /// Whether a missing value is tolerated (parameter is optional;
        /// the call site then uses its own default instead of erroring).
        optional: bool,
    },
    /// Resolved from the container.
    Service {
        type_id: TypeId,
        type_name: &'static str,
        tag: Option<Arc<str>>,
        optional: bool,
    },
    /// Resolved as all registered implementations of a service type, in
    /// registration order.
    ServiceList {
        type_id: TypeId,
        type_name: &'static str,
    },
}

impl ParamStrategy {
    /// A `Service` strategy for `T`, optionally tagged.
    #[must_use]
    pub fn service<T: 'static>(tag: Option<impl Into<Arc<str>>>, optional: bool) -> Self {
        ParamStrategy::Service {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            tag: tag.map(Into::into),
            optional,
        }
    }

    /// A `ServiceList` strategy for `T`.
    #[must_use]
    pub fn service_list<T: 'static>() -> Self {
        ParamStrategy::ServiceList {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }
}

/// Caller-supplied data passed into a resolution: named scalar arguments
/// plus, for generic-keyed resolutions, the tag that selected the
/// descriptor.
#[derive(Debug, Clone, Default)]
pub struct ResolveArgs {
    pub kwargs: HashMap<String, serde_json::Value>,
    pub generic_tag: Option<Arc<str>>,
}

impl ResolveArgs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.kwargs.insert(name.into(), value);
        self
    }
}

/// The fully-resolved value for one parameter.
pub enum ResolvedValue {
    Json(serde_json::Value),
    Service(AnyInstance),
    ServiceList(Vec<AnyInstance>),
}

/// The full parameter map produced by executing a plan.
pub type ResolvedArgs = HashMap<String, ResolvedValue>;

/// A pre-compiled, named parameter-resolution strategy for one target
/// callable or constructor. Built once, reused on every call.
#[derive(Clone, Default)]
pub struct InjectionPlan {
    params: Vec<(String, ParamStrategy)>,
}

impl InjectionPlan {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare one parameter, in the order the target expects it.
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, strategy: ParamStrategy) -> Self {
        self.params.push((name.into(), strategy));
        self
    }

    /// Execute the plan against a container and caller-supplied arguments,
    /// producing the full resolved parameter map.
    ///
    /// Errors are surfaced with the failing parameter name attached. A
    /// missing `optional` parameter simply has no entry in the returned
    /// map rather than erroring.
    pub fn resolve(&self, resolver: &dyn DynResolver, args: &ResolveArgs) -> DiResult<ResolvedArgs> {
        let mut out = ResolvedArgs::with_capacity(self.params.len());
        for (name, strategy) in &self.params {
            match strategy {
                ParamStrategy::Value { kind, optional } => {
                    match args.kwargs.get(name) {
                        Some(raw) => {
                            let converted = convert_value(name, *kind, raw)?;
                            out.insert(name.clone(), ResolvedValue::Json(converted));
                        }
                        None if *optional => {}
                        None => {
                            return Err(DiError::ParameterResolution {
                                parameter: name.clone(),
                                reason: "no value supplied".into(),
                            });
                        }
                    }
                }
                ParamStrategy::Service {
                    type_id,
                    type_name,
                    tag,
                    optional,
                } => match resolver.get_any(*type_id, tag.as_deref()) {
                    Some(instance) => {
                        out.insert(name.clone(), ResolvedValue::Service(instance));
                    }
                    None if *optional => {}
                    None => {
                        return Err(DiError::ParameterResolution {
                            parameter: name.clone(),
                            reason: format!("no service registered for {type_name}"),
                        });
                    }
                },
                ParamStrategy::ServiceList { type_id, .. } => {
                    let all = resolver.get_all_any(*type_id);
                    out.insert(name.clone(), ResolvedValue::ServiceList(all));
                }
            }
        }
        Ok(out)
    }
}

fn convert_value(
    param: &str,
    kind: ValueKind,
    raw: &serde_json::Value,
) -> DiResult<serde_json::Value> {
    use serde_json::Value as J;
    let fail = |target: &str, reason: String| {
        DiError::ValueConversion {
            parameter: param.to_string(),
            target: target.to_string(),
            reason,
        }
    };
    match kind {
        ValueKind::String => Ok(J::String(scalar_to_string(raw))),
        ValueKind::Integer => {
            let n = match raw {
                J::Number(n) => n.as_i64().ok_or_else(|| fail("integer", "not an integer".into()))?,
                J::String(s) => s
                    .parse::<i64>()
                    .map_err(|e| fail("integer", e.to_string()))?,
                other => return Err(fail("integer", format!("unsupported value {other}"))),
            };
            Ok(J::from(n))
        }
        ValueKind::Float => {
            let f = match raw {
                J::Number(n) => n.as_f64().ok_or_else(|| fail("float", "not a float".into()))?,
                J::String(s) => s
                    .parse::<f64>()
                    .map_err(|e| fail("float", e.to_string()))?,
                other => return Err(fail("float", format!("unsupported value {other}"))),
            };
            Ok(serde_json::Number::from_f64(f)
                .map(J::Number)
                .unwrap_or(J::Null))
        }
        ValueKind::Bool => match raw {
            J::Bool(b) => Ok(J::Bool(*b)),
            J::String(s) => s
                .parse::<bool>()
                .map(J::Bool)
                .map_err(|e| fail("bool", e.to_string())),
            other => Err(fail("bool", format!("unsupported value {other}"))),
        },
        ValueKind::List => match raw {
            J::Array(_) => Ok(raw.clone()),
            scalar => Ok(J::Array(vec![scalar.clone()])),
        },
    }
}

fn scalar_to_string(raw: &serde_json::Value) -> String {
    match raw {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Convenience for downcasting a resolved service back to its concrete
/// type at the call site.
impl ResolvedValue {
    #[must_use]
    pub fn as_service<T: 'static>(&self) -> Option<Arc<T>> {
        match self {
            ResolvedValue::Service(instance) => {
                Arc::downcast::<T>(Arc::clone(instance) as Arc<dyn Any + Send + Sync>).ok()
            }
            _ => None,
        }
    }

    #[must_use]
    pub fn as_service_list<T: 'static>(&self) -> Vec<Arc<T>> {
        match self {
            ResolvedValue::ServiceList(list) => list
                .iter()
                .filter_map(|i| Arc::downcast::<T>(Arc::clone(i)).ok())
                .collect(),
            _ => Vec::new(),
        }
    }

    #[must_use]
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            ResolvedValue::Json(v) => Some(v),
            _ => None,
        }
    }
}
