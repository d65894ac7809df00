//! Service descriptors: one (key, implementation, lifetime) registration.

use std::any::Any;
use std::sync::Arc;

use crate::error::DiResult;
use crate::hosted::HostedService;
use crate::key::ServiceKey;
use crate::plan::ResolveArgs;
use crate::resolver::DynResolver;

/// A type-erased service instance, always stored behind an `Arc` so that
/// singleton/scoped caches can hand out shared references cheaply.
pub type AnyInstance = Arc<dyn Any + Send + Sync>;

/// A factory closure: `(resolver, resolve_args) -> instance`.
pub type Factory = Arc<dyn Fn(&dyn DynResolver, &ResolveArgs) -> DiResult<AnyInstance> + Send + Sync>;

/// Downcasts a constructed instance to `Arc<dyn HostedService>`, built once
/// at registration time when the concrete type `T` is still known.
pub type HostedCaster = Arc<dyn Fn(AnyInstance) -> Option<Arc<dyn HostedService>> + Send + Sync>;

/// The lifetime of a registered service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceLifetime {
    /// One instance for the entire container (shared across scopes).
    Singleton,
    /// One instance per scope (request).
    Scoped,
    /// A new instance on every resolution.
    Transient,
}

pub(crate) enum Implementation {
    Factory(Factory),
    Instance(AnyInstance),
}

/// One registration: a key, its lifetime, and how to build it.
///
/// Exactly one of {factory, instance} backs the descriptor. The
/// `ContainerBuilder` API enforces this by construction: each registration
/// call builds exactly one `Implementation` variant.
pub(crate) struct ServiceDescriptor {
    pub(crate) key: ServiceKey,
    pub(crate) lifetime: ServiceLifetime,
    pub(crate) implementation: Implementation,
    /// Hosted-service initialization priority; higher starts first.
    pub(crate) priority: i32,
    pub(crate) is_hosted: bool,
    pub(crate) hosted_caster: Option<HostedCaster>,
}

impl ServiceDescriptor {
    pub(crate) fn new(
        key: ServiceKey,
        lifetime: ServiceLifetime,
        implementation: Implementation,
    ) -> Self {
        Self {
            key,
            lifetime,
            implementation,
            priority: 0,
            is_hosted: false,
            hosted_caster: None,
        }
    }
}
