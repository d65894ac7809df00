//! Dependency-injection container for relaymesh.
//!
//! Three lifetimes (singleton, scoped, transient), a fourth `hosted` mode
//! that is a singleton eagerly started at container startup, multiple
//! implementations per service key, and generic-parameterized keys: a
//! base type plus an optional string tag, so `Options["db"]` and
//! `Options["cache"]` are distinct singletons without a distinct Rust
//! type per tag.
//!
//! Rust has no runtime reflection over constructor parameters, so rather
//! than inspect a target callable's signature at registration time,
//! callables declare their own [`InjectionPlan`] up front: an ordered
//! list of named parameter strategies (`Value`, `Service`, `ServiceList`).
//! The plan is built once and reused on every resolution.

mod container;
mod descriptor;
mod error;
mod hosted;
mod key;
mod plan;
mod resolver;

pub use container::{Container, ContainerBuilder, Scope};
pub use descriptor::ServiceLifetime;
pub use error::{DiError, DiResult};
pub use hosted::HostedService;
pub use key::ServiceKey;
pub use plan::{InjectionPlan, ParamStrategy, ResolveArgs, ResolvedArgs, ResolvedValue, ValueKind};
pub use resolver::DynResolver;
