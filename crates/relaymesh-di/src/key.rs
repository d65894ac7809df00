//! Service keys: a type identity optionally parameterized by a string tag.
//!
//! A generic registration such as `Options["db"]` is modeled as a (base
//! type, tag) pair and used verbatim as the cache key for singleton and
//! scoped instances. `Options["db"]` and `Options["db"]` then share an
//! instance while `Options["db"]` and `Options["cache"]` do not, without
//! needing a distinct Rust type per tag.

use std::any::TypeId;
use std::sync::Arc;

/// Identifies a registered or resolvable service: a Rust type plus an
/// optional generic-argument tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceKey {
    pub(crate) type_id: TypeId,
    pub(crate) type_name: &'static str,
    pub(crate) tag: Option<Arc<str>>,
}

impl ServiceKey {
    /// Build the key for `T` with no generic tag.
    #[must_use]
    pub fn of<T: 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            tag: None,
        }
    }

    /// Build the key for `T` parameterized by `tag`.
    #[must_use]
    pub fn tagged<T: 'static>(tag: impl Into<Arc<str>>) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            tag: Some(tag.into()),
        }
    }

    /// The tag carried by this key, if any.
    #[must_use]
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// The underlying Rust `TypeId`, used as half of the container's
    /// descriptor-map key.
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// The underlying Rust type name, for diagnostics.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl std::fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.tag {
            Some(tag) => write!(f, "{}[\"{}\"]", self.type_name, tag),
            None => f.write_str(self.type_name),
        }
    }
}
