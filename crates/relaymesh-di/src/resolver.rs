//! The narrow, type-erased resolution surface that both the root
//! [`crate::Container`] and a request [`crate::Scope`] implement.
//!
//! [`crate::InjectionPlan::resolve`] and service factories are written
//! against this trait rather than a concrete container type, so the same
//! plan or factory runs unchanged whether it is resolving against the
//! root container (hosted-service construction) or a per-request scope.

use std::any::TypeId;

use crate::descriptor::AnyInstance;

/// Type-erased service resolution, used internally by [`crate::InjectionPlan`]
/// and by service factories.
pub trait DynResolver: Send + Sync {
    /// Resolve the first-registered implementation of `type_id`
    /// (optionally tagged), respecting its declared lifetime.
    fn get_any(&self, type_id: TypeId, tag: Option<&str>) -> Option<AnyInstance>;

    /// Resolve every registered implementation of `type_id`, in
    /// registration order, each respecting its own lifetime.
    fn get_all_any(&self, type_id: TypeId) -> Vec<AnyInstance>;
}
