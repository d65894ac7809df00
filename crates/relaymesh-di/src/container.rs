//! The dependency-injection container: registration, resolution, scoping.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::descriptor::{AnyInstance, Factory, HostedCaster, Implementation, ServiceDescriptor, ServiceLifetime};
use crate::error::{DiError, DiResult};
use crate::hosted::HostedService;
use crate::key::ServiceKey;
use crate::plan::ResolveArgs;
use crate::resolver::DynResolver;

type DescriptorMapKey = (TypeId, Option<Arc<str>>);
/// Identifies one registered implementation: its map key plus its
/// position among same-key registrations (multiple implementations of
/// the same service key resolve in registration order).
type InstanceKey = (DescriptorMapKey, usize);

/// Builds a [`Container`]. Registration happens exclusively through this
/// type; once [`ContainerBuilder::build`] is called, the resulting
/// container's descriptor lists are read-only.
#[derive(Default)]
pub struct ContainerBuilder {
    descriptors: HashMap<DescriptorMapKey, Vec<ServiceDescriptor>>,
    hosted_order: Vec<InstanceKey>,
}

impl ContainerBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, key: ServiceKey, descriptor: ServiceDescriptor) -> &mut Self {
        let map_key = (key.type_id(), key.tag().map(Arc::from));
        let is_hosted = descriptor.is_hosted;
        let entry = self.descriptors.entry(map_key.clone()).or_default();
        let index = entry.len();
        entry.push(descriptor);
        if is_hosted {
            self.hosted_order.push((map_key, index));
        }
        self
    }

    /// Register a singleton built by `factory` on first resolution.
    pub fn add_singleton<T: Any + Send + Sync + 'static>(
        &mut self,
        tag: Option<impl Into<Arc<str>>>,
        factory: impl Fn(&dyn DynResolver, &ResolveArgs) -> DiResult<T> + Send + Sync + 'static,
    ) -> &mut Self {
        let key = make_key::<T>(tag);
        let factory: Factory = wrap_factory(factory);
        self.push(
            key.clone(),
            ServiceDescriptor::new(key, ServiceLifetime::Singleton, Implementation::Factory(factory)),
        )
    }

    /// Register a pre-built singleton instance.
    pub fn add_singleton_instance<T: Any + Send + Sync + 'static>(
        &mut self,
        tag: Option<impl Into<Arc<str>>>,
        instance: T,
    ) -> &mut Self {
        let key = make_key::<T>(tag);
        let any: AnyInstance = Arc::new(instance);
        self.push(
            key.clone(),
            ServiceDescriptor::new(key, ServiceLifetime::Singleton, Implementation::Instance(any)),
        )
    }

    /// Register a hosted service: a singleton eagerly constructed (and, if
    /// it implements [`HostedService`], started) during
    /// [`Container::initialize_hosted_services`].
    pub fn add_hosted<T: HostedService + Any + Send + Sync + 'static>(
        &mut self,
        tag: Option<impl Into<Arc<str>>>,
        priority: i32,
        factory: impl Fn(&dyn DynResolver, &ResolveArgs) -> DiResult<T> + Send + Sync + 'static,
    ) -> &mut Self {
        let key = make_key::<T>(tag);
        let factory: Factory = wrap_factory(factory);
        let mut descriptor =
            ServiceDescriptor::new(key.clone(), ServiceLifetime::Singleton, Implementation::Factory(factory));
        descriptor.priority = priority;
        descriptor.is_hosted = true;
        let caster: HostedCaster = Arc::new(|any: AnyInstance| {
            Arc::downcast::<T>(any).ok().map(|arc| arc as Arc<dyn HostedService>)
        });
        descriptor.hosted_caster = Some(caster);
        self.push(key, descriptor)
    }

    /// Register a scoped service: one instance per [`Scope`].
    pub fn add_scoped<T: Any + Send + Sync + 'static>(
        &mut self,
        tag: Option<impl Into<Arc<str>>>,
        factory: impl Fn(&dyn DynResolver, &ResolveArgs) -> DiResult<T> + Send + Sync + 'static,
    ) -> &mut Self {
        let key = make_key::<T>(tag);
        let factory: Factory = wrap_factory(factory);
        self.push(
            key.clone(),
            ServiceDescriptor::new(key, ServiceLifetime::Scoped, Implementation::Factory(factory)),
        )
    }

    /// Register a transient service: constructed fresh on every resolution.
    pub fn add_transient<T: Any + Send + Sync + 'static>(
        &mut self,
        tag: Option<impl Into<Arc<str>>>,
        factory: impl Fn(&dyn DynResolver, &ResolveArgs) -> DiResult<T> + Send + Sync + 'static,
    ) -> &mut Self {
        let key = make_key::<T>(tag);
        let factory: Factory = wrap_factory(factory);
        self.push(
            key.clone(),
            ServiceDescriptor::new(key, ServiceLifetime::Transient, Implementation::Factory(factory)),
        )
    }

    /// Finalize registration. Descriptor lists become read-only.
    #[must_use]
    pub fn build(mut self) -> Container {
        // Stable partition: priority>0 sorted descending, then priority<=0
        // kept in registration order.
        let descriptors = &self.descriptors;
        let priority_of = |k: &InstanceKey| descriptors[&k.0][k.1].priority;
        let hosted_order = std::mem::take(&mut self.hosted_order);
        let (mut positive, zero): (Vec<_>, Vec<_>) = hosted_order.into_iter().partition(|k| priority_of(k) > 0);
        positive.sort_by_key(|k| std::cmp::Reverse(priority_of(k)));
        positive.extend(zero);

        Container {
            inner: Arc::new(ContainerInner {
                descriptors: self.descriptors,
                hosted_order: positive,
                singleton_cache: DashMap::new(),
                started_hosted: Mutex::new(Vec::new()),
            }),
        }
    }
}

fn make_key<T: 'static>(tag: Option<impl Into<Arc<str>>>) -> ServiceKey {
    match tag {
        Some(tag) => ServiceKey::tagged::<T>(tag.into()),
        None => ServiceKey::of::<T>(),
    }
}

fn wrap_factory<T: Any + Send + Sync + 'static>(
    factory: impl Fn(&dyn DynResolver, &ResolveArgs) -> DiResult<T> + Send + Sync + 'static,
) -> Factory {
    Arc::new(move |resolver, args| {
        let value = factory(resolver, args)?;
        Ok(Arc::new(value) as AnyInstance)
    })
}

struct ContainerInner {
    descriptors: HashMap<DescriptorMapKey, Vec<ServiceDescriptor>>,
    /// Hosted descriptors in start order, pre-sorted at `build()` time.
    hosted_order: Vec<InstanceKey>,
    singleton_cache: DashMap<InstanceKey, AnyInstance>,
    started_hosted: Mutex<Vec<Arc<dyn HostedService>>>,
}

/// The root dependency-injection container. Cheap to clone (an `Arc`
/// underneath); descriptor lists are immutable once built.
#[derive(Clone)]
pub struct Container {
    inner: Arc<ContainerInner>,
}

impl Container {
    /// Resolve the first-registered implementation of `T`.
    #[must_use]
    pub fn get<T: Any + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.get_tagged(None::<&str>)
    }

    /// Resolve the first-registered implementation of `T[tag]`.
    #[must_use]
    pub fn get_tagged<T: Any + Send + Sync + 'static>(&self, tag: Option<&str>) -> Option<Arc<T>> {
        let any = self.get_any(TypeId::of::<T>(), tag)?;
        Arc::downcast::<T>(any).ok()
    }

    /// Resolve every registered implementation of `T`, in registration
    /// order.
    #[must_use]
    pub fn get_all<T: Any + Send + Sync + 'static>(&self) -> Vec<Arc<T>> {
        self.get_all_any(TypeId::of::<T>())
            .into_iter()
            .filter_map(|any| Arc::downcast::<T>(any).ok())
            .collect()
    }

    /// Create a new request scope. Shares the descriptor table; owns its
    /// own scoped-instance cache.
    #[must_use]
    pub fn create_scope(&self) -> Scope {
        Scope {
            container: self.clone(),
            scoped_cache: DashMap::new(),
        }
    }

    /// Construct (and, for implementors of [`HostedService`], start) every
    /// hosted descriptor in priority order.
    pub async fn initialize_hosted_services(&self) -> DiResult<()> {
        let order = self.inner.hosted_order.clone();
        for instance_key in order {
            let descriptor = &self.inner.descriptors[&instance_key.0][instance_key.1];
            let name = descriptor.key.to_string();
            let args = ResolveArgs::new();
            let instance = self.resolve_at(&instance_key, &args)?;
            let caster = descriptor.hosted_caster.clone();
            if let Some(caster) = caster {
                if let Some(hosted) = caster(instance) {
                    debug!(service = %name, "starting hosted service");
                    hosted.start().await.map_err(|e| DiError::HostedLifecycle {
                        name,
                        phase: "start",
                        reason: e.to_string(),
                    })?;
                    self.inner.started_hosted.lock().push(hosted);
                }
            }
        }
        Ok(())
    }

    /// Stop every started hosted service, in reverse start order.
    pub async fn shutdown_hosted_services(&self) {
        let mut started = self.inner.started_hosted.lock();
        while let Some(hosted) = started.pop() {
            if let Err(err) = hosted.stop().await {
                warn!(error = %err, "hosted service stop failed");
            }
        }
    }

    /// Resolve one specific registration, respecting its declared
    /// lifetime. `Scoped` descriptors resolved directly off the root
    /// container (rather than through a `Scope`) behave as
    /// container-lifetime singletons, so construction still happens
    /// exactly once.
    fn resolve_at(&self, instance_key: &InstanceKey, args: &ResolveArgs) -> DiResult<AnyInstance> {
        let descriptor = &self.inner.descriptors[&instance_key.0][instance_key.1];
        match descriptor.lifetime {
            ServiceLifetime::Transient => self.construct(descriptor, args),
            ServiceLifetime::Singleton | ServiceLifetime::Scoped => {
                if let Some(existing) = self.inner.singleton_cache.get(instance_key) {
                    return Ok(existing.clone());
                }
                let built = self.construct(descriptor, args)?;
                let instance = self
                    .inner
                    .singleton_cache
                    .entry(instance_key.clone())
                    .or_insert(built)
                    .clone();
                Ok(instance)
            }
        }
    }

    fn construct(&self, descriptor: &ServiceDescriptor, args: &ResolveArgs) -> DiResult<AnyInstance> {
        match &descriptor.implementation {
            Implementation::Instance(instance) => Ok(instance.clone()),
            Implementation::Factory(factory) => {
                let mut args = args.clone();
                args.generic_tag = descriptor.key.tag().map(Arc::from);
                factory(self, &args).map_err(|e| DiError::ConstructionFailed {
                    key: descriptor.key.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }
}

impl DynResolver for Container {
    fn get_any(&self, type_id: TypeId, tag: Option<&str>) -> Option<AnyInstance> {
        let map_key = (type_id, tag.map(Arc::from));
        let len = self.inner.descriptors.get(&map_key)?.len();
        if len == 0 {
            return None;
        }
        self.resolve_at(&(map_key, 0), &ResolveArgs::new()).ok()
    }

    fn get_all_any(&self, type_id: TypeId) -> Vec<AnyInstance> {
        let keys: Vec<DescriptorMapKey> = self
            .inner
            .descriptors
            .keys()
            .filter(|k| k.0 == type_id)
            .cloned()
            .collect();
        keys.into_iter()
            .flat_map(|map_key| {
                let len = self.inner.descriptors[&map_key].len();
                (0..len).filter_map(move |i| self.resolve_at(&(map_key.clone(), i), &ResolveArgs::new()).ok())
            })
            .collect()
    }
}

/// A request-scoped view over a [`Container`]: shares the descriptor
/// table, owns its own scoped-instance cache. Dropped (or explicitly
/// [`Scope::clear`]ed) at the end of one request.
pub struct Scope {
    container: Container,
    scoped_cache: DashMap<InstanceKey, AnyInstance>,
}

impl Scope {
    #[must_use]
    pub fn get<T: Any + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.get_tagged(None::<&str>)
    }

    #[must_use]
    pub fn get_tagged<T: Any + Send + Sync + 'static>(&self, tag: Option<&str>) -> Option<Arc<T>> {
        let any = self.get_any(TypeId::of::<T>(), tag)?;
        Arc::downcast::<T>(any).ok()
    }

    #[must_use]
    pub fn get_all<T: Any + Send + Sync + 'static>(&self) -> Vec<Arc<T>> {
        self.get_all_any(TypeId::of::<T>())
            .into_iter()
            .filter_map(|any| Arc::downcast::<T>(any).ok())
            .collect()
    }

    /// Empty the scoped-instance cache. Must strictly enclose the request
    /// it served.
    pub fn clear(&self) {
        self.scoped_cache.clear();
    }

    /// The root container this scope was created from.
    #[must_use]
    pub fn root(&self) -> &Container {
        &self.container
    }

    fn resolve_at(&self, instance_key: &InstanceKey, args: &ResolveArgs) -> DiResult<AnyInstance> {
        let descriptor = &self.container.inner.descriptors[&instance_key.0][instance_key.1];
        match descriptor.lifetime {
            ServiceLifetime::Scoped => {
                if let Some(existing) = self.scoped_cache.get(instance_key) {
                    return Ok(existing.clone());
                }
                let built = self.container.construct(descriptor, args)?;
                let instance = self.scoped_cache.entry(instance_key.clone()).or_insert(built).clone();
                Ok(instance)
            }
            _ => self.container.resolve_at(instance_key, args),
        }
    }
}

impl DynResolver for Scope {
    fn get_any(&self, type_id: TypeId, tag: Option<&str>) -> Option<AnyInstance> {
        let map_key = (type_id, tag.map(Arc::from));
        let len = self.container.inner.descriptors.get(&map_key)?.len();
        if len == 0 {
            return None;
        }
        self.resolve_at(&(map_key, 0), &ResolveArgs::new()).ok()
    }

    fn get_all_any(&self, type_id: TypeId) -> Vec<AnyInstance> {
        let keys: Vec<DescriptorMapKey> = self
            .container
            .inner
            .descriptors
            .keys()
            .filter(|k| k.0 == type_id)
            .cloned()
            .collect();
        keys.into_iter()
            .flat_map(|map_key| {
                let len = self.container.inner.descriptors[&map_key].len();
                (0..len).filter_map(move |i| self.resolve_at(&(map_key.clone(), i), &ResolveArgs::new()).ok())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn singleton_constructed_once() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);
        let mut builder = ContainerBuilder::new();
        builder.add_singleton::<String>(None::<&str>, |_, _| {
            CALLS.fetch_add(1, Ordering::SeqCst);
            Ok("hello".to_string())
        });
        let container = builder.build();
        let a = container.get::<String>().unwrap();
        let b = container.get::<String>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn generic_tagged_singleton_uniqueness() {
        let mut builder = ContainerBuilder::new();
        builder.add_singleton::<String>(Some("db"), |_, _| Ok("primary".to_string()));
        builder.add_singleton::<String>(Some("cache"), |_, _| Ok("redis".to_string()));
        let container = builder.build();
        let db = container.get_tagged::<String>(Some("db")).unwrap();
        let cache = container.get_tagged::<String>(Some("cache")).unwrap();
        assert_eq!(*db, "primary");
        assert_eq!(*cache, "redis");
        assert!(container.get_tagged::<String>(Some("missing")).is_none());
    }

    #[test]
    fn transient_constructs_every_time() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);
        let mut builder = ContainerBuilder::new();
        builder.add_transient::<usize>(None::<&str>, |_, _| Ok(CALLS.fetch_add(1, Ordering::SeqCst)));
        let container = builder.build();
        let a = container.get::<usize>().unwrap();
        let b = container.get::<usize>().unwrap();
        assert_ne!(*a, *b);
    }

    #[test]
    fn scoped_shared_within_scope_distinct_across_scopes() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);
        let mut builder = ContainerBuilder::new();
        builder.add_scoped::<usize>(None::<&str>, |_, _| Ok(CALLS.fetch_add(1, Ordering::SeqCst)));
        let container = builder.build();

        let scope_a = container.create_scope();
        let a1 = scope_a.get::<usize>().unwrap();
        let a2 = scope_a.get::<usize>().unwrap();
        assert!(Arc::ptr_eq(&a1, &a2));

        let scope_b = container.create_scope();
        let b1 = scope_b.get::<usize>().unwrap();
        assert!(!Arc::ptr_eq(&a1, &b1));
    }

    #[test]
    fn multi_implementation_resolves_in_registration_order() {
        trait Greeter: Send + Sync {
            fn greet(&self) -> &str;
        }
        struct Hello;
        impl Greeter for Hello {
            fn greet(&self) -> &str {
                "hello"
            }
        }
        struct Hi;
        impl Greeter for Hi {
            fn greet(&self) -> &str {
                "hi"
            }
        }

        let mut builder = ContainerBuilder::new();
        builder.add_singleton::<Arc<dyn Greeter>>(None::<&str>, |_, _| Ok(Arc::new(Hello) as Arc<dyn Greeter>));
        builder.add_singleton::<Arc<dyn Greeter>>(None::<&str>, |_, _| Ok(Arc::new(Hi) as Arc<dyn Greeter>));
        let container = builder.build();

        let all = container.get_all::<Arc<dyn Greeter>>();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].greet(), "hello");
        assert_eq!(all[1].greet(), "hi");

        let first = container.get::<Arc<dyn Greeter>>().unwrap();
        assert_eq!(first.greet(), "hello");
    }

    #[tokio::test]
    async fn hosted_services_start_in_priority_order_then_registration_order() {
        use crate::hosted::HostedService;
        use async_trait::async_trait;
        use tokio::sync::Mutex as AsyncMutex;

        static ORDER: AsyncMutex<Vec<&str>> = AsyncMutex::const_new(Vec::new());

        struct Recorder(&'static str);
        #[async_trait]
        impl HostedService for Recorder {
            async fn start(&self) -> DiResult<()> {
                ORDER.lock().await.push(self.0);
                Ok(())
            }
        }

        let mut builder = ContainerBuilder::new();
        builder.add_hosted::<Recorder>(Some("zero-a"), 0, |_, _| Ok(Recorder("zero-a")));
        builder.add_hosted::<Recorder>(Some("low"), 1, |_, _| Ok(Recorder("low")));
        builder.add_hosted::<Recorder>(Some("zero-b"), 0, |_, _| Ok(Recorder("zero-b")));
        builder.add_hosted::<Recorder>(Some("high"), 10, |_, _| Ok(Recorder("high")));
        let container = builder.build();
        container.initialize_hosted_services().await.unwrap();

        let order = ORDER.lock().await.clone();
        assert_eq!(order, vec!["high", "low", "zero-a", "zero-b"]);
    }
}
