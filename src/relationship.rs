//! Relationship adapters
//!
//! These wrappers change *how* a dependency is delivered without any extra
//! registration: deferred ([`Lazy`]), on demand ([`Func`]), with its own
//! disposable scope ([`Owned`]), by key ([`Index`]), with registration
//! metadata ([`Meta`]) or as every registration at once (`Vec<_>`).
//!
//! Adapters that outlive the resolution hold the scope weakly. Using one after
//! its scope has gone away fails with [`DiError::ScopeDisposed`].

use crate::registration::{AnyArc, RegistrationEntry, unwrap_service};
use crate::resolver::{resolve_entry, resolve_service};
use crate::scope::WeakScope;
use crate::{DiError, LifetimeScope, Metadata, Parameters, ResolveContext, Resolvable, Result, ServiceKey};
use once_cell::sync::OnceCell;
use std::any::TypeId;
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::Arc;

/// What an adapter resolves when it is finally used.
#[derive(Clone)]
enum Target {
    /// The default registration of a service
    Default(ServiceKey),
    /// One specific registration (used by collections)
    Entry(Arc<RegistrationEntry>, ServiceKey),
}

impl Target {
    fn default_of<T: ?Sized + 'static>(ctx: &ResolveContext<'_>) -> Result<Self> {
        let key = ServiceKey::of::<T>();
        if !ctx.scope().is_registered(&key) {
            return Err(DiError::not_registered(&key));
        }
        Ok(Self::Default(key))
    }

    fn key(&self) -> &ServiceKey {
        match self {
            Self::Default(key) | Self::Entry(_, key) => key,
        }
    }

    fn resolve<T: ?Sized + Send + Sync + 'static>(
        &self,
        scope: &LifetimeScope,
        parameters: &Parameters,
    ) -> Result<Arc<T>> {
        let payload = match self {
            Self::Default(key) => resolve_service(scope, key, parameters)?,
            Self::Entry(entry, key) => resolve_entry(scope, entry, key, parameters)?,
        };
        unwrap_service::<T>(&payload)
    }
}

// =============================================================================
// Func - resolve on every call
// =============================================================================

/// Factory that performs a fresh resolution on every call.
///
/// Sharing policies still apply: calling a `Func` for a single-instance
/// service returns the same instance each time.
pub struct Func<T: ?Sized> {
    scope: WeakScope,
    target: Target,
    _service: PhantomData<fn() -> Arc<T>>,
}

impl<T: ?Sized + Send + Sync + 'static> Func<T> {
    /// Resolve `T`.
    pub fn call(&self) -> Result<Arc<T>> {
        self.call_with(&Parameters::new())
    }

    /// Resolve `T` with explicit parameters for its activation.
    pub fn call_with(&self, parameters: &Parameters) -> Result<Arc<T>> {
        let scope = self.scope.upgrade()?;
        self.target.resolve(&scope, parameters)
    }
}

impl<T: ?Sized + Send + Sync + 'static> Resolvable for Func<T> {
    fn resolve_at(ctx: &ResolveContext<'_>, _position: Option<usize>) -> Result<Self> {
        Ok(Self {
            scope: ctx.scope().downgrade(),
            target: Target::default_of::<T>(ctx)?,
            _service: PhantomData,
        })
    }
}

impl<T: ?Sized> Clone for Func<T> {
    fn clone(&self) -> Self {
        Self {
            scope: self.scope.clone(),
            target: self.target.clone(),
            _service: PhantomData,
        }
    }
}

impl<T: ?Sized> fmt::Debug for Func<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Func").field(self.target.key()).finish()
    }
}

/// Delegate factory taking one argument, supplied as a typed parameter.
///
/// ```rust
/// use lifetime_di::{ContainerBuilder, Func1};
///
/// struct Shareholding {
///     symbol: String,
///     holding: u32,
/// }
///
/// let mut builder = ContainerBuilder::new();
/// builder.register(|ctx| {
///     Ok(Shareholding {
///         symbol: ctx.parameter::<String>("symbol")?,
///         holding: 100,
///     })
/// });
/// let container = builder.build();
///
/// let factory = container.resolve::<Func1<String, Shareholding>>().unwrap();
/// let share = factory.call("ABC".to_string()).unwrap();
/// assert_eq!(share.symbol, "ABC");
/// assert_eq!(share.holding, 100);
/// ```
pub struct Func1<A, T: ?Sized> {
    inner: Func<T>,
    _args: PhantomData<fn(A)>,
}

impl<A, T> Func1<A, T>
where
    A: Clone + Send + Sync + 'static,
    T: ?Sized + Send + Sync + 'static,
{
    /// Resolve `T`, passing `a` as a typed and positional (0) parameter.
    pub fn call(&self, a: A) -> Result<Arc<T>> {
        let parameters = Parameters::new().typed(a.clone()).positional(0, a);
        self.inner.call_with(&parameters)
    }
}

impl<A, T> Resolvable for Func1<A, T>
where
    A: Clone + Send + Sync + 'static,
    T: ?Sized + Send + Sync + 'static,
{
    fn resolve_at(ctx: &ResolveContext<'_>, position: Option<usize>) -> Result<Self> {
        Ok(Self {
            inner: Func::resolve_at(ctx, position)?,
            _args: PhantomData,
        })
    }
}

impl<A, T: ?Sized> fmt::Debug for Func1<A, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Func1").field(self.inner.target.key()).finish()
    }
}

/// Delegate factory taking two arguments.
///
/// Arguments are supplied by position. They are also supplied by type when
/// their types differ; two arguments of one type are positional only.
pub struct Func2<A, B, T: ?Sized> {
    inner: Func<T>,
    _args: PhantomData<fn(A, B)>,
}

impl<A, B, T> Func2<A, B, T>
where
    A: Clone + Send + Sync + 'static,
    B: Clone + Send + Sync + 'static,
    T: ?Sized + Send + Sync + 'static,
{
    /// Resolve `T`, passing `a` and `b` as parameters 0 and 1.
    pub fn call(&self, a: A, b: B) -> Result<Arc<T>> {
        let mut parameters = Parameters::new()
            .positional(0, a.clone())
            .positional(1, b.clone());
        if TypeId::of::<A>() != TypeId::of::<B>() {
            parameters = parameters.typed(a).typed(b);
        }
        self.inner.call_with(&parameters)
    }
}

impl<A, B, T> Resolvable for Func2<A, B, T>
where
    A: Clone + Send + Sync + 'static,
    B: Clone + Send + Sync + 'static,
    T: ?Sized + Send + Sync + 'static,
{
    fn resolve_at(ctx: &ResolveContext<'_>, position: Option<usize>) -> Result<Self> {
        Ok(Self {
            inner: Func::resolve_at(ctx, position)?,
            _args: PhantomData,
        })
    }
}

impl<A, B, T: ?Sized> fmt::Debug for Func2<A, B, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Func2").field(self.inner.target.key()).finish()
    }
}

// =============================================================================
// Lazy - resolve at most once, on first use
// =============================================================================

/// Deferred dependency resolved on the first call to [`value`](Lazy::value).
///
/// The result is memoised; a failed resolution is not, so a later call
/// tries again.
pub struct Lazy<T: ?Sized> {
    scope: WeakScope,
    target: Target,
    value: OnceCell<Arc<T>>,
}

impl<T: ?Sized + Send + Sync + 'static> Lazy<T> {
    fn new(ctx: &ResolveContext<'_>, target: Target) -> Self {
        Self {
            scope: ctx.scope().downgrade(),
            target,
            value: OnceCell::new(),
        }
    }

    /// Resolve (once) and return the value.
    pub fn value(&self) -> Result<Arc<T>> {
        self.value
            .get_or_try_init(|| {
                let scope = self.scope.upgrade()?;
                self.target.resolve(&scope, &Parameters::new())
            })
            .map(Arc::clone)
    }

    /// Whether the value has been resolved.
    #[inline]
    pub fn is_value_created(&self) -> bool {
        self.value.get().is_some()
    }
}

impl<T: ?Sized + Send + Sync + 'static> Resolvable for Lazy<T> {
    fn resolve_at(ctx: &ResolveContext<'_>, _position: Option<usize>) -> Result<Self> {
        Ok(Self::new(ctx, Target::default_of::<T>(ctx)?))
    }
}

impl<T: ?Sized> fmt::Debug for Lazy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lazy")
            .field("service", self.target.key())
            .field("created", &self.value.get().is_some())
            .finish()
    }
}

// =============================================================================
// Owned - value with its own disposable scope
// =============================================================================

/// A value resolved in a private child scope.
///
/// Dropping the `Owned` (or calling [`release`](Owned::release)) disposes that
/// scope, releasing the value and every dependency activated for it.
pub struct Owned<T: ?Sized> {
    value: Arc<T>,
    scope: LifetimeScope,
}

impl<T: ?Sized + Send + Sync + 'static> Owned<T> {
    fn resolve_in(ctx: &ResolveContext<'_>, target: &Target) -> Result<Self> {
        let scope = ctx.scope().begin_scope()?;
        let value = target.resolve(&scope, ctx.request_parameters())?;
        Ok(Self { value, scope })
    }

    /// The owned value.
    #[inline]
    pub fn value(&self) -> &Arc<T> {
        &self.value
    }

    /// The private scope the value was resolved in.
    #[inline]
    pub fn scope(&self) -> &LifetimeScope {
        &self.scope
    }

    /// Dispose the value's scope now.
    pub fn release(self) {
        drop(self);
    }
}

impl<T: ?Sized> Drop for Owned<T> {
    fn drop(&mut self) {
        self.scope.dispose();
    }
}

impl<T: ?Sized> Deref for Owned<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: ?Sized + Send + Sync + 'static> Resolvable for Owned<T> {
    fn resolve_at(ctx: &ResolveContext<'_>, _position: Option<usize>) -> Result<Self> {
        Self::resolve_in(ctx, &Target::Default(ServiceKey::of::<T>()))
    }
}

impl<T: ?Sized> fmt::Debug for Owned<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Owned")
            .field("service", &std::any::type_name::<T>())
            .field("scope", &self.scope.id())
            .finish()
    }
}

// =============================================================================
// Index - keyed lookup
// =============================================================================

/// Lookup of `T` registrations by key.
///
/// ```rust
/// use lifetime_di::{ContainerBuilder, DiError, Index};
/// use std::sync::Arc;
///
/// #[derive(Debug, Clone, Hash, PartialEq, Eq)]
/// enum DeviceState {
///     Online,
///     Offline,
/// }
///
/// trait Status: Send + Sync {
///     fn describe(&self) -> &'static str;
/// }
///
/// struct Up;
///
/// impl Status for Up {
///     fn describe(&self) -> &'static str {
///         "up"
///     }
/// }
///
/// let mut builder = ContainerBuilder::new();
/// builder
///     .register(|_| Ok(Up))
///     .keyed(DeviceState::Online, |s| s as Arc<dyn Status>);
/// let container = builder.build();
///
/// let index = container.resolve::<Index<DeviceState, dyn Status>>().unwrap();
/// assert_eq!(index.get(&DeviceState::Online).unwrap().describe(), "up");
/// assert!(matches!(
///     index.get(&DeviceState::Offline),
///     Err(DiError::KeyNotFound { .. })
/// ));
/// ```
pub struct Index<K, T: ?Sized> {
    scope: WeakScope,
    _key: PhantomData<fn(K) -> Arc<T>>,
}

impl<K, T> Index<K, T>
where
    K: Hash + Eq + fmt::Debug + Clone + Send + Sync + 'static,
    T: ?Sized + Send + Sync + 'static,
{
    /// Resolve the `T` registered under `key`.
    pub fn get(&self, key: &K) -> Result<Arc<T>> {
        let scope = self.scope.upgrade()?;
        let service = ServiceKey::keyed::<T, K>(key.clone());
        if !scope.is_registered(&service) {
            return Err(DiError::key_not_found::<T>(key));
        }
        ResolveContext::request(&scope, &Parameters::new()).get_service::<T>(&service)
    }

    /// Whether anything is registered under `key`.
    pub fn contains_key(&self, key: &K) -> bool {
        self.scope
            .upgrade()
            .is_ok_and(|scope| scope.is_registered(&ServiceKey::keyed::<T, K>(key.clone())))
    }
}

impl<K, T> Resolvable for Index<K, T>
where
    K: Hash + Eq + fmt::Debug + Clone + Send + Sync + 'static,
    T: ?Sized + Send + Sync + 'static,
{
    fn resolve_at(ctx: &ResolveContext<'_>, _position: Option<usize>) -> Result<Self> {
        ctx.scope().ensure_active()?;
        Ok(Self {
            scope: ctx.scope().downgrade(),
            _key: PhantomData,
        })
    }
}

impl<K, T: ?Sized> fmt::Debug for Index<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Index")
            .field("key", &std::any::type_name::<K>())
            .field("service", &std::any::type_name::<T>())
            .finish()
    }
}

// =============================================================================
// Meta - value plus registration metadata
// =============================================================================

/// A resolved value together with the metadata of the registration that
/// produced it.
///
/// `M` defaults to the weakly-typed [`Metadata`] map, which is empty when
/// nothing was attached.
pub struct Meta<T: ?Sized, M = Metadata> {
    value: Arc<T>,
    metadata: Arc<M>,
}

impl<T, M> Meta<T, M>
where
    T: ?Sized + Send + Sync + 'static,
    M: Send + Sync + 'static,
{
    fn for_entry(
        ctx: &ResolveContext<'_>,
        entry: &Arc<RegistrationEntry>,
        key: &ServiceKey,
    ) -> Result<Self> {
        let metadata = entry
            .metadata_of::<M>()
            .or_else(|| {
                let empty: AnyArc = Arc::new(Metadata::default());
                empty.downcast::<M>().ok()
            })
            .ok_or_else(|| DiError::MetadataNotFound {
                service: key.to_string(),
                metadata: std::any::type_name::<M>(),
            })?;
        let payload = resolve_entry(ctx.scope(), entry, key, ctx.request_parameters())?;
        Ok(Self {
            value: unwrap_service::<T>(&payload)?,
            metadata,
        })
    }

    /// The resolved value.
    #[inline]
    pub fn value(&self) -> &Arc<T> {
        &self.value
    }

    /// The registration's metadata.
    #[inline]
    pub fn metadata(&self) -> &M {
        &self.metadata
    }
}

impl<T: ?Sized, M> Clone for Meta<T, M> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            metadata: Arc::clone(&self.metadata),
        }
    }
}

impl<T: ?Sized, M> Deref for Meta<T, M> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T, M> Resolvable for Meta<T, M>
where
    T: ?Sized + Send + Sync + 'static,
    M: Send + Sync + 'static,
{
    fn resolve_at(ctx: &ResolveContext<'_>, _position: Option<usize>) -> Result<Self> {
        let key = ServiceKey::of::<T>();
        let entry = ctx
            .scope()
            .registry()
            .default_for(&key)
            .ok_or_else(|| DiError::not_registered(&key))?;
        Self::for_entry(ctx, entry, &key)
    }
}

impl<T: ?Sized, M: fmt::Debug> fmt::Debug for Meta<T, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Meta")
            .field("service", &std::any::type_name::<T>())
            .field("metadata", &self.metadata)
            .finish()
    }
}

// =============================================================================
// Collections - every registration of a service
// =============================================================================

/// Item shapes that can be collected into a `Vec` of all registrations.
///
/// Implemented for `Arc<T>`, [`Meta`], [`Lazy`] and [`Owned`], so
/// `Vec<Meta<dyn Command>>` or `Vec<Lazy<dyn Plugin>>` resolve one item per
/// registration.
pub trait Collectable: Sized {
    /// The (unkeyed) service whose registrations are collected.
    fn service_key() -> ServiceKey;

    /// Produce one item from one registration.
    fn from_entry(
        ctx: &ResolveContext<'_>,
        entry: &Arc<RegistrationEntry>,
        key: &ServiceKey,
    ) -> Result<Self>;
}

impl<T: ?Sized + Send + Sync + 'static> Collectable for Arc<T> {
    fn service_key() -> ServiceKey {
        ServiceKey::of::<T>()
    }

    fn from_entry(
        ctx: &ResolveContext<'_>,
        entry: &Arc<RegistrationEntry>,
        key: &ServiceKey,
    ) -> Result<Self> {
        Target::Entry(Arc::clone(entry), key.clone()).resolve(ctx.scope(), ctx.request_parameters())
    }
}

impl<T, M> Collectable for Meta<T, M>
where
    T: ?Sized + Send + Sync + 'static,
    M: Send + Sync + 'static,
{
    fn service_key() -> ServiceKey {
        ServiceKey::of::<T>()
    }

    fn from_entry(
        ctx: &ResolveContext<'_>,
        entry: &Arc<RegistrationEntry>,
        key: &ServiceKey,
    ) -> Result<Self> {
        Meta::for_entry(ctx, entry, key)
    }
}

impl<T: ?Sized + Send + Sync + 'static> Collectable for Lazy<T> {
    fn service_key() -> ServiceKey {
        ServiceKey::of::<T>()
    }

    fn from_entry(
        ctx: &ResolveContext<'_>,
        entry: &Arc<RegistrationEntry>,
        key: &ServiceKey,
    ) -> Result<Self> {
        Ok(Lazy::new(ctx, Target::Entry(Arc::clone(entry), key.clone())))
    }
}

impl<T: ?Sized + Send + Sync + 'static> Collectable for Owned<T> {
    fn service_key() -> ServiceKey {
        ServiceKey::of::<T>()
    }

    fn from_entry(
        ctx: &ResolveContext<'_>,
        entry: &Arc<RegistrationEntry>,
        key: &ServiceKey,
    ) -> Result<Self> {
        Owned::resolve_in(ctx, &Target::Entry(Arc::clone(entry), key.clone()))
    }
}

impl<D: Collectable> Resolvable for Vec<D> {
    fn resolve_at(ctx: &ResolveContext<'_>, _position: Option<usize>) -> Result<Self> {
        ctx.scope().ensure_active()?;
        let key = D::service_key();
        ctx.scope()
            .registry()
            .lookup(&key)
            .iter()
            .map(|entry| D::from_entry(ctx, entry, &key))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ContainerBuilder, Disposable};
    use std::sync::atomic::{AtomicUsize, Ordering};

    trait Plugin: Send + Sync {
        fn name(&self) -> &'static str;
    }

    struct Alpha;
    struct Beta;

    impl Plugin for Alpha {
        fn name(&self) -> &'static str {
            "alpha"
        }
    }

    impl Plugin for Beta {
        fn name(&self) -> &'static str {
            "beta"
        }
    }

    fn plugins() -> ContainerBuilder {
        let mut builder = ContainerBuilder::new();
        builder
            .register(|_| Ok(Alpha))
            .as_service(|p| p as Arc<dyn Plugin>)
            .with_metadata_value("order", 1);
        builder
            .register(|_| Ok(Beta))
            .as_service(|p| p as Arc<dyn Plugin>)
            .with_metadata_value("order", 2);
        builder
    }

    #[test]
    fn test_vec_in_registration_order() {
        let container = plugins().build();
        let all = container.resolve::<Vec<Arc<dyn Plugin>>>().unwrap();
        let names: Vec<_> = all.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["alpha", "beta"]);
    }

    #[test]
    fn test_vec_of_nothing_is_empty() {
        let container = ContainerBuilder::new().build();
        assert!(container.resolve::<Vec<Arc<dyn Plugin>>>().unwrap().is_empty());
    }

    #[test]
    fn test_vec_of_meta() {
        let container = plugins().build();
        let all = container.resolve::<Vec<Meta<dyn Plugin>>>().unwrap();
        let orders: Vec<_> = all
            .iter()
            .map(|m| m.metadata().get("order").and_then(|v| v.as_int()))
            .collect();
        assert_eq!(orders, vec![Some(1), Some(2)]);
        assert_eq!(all[1].name(), "beta");
    }

    #[test]
    fn test_meta_without_typed_metadata() {
        struct Weight;

        let container = plugins().build();
        assert!(matches!(
            container.resolve::<Meta<dyn Plugin, Weight>>(),
            Err(DiError::MetadataNotFound { .. })
        ));
        let meta = container.resolve::<Meta<dyn Plugin>>().unwrap();
        assert_eq!(meta.name(), "beta");
    }

    #[test]
    fn test_lazy_resolves_once_on_demand() {
        static CREATED: AtomicUsize = AtomicUsize::new(0);

        let mut builder = ContainerBuilder::new();
        builder.register(|_| {
            CREATED.fetch_add(1, Ordering::SeqCst);
            Ok(Alpha)
        });
        let container = builder.build();

        let lazy = container.resolve::<Lazy<Alpha>>().unwrap();
        assert!(!lazy.is_value_created());
        assert_eq!(CREATED.load(Ordering::SeqCst), 0);

        let first = lazy.value().unwrap();
        let second = lazy.value().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(CREATED.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_func_resolves_each_call() {
        let container = plugins().build();
        let func = container.resolve::<Func<dyn Plugin>>().unwrap();
        let a = func.call().unwrap();
        let b = func.call().unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(matches!(
            container.resolve::<Func<Alpha>>(),
            Err(DiError::NotRegistered { .. })
        ));
    }

    #[test]
    fn test_adapters_fail_after_scope_is_gone() {
        let container = plugins().build();
        let scope = container.begin_scope().unwrap();
        let func = scope.resolve::<Func<dyn Plugin>>().unwrap();
        let lazy = scope.resolve::<Lazy<dyn Plugin>>().unwrap();
        drop(scope);

        assert!(matches!(func.call(), Err(DiError::ScopeDisposed)));
        assert!(matches!(lazy.value(), Err(DiError::ScopeDisposed)));
    }

    #[test]
    fn test_owned_disposes_its_scope() {
        static DISPOSED: AtomicUsize = AtomicUsize::new(0);

        struct Handle;

        impl Disposable for Handle {
            fn dispose(&self) {
                DISPOSED.fetch_add(1, Ordering::SeqCst);
            }
        }

        let mut builder = ContainerBuilder::new();
        builder.register(|_| Ok(Handle)).disposable();
        let container = builder.build();

        let owned = container.resolve::<Owned<Handle>>().unwrap();
        assert_eq!(DISPOSED.load(Ordering::SeqCst), 0);
        assert_eq!(container.child_count(), 1);
        owned.release();
        assert_eq!(DISPOSED.load(Ordering::SeqCst), 1);
        assert_eq!(container.child_count(), 0);

        let all = container.resolve::<Vec<Owned<Handle>>>().unwrap();
        assert_eq!(all.len(), 1);
        drop(all);
        assert_eq!(DISPOSED.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_index_lookup() {
        let mut builder = ContainerBuilder::new();
        builder
            .register(|_| Ok(Alpha))
            .keyed(1_u8, |p| p as Arc<dyn Plugin>);
        let container = builder.build();

        let index = container.resolve::<Index<u8, dyn Plugin>>().unwrap();
        assert!(index.contains_key(&1));
        assert_eq!(index.get(&1).unwrap().name(), "alpha");
        assert!(matches!(index.get(&2), Err(DiError::KeyNotFound { .. })));
    }
}
