//! Registration entries and the fluent registration API
//!
//! A [`RegistrationEntry`] describes how to produce one component: its
//! activator, the services it is exposed as, its sharing and ownership
//! policies, lifecycle hooks and metadata. Entries are configured through a
//! [`RegistrationBuilder`] while the [`ContainerBuilder`](crate::ContainerBuilder)
//! is open and are immutable once the registry is built.
//!
//! ## Instance representation
//!
//! The component instance is stored as an `Arc<C>` erased to
//! `Arc<dyn Any + Send + Sync>`. Each exposed service has a projection that
//! turns the component into an `Arc<I>` (where `I` may be a `dyn Trait`), which
//! is itself boxed into an `Arc<dyn Any>` payload so unsized services can be
//! carried through the same type-erased pipeline.

use crate::{
    DiError, Disposable, Injectable, OwnershipPolicy, ResolveContext, Result, ServiceKey,
    SharingPolicy,
};
use ahash::RandomState;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Type-erased component or service payload.
pub(crate) type AnyArc = Arc<dyn Any + Send + Sync>;

type DelegateFn = Arc<dyn Fn(&ResolveContext<'_>) -> Result<AnyArc> + Send + Sync>;
type Projection = Arc<dyn Fn(AnyArc) -> Option<AnyArc> + Send + Sync>;
type PreparingHook = Arc<dyn Fn(&ResolveContext<'_>) -> Result<()> + Send + Sync>;
type ActivatingHook = Arc<dyn Fn(&ResolveContext<'_>, AnyArc) -> Result<AnyArc> + Send + Sync>;
type ActivatedHook = Arc<dyn Fn(&ResolveContext<'_>, &AnyArc) -> Result<()> + Send + Sync>;
type ReleaseHook = Arc<dyn Fn(&AnyArc) + Send + Sync>;

/// Box a service handle into the erased payload form.
#[inline]
pub(crate) fn wrap_service<T: ?Sized + Send + Sync + 'static>(service: Arc<T>) -> AnyArc {
    Arc::new(service)
}

/// Recover a service handle from its erased payload.
#[inline]
pub(crate) fn unwrap_service<T: ?Sized + Send + Sync + 'static>(payload: &AnyArc) -> Result<Arc<T>> {
    payload
        .downcast_ref::<Arc<T>>()
        .cloned()
        .ok_or_else(|| DiError::activation_failed::<T>("resolved instance has an unexpected type"))
}

#[inline]
fn downcast_instance<C: Injectable>(instance: AnyArc) -> Result<Arc<C>> {
    instance
        .downcast::<C>()
        .map_err(|_| DiError::activation_failed::<C>("component instance has an unexpected type"))
}

// =============================================================================
// Registration identity
// =============================================================================

/// Opaque unique token identifying a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistrationId(u64);

impl RegistrationId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    #[inline]
    pub fn id(&self) -> u64 {
        self.0
    }
}

// =============================================================================
// Activator - closed set of ways to produce a component
// =============================================================================

/// How a registration produces its component instance.
///
/// Using an enum keeps the set of activation strategies closed: every
/// registration is either a pre-built instance or a delegate that builds one
/// from a resolve context.
pub(crate) enum Activator {
    /// Pre-created instance handed out as-is
    Instance(AnyArc),
    /// Delegate invoked on every activation
    Delegate(DelegateFn),
}

impl Activator {
    /// Wrap a typed delegate.
    pub(crate) fn delegate<C, F>(activate: F) -> Self
    where
        C: Injectable,
        F: Fn(&ResolveContext<'_>) -> Result<C> + Send + Sync + 'static,
    {
        Self::Delegate(Arc::new(move |ctx: &ResolveContext<'_>| {
            activate(ctx).map(|c| Arc::new(c) as AnyArc)
        }))
    }

    /// Wrap a typed delegate producing an already shared component.
    pub(crate) fn delegate_arc<C, F>(activate: F) -> Self
    where
        C: Injectable,
        F: Fn(&ResolveContext<'_>) -> Result<Arc<C>> + Send + Sync + 'static,
    {
        Self::Delegate(Arc::new(move |ctx: &ResolveContext<'_>| {
            activate(ctx).map(|c| c as AnyArc)
        }))
    }

    /// Wrap a fixed instance.
    pub(crate) fn instance<C: Injectable>(instance: C) -> Self {
        Self::Instance(Arc::new(instance))
    }

    /// Produce the component.
    #[inline]
    pub(crate) fn activate(&self, ctx: &ResolveContext<'_>) -> Result<AnyArc> {
        match self {
            Self::Instance(instance) => Ok(Arc::clone(instance)),
            Self::Delegate(activate) => activate(ctx),
        }
    }
}

// =============================================================================
// Metadata
// =============================================================================

/// A weakly-typed metadata value.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    /// Text
    Str(String),
    /// Integer
    Int(i64),
    /// Floating point
    Float(f64),
    /// Flag
    Bool(bool),
}

impl MetadataValue {
    /// The value as text, if it is text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The value as an integer, if it is one.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// The value as a float, if it is one.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// The value as a flag, if it is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for MetadataValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// String-keyed metadata attached to a registration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    values: HashMap<String, MetadataValue, RandomState>,
}

impl Metadata {
    /// Look up a value.
    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        self.values.get(key)
    }

    /// Look up a text value.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(MetadataValue::as_str)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether there are no entries.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn insert(&mut self, key: String, value: MetadataValue) {
        self.values.insert(key, value);
    }
}

// =============================================================================
// Registration entry
// =============================================================================

#[derive(Default)]
pub(crate) struct Hooks {
    pub(crate) preparing: Vec<PreparingHook>,
    pub(crate) activating: Vec<ActivatingHook>,
    pub(crate) properties: Vec<ActivatedHook>,
    pub(crate) activated: Vec<ActivatedHook>,
    pub(crate) release: Vec<ReleaseHook>,
}

/// Immutable description of how to produce a component.
pub struct RegistrationEntry {
    id: RegistrationId,
    type_name: &'static str,
    pub(crate) activator: Activator,
    self_key: ServiceKey,
    services: Vec<ServiceKey>,
    projections: Vec<(TypeId, Projection)>,
    sharing: SharingPolicy,
    ownership: OwnershipPolicy,
    preserve_existing_defaults: bool,
    pub(crate) hooks: Hooks,
    metadata: HashMap<TypeId, AnyArc, RandomState>,
}

impl RegistrationEntry {
    pub(crate) fn new<C: Injectable>(activator: Activator, sharing: SharingPolicy) -> Self {
        let identity: Projection =
            Arc::new(|instance: AnyArc| instance.downcast::<C>().ok().map(wrap_service));

        Self {
            id: RegistrationId::next(),
            type_name: std::any::type_name::<C>(),
            activator,
            self_key: ServiceKey::of::<C>(),
            services: Vec::new(),
            projections: vec![(TypeId::of::<C>(), identity)],
            sharing,
            ownership: OwnershipPolicy::default(),
            preserve_existing_defaults: false,
            hooks: Hooks::default(),
            metadata: HashMap::default(),
        }
    }

    /// Unique id of this registration.
    #[inline]
    pub fn id(&self) -> RegistrationId {
        self.id
    }

    /// Name of the component type this registration produces.
    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Services this registration is exposed as.
    ///
    /// A registration that was never given an explicit service is exposed
    /// as its own component type.
    #[inline]
    pub fn services(&self) -> &[ServiceKey] {
        if self.services.is_empty() {
            std::slice::from_ref(&self.self_key)
        } else {
            &self.services
        }
    }

    /// Sharing policy.
    #[inline]
    pub fn sharing(&self) -> &SharingPolicy {
        &self.sharing
    }

    /// Ownership policy.
    #[inline]
    pub fn ownership(&self) -> OwnershipPolicy {
        self.ownership
    }

    /// Whether this registration refuses to displace an existing default.
    #[inline]
    pub fn preserves_existing_defaults(&self) -> bool {
        self.preserve_existing_defaults
    }

    /// Typed metadata of type `M`, if attached.
    pub fn metadata_of<M: Send + Sync + 'static>(&self) -> Option<Arc<M>> {
        self.metadata
            .get(&TypeId::of::<M>())
            .and_then(|m| Arc::clone(m).downcast::<M>().ok())
    }

    /// Weakly-typed metadata (empty if none was attached).
    pub fn metadata(&self) -> Arc<Metadata> {
        self.metadata_of::<Metadata>().unwrap_or_default()
    }

    /// Project the component instance to the requested service.
    pub(crate) fn project(&self, key: &ServiceKey, instance: AnyArc) -> Result<AnyArc> {
        self.projections
            .iter()
            .find(|(type_id, _)| *type_id == key.type_id())
            .and_then(|(_, project)| project(instance))
            .ok_or_else(|| DiError::ActivationFailed {
                service: key.to_string(),
                reason: format!("{} is not exposed as this service", self.type_name),
            })
    }

    /// Whether the container must run anything when releasing an instance.
    #[inline]
    pub(crate) fn has_release_hooks(&self) -> bool {
        self.ownership == OwnershipPolicy::OwnedByScope && !self.hooks.release.is_empty()
    }

    /// Run the release hooks for one instance.
    pub(crate) fn release(&self, instance: &AnyArc) {
        for hook in &self.hooks.release {
            hook(instance);
        }
    }

    fn expose(&mut self, key: ServiceKey, type_id: TypeId, projection: Projection) {
        if !self.projections.iter().any(|(t, _)| *t == type_id) {
            self.projections.push((type_id, projection));
        }
        if !self.services.contains(&key) {
            self.services.push(key);
        }
    }
}

impl fmt::Debug for RegistrationEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationEntry")
            .field("id", &self.id)
            .field("type_name", &self.type_name)
            .field("services", &self.services())
            .field("sharing", &self.sharing)
            .field("ownership", &self.ownership)
            .field("preserve_existing_defaults", &self.preserve_existing_defaults)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Fluent builder
// =============================================================================

/// Configures one registration of component `C`.
///
/// Returned by the `register*` methods of
/// [`ContainerBuilder`](crate::ContainerBuilder); every method applies to the
/// registration immediately, so the builder can simply be dropped.
pub struct RegistrationBuilder<'a, C: Injectable> {
    entry: &'a mut RegistrationEntry,
    _component: PhantomData<fn() -> C>,
}

impl<'a, C: Injectable> RegistrationBuilder<'a, C> {
    pub(crate) fn new(entry: &'a mut RegistrationEntry) -> Self {
        Self {
            entry,
            _component: PhantomData,
        }
    }

    /// Expose the component as service `I`.
    ///
    /// `cast` converts the component handle, typically an unsizing coercion
    /// such as `|c| c as Arc<dyn Log>`.
    pub fn as_service<I, F>(self, cast: F) -> Self
    where
        I: ?Sized + Send + Sync + 'static,
        F: Fn(Arc<C>) -> Arc<I> + Send + Sync + 'static,
    {
        let projection = Self::projection(cast);
        self.entry
            .expose(ServiceKey::of::<I>(), TypeId::of::<I>(), projection);
        self
    }

    /// Expose the component as its own type (in addition to other services).
    pub fn as_self(self) -> Self {
        self.as_service::<C, _>(|c| c)
    }

    /// Expose the component as service `I` under a string name.
    pub fn named<I, F>(self, name: impl Into<String>, cast: F) -> Self
    where
        I: ?Sized + Send + Sync + 'static,
        F: Fn(Arc<C>) -> Arc<I> + Send + Sync + 'static,
    {
        let projection = Self::projection(cast);
        self.entry
            .expose(ServiceKey::named::<I>(name), TypeId::of::<I>(), projection);
        self
    }

    /// Expose the component as service `I` under an arbitrary key.
    pub fn keyed<I, K, F>(self, key: K, cast: F) -> Self
    where
        I: ?Sized + Send + Sync + 'static,
        K: Hash + Eq + fmt::Debug + Send + Sync + 'static,
        F: Fn(Arc<C>) -> Arc<I> + Send + Sync + 'static,
    {
        let projection = Self::projection(cast);
        self.entry
            .expose(ServiceKey::keyed::<I, K>(key), TypeId::of::<I>(), projection);
        self
    }

    /// One instance for the whole container.
    pub fn single_instance(self) -> Self {
        self.entry.sharing = SharingPolicy::SingleInstance;
        self
    }

    /// One instance per lifetime scope.
    pub fn instance_per_lifetime_scope(self) -> Self {
        self.entry.sharing = SharingPolicy::PerLifetimeScope;
        self
    }

    /// One instance per nearest scope tagged `tag`.
    pub fn instance_per_matching_lifetime_scope(self, tag: impl Into<String>) -> Self {
        self.entry.sharing = SharingPolicy::PerMatchingScope(tag.into());
        self
    }

    /// A new instance for every resolution (the default).
    pub fn instance_per_dependency(self) -> Self {
        self.entry.sharing = SharingPolicy::None;
        self
    }

    /// The container never releases instances of this registration.
    pub fn externally_owned(self) -> Self {
        self.entry.ownership = OwnershipPolicy::ExternallyOwned;
        self
    }

    /// The owning scope releases instances (the default).
    pub fn owned_by_lifetime_scope(self) -> Self {
        self.entry.ownership = OwnershipPolicy::OwnedByScope;
        self
    }

    /// Do not displace an existing default registration for the same services.
    ///
    /// The default is pinned: later registrations of those services do not
    /// displace it either.
    pub fn preserve_existing_defaults(self) -> Self {
        self.entry.preserve_existing_defaults = true;
        self
    }

    /// Attach strongly-typed metadata, readable through `Meta<T, M>`.
    pub fn with_metadata<M: Send + Sync + 'static>(self, metadata: M) -> Self {
        self.entry
            .metadata
            .insert(TypeId::of::<M>(), Arc::new(metadata));
        self
    }

    /// Attach one weakly-typed metadata value, readable through `Meta<T>`.
    pub fn with_metadata_value(self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        let mut map = (*self.entry.metadata()).clone();
        map.insert(key.into(), value.into());
        self.with_metadata(map)
    }

    /// Run `hook` before the activator.
    pub fn on_preparing<F>(self, hook: F) -> Self
    where
        F: Fn(&ResolveContext<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.entry.hooks.preparing.push(Arc::new(hook));
        self
    }

    /// Run `hook` right after the activator; it may replace the instance.
    pub fn on_activating<F>(self, hook: F) -> Self
    where
        F: Fn(&ResolveContext<'_>, Arc<C>) -> Result<Arc<C>> + Send + Sync + 'static,
    {
        self.entry.hooks.activating.push(Arc::new(move |ctx: &ResolveContext<'_>, instance: AnyArc| {
            let component = downcast_instance::<C>(instance)?;
            hook(ctx, component).map(|c| c as AnyArc)
        }));
        self
    }

    /// Run `hook` once the instance is fully constructed and wired.
    pub fn on_activated<F>(self, hook: F) -> Self
    where
        F: Fn(&ResolveContext<'_>, &Arc<C>) -> Result<()> + Send + Sync + 'static,
    {
        self.entry.hooks.activated.push(Self::erase_activated(hook));
        self
    }

    /// Wire properties after construction.
    ///
    /// While `wire` runs, resolutions that come back around to this same
    /// registration receive the already constructed instance instead of
    /// failing with a circular dependency. This exception only exists for
    /// property wiring; constructor cycles are always rejected.
    pub fn properties_autowired<F>(self, wire: F) -> Self
    where
        F: Fn(&ResolveContext<'_>, &Arc<C>) -> Result<()> + Send + Sync + 'static,
    {
        self.entry.hooks.properties.push(Self::erase_activated(wire));
        self
    }

    /// Run `hook` when the owning scope releases the instance.
    pub fn on_release<F>(self, hook: F) -> Self
    where
        F: Fn(&Arc<C>) + Send + Sync + 'static,
    {
        self.entry.hooks.release.push(Arc::new(move |instance: &AnyArc| {
            if let Ok(component) = Arc::clone(instance).downcast::<C>() {
                hook(&component);
            }
        }));
        self
    }

    /// The id assigned to this registration.
    pub fn id(&self) -> RegistrationId {
        self.entry.id
    }

    fn projection<I, F>(cast: F) -> Projection
    where
        I: ?Sized + Send + Sync + 'static,
        F: Fn(Arc<C>) -> Arc<I> + Send + Sync + 'static,
    {
        Arc::new(move |instance: AnyArc| {
            instance
                .downcast::<C>()
                .ok()
                .map(|component| wrap_service(cast(component)))
        })
    }

    fn erase_activated<F>(hook: F) -> ActivatedHook
    where
        F: Fn(&ResolveContext<'_>, &Arc<C>) -> Result<()> + Send + Sync + 'static,
    {
        Arc::new(move |ctx: &ResolveContext<'_>, instance: &AnyArc| {
            let component = downcast_instance::<C>(Arc::clone(instance))?;
            hook(ctx, &component)
        })
    }
}

impl<C: Injectable + Disposable> RegistrationBuilder<'_, C> {
    /// Call [`Disposable::dispose`] when the owning scope releases the instance.
    pub fn disposable(self) -> Self {
        self.on_release(|component: &Arc<C>| component.dispose())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Log: Send + Sync {
        fn name(&self) -> &'static str;
    }

    struct ConsoleLog;

    impl Log for ConsoleLog {
        fn name(&self) -> &'static str {
            "console"
        }
    }

    fn entry() -> RegistrationEntry {
        RegistrationEntry::new::<ConsoleLog>(Activator::instance(ConsoleLog), SharingPolicy::None)
    }

    #[test]
    fn test_self_service_by_default() {
        let entry = entry();
        assert_eq!(entry.services(), &[ServiceKey::of::<ConsoleLog>()]);
    }

    #[test]
    fn test_as_service_replaces_self_exposure() {
        let mut entry = entry();
        RegistrationBuilder::<ConsoleLog>::new(&mut entry).as_service(|c| c as Arc<dyn Log>);
        assert_eq!(entry.services(), &[ServiceKey::of::<dyn Log>()]);

        RegistrationBuilder::<ConsoleLog>::new(&mut entry).as_self();
        assert_eq!(entry.services().len(), 2);
    }

    #[test]
    fn test_projection_to_trait_object() {
        let mut entry = entry();
        RegistrationBuilder::<ConsoleLog>::new(&mut entry)
            .named("console", |c| c as Arc<dyn Log>);

        let instance: AnyArc = Arc::new(ConsoleLog);
        let payload = entry
            .project(&ServiceKey::named::<dyn Log>("console"), instance)
            .unwrap();
        let log = unwrap_service::<dyn Log>(&payload).unwrap();
        assert_eq!(log.name(), "console");
    }

    #[test]
    fn test_projection_to_unexposed_service_fails() {
        let entry = entry();
        let instance: AnyArc = Arc::new(ConsoleLog);
        let err = entry.project(&ServiceKey::of::<dyn Log>(), instance).unwrap_err();
        assert!(matches!(err, DiError::ActivationFailed { .. }));
    }

    #[test]
    fn test_metadata() {
        #[derive(Debug, PartialEq)]
        struct Setting {
            log_mode: &'static str,
        }

        let mut entry = entry();
        RegistrationBuilder::<ConsoleLog>::new(&mut entry)
            .with_metadata(Setting { log_mode: "verbose" })
            .with_metadata_value("Name", "Save")
            .with_metadata_value("Age", 100);

        assert_eq!(
            entry.metadata_of::<Setting>().as_deref(),
            Some(&Setting { log_mode: "verbose" })
        );
        let map = entry.metadata();
        assert_eq!(map.get_str("Name"), Some("Save"));
        assert_eq!(map.get("Age").and_then(MetadataValue::as_int), Some(100));
        assert!(entry.metadata_of::<u8>().is_none());
    }

    #[test]
    fn test_release_hooks_respect_ownership() {
        let mut entry = entry();
        RegistrationBuilder::<ConsoleLog>::new(&mut entry).on_release(|_| {});
        assert!(entry.has_release_hooks());

        RegistrationBuilder::<ConsoleLog>::new(&mut entry).externally_owned();
        assert!(!entry.has_release_hooks());
    }

    #[test]
    fn test_ids_unique() {
        assert_ne!(entry().id(), entry().id());
    }
}
