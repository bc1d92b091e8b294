//! Resolution algorithm
//!
//! Every request runs the same pipeline: find the default registration,
//! check the in-flight chain for cycles, pick the owning scope, reuse or
//! create the instance, then wrap it in any decorators registered for the
//! requested service.
//!
//! The in-flight chain is thread-local. Nested resolutions made on the same
//! thread (including those made through adapters such as `Func` while an
//! activation is still running) see the registrations that are still being
//! constructed, so a cycle is reported before a constructor runs twice.
//! Other threads do not see this chain: a cycle through shared registrations
//! activated concurrently from two threads waits on the instance cell
//! instead of being reported.

use crate::registration::{AnyArc, RegistrationEntry, RegistrationId, unwrap_service};
use crate::{
    DiError, LifetimeScope, Parameters, Resolvable, Result, ServiceKey, SharingPolicy,
    parameter::NO_PARAMETERS,
};
use std::cell::RefCell;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::{debug, trace};

// =============================================================================
// In-flight chain
// =============================================================================

struct Frame {
    registration: RegistrationId,
    service: String,
    /// Set while the registration's properties are being wired
    wiring: Option<AnyArc>,
}

thread_local! {
    static CHAIN: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

enum Entered {
    /// The registration is now in flight
    Fresh(FrameGuard),
    /// The registration is wiring properties; hand back its instance
    Wiring(AnyArc),
}

/// Pops the frame pushed by [`enter`] when the activation ends, success or not.
struct FrameGuard {
    index: usize,
}

impl FrameGuard {
    fn wiring(&self, instance: Option<AnyArc>) {
        CHAIN.with(|chain| {
            if let Some(frame) = chain.borrow_mut().get_mut(self.index) {
                frame.wiring = instance;
            }
        });
    }
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        CHAIN.with(|chain| chain.borrow_mut().truncate(self.index));
    }
}

fn enter(entry: &RegistrationEntry, key: &ServiceKey) -> Result<Entered> {
    CHAIN.with(|chain| {
        let mut frames = chain.borrow_mut();
        if let Some(frame) = frames.iter().find(|f| f.registration == entry.id()) {
            if let Some(instance) = &frame.wiring {
                return Ok(Entered::Wiring(Arc::clone(instance)));
            }

            let mut cycle: Vec<String> = frames.iter().map(|f| f.service.clone()).collect();
            cycle.push(key.to_string());

            #[cfg(feature = "logging")]
            debug!(
                target: "lifetime_di",
                service = %key,
                depth = frames.len(),
                "Circular dependency detected"
            );

            return Err(DiError::CircularDependency { chain: cycle });
        }

        frames.push(Frame {
            registration: entry.id(),
            service: key.to_string(),
            wiring: None,
        });
        Ok(Entered::Fresh(FrameGuard {
            index: frames.len() - 1,
        }))
    })
}

// =============================================================================
// Resolve context
// =============================================================================

/// Handle passed to activation delegates, hooks and decorators.
///
/// Resolutions made through the context run in the scope that owns the
/// instance being built. Explicit parameters are readable here but are not
/// passed on to nested resolutions.
pub struct ResolveContext<'a> {
    scope: &'a LifetimeScope,
    parameters: &'a Parameters,
    /// Whether `parameters` belong to the next resolution (top-level requests)
    forward: bool,
}

impl<'a> ResolveContext<'a> {
    pub(crate) fn request(scope: &'a LifetimeScope, parameters: &'a Parameters) -> Self {
        Self {
            scope,
            parameters,
            forward: true,
        }
    }

    fn activation(scope: &'a LifetimeScope, parameters: &'a Parameters) -> Self {
        Self {
            scope,
            parameters,
            forward: false,
        }
    }

    /// The scope resolutions run in.
    #[inline]
    pub fn scope(&self) -> &'a LifetimeScope {
        self.scope
    }

    /// Explicit parameters supplied for the current activation.
    #[inline]
    pub fn parameters(&self) -> &Parameters {
        self.parameters
    }

    /// Parameters that belong to the next resolution made through this context.
    #[inline]
    pub(crate) fn request_parameters(&self) -> &'a Parameters {
        if self.forward {
            self.parameters
        } else {
            &NO_PARAMETERS
        }
    }

    /// Required parameter, looked up by name, then by type.
    pub fn parameter<V: Clone + 'static>(&self, name: &str) -> Result<V> {
        self.parameters
            .find(Some(name), None)
            .ok_or_else(|| DiError::missing_parameter(name))
    }

    /// Named parameter, if supplied.
    pub fn named_parameter<V: Clone + 'static>(&self, name: &str) -> Option<V> {
        self.parameters.find_named(name)
    }

    /// Typed parameter, if supplied.
    pub fn typed_parameter<V: Clone + 'static>(&self) -> Option<V> {
        self.parameters.find_typed()
    }

    /// Positional parameter, if supplied.
    pub fn positional_parameter<V: Clone + 'static>(&self, position: usize) -> Option<V> {
        self.parameters.find_positional(position)
    }

    /// Resolve the default `T`.
    pub fn get<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        self.get_service(&ServiceKey::of::<T>())
    }

    /// Resolve `T` registered under `name`.
    pub fn get_named<T: ?Sized + Send + Sync + 'static>(&self, name: impl Into<String>) -> Result<Arc<T>> {
        self.get_service(&ServiceKey::named::<T>(name))
    }

    /// Resolve `T` registered under `key`.
    pub fn get_keyed<T, K>(&self, key: K) -> Result<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
        K: Hash + Eq + fmt::Debug + Send + Sync + 'static,
    {
        self.get_service(&ServiceKey::keyed::<T, K>(key))
    }

    /// Resolve `T`, returning `None` when nothing is registered for it.
    pub fn try_get<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Option<Arc<T>>> {
        let key = ServiceKey::of::<T>();
        self.scope.ensure_active()?;
        if !self.scope.is_registered(&key) {
            return Ok(None);
        }
        self.get_service(&key).map(Some)
    }

    /// Resolve `T` under an explicit service key.
    ///
    /// The key's type must be `T`.
    pub fn get_service<T: ?Sized + Send + Sync + 'static>(&self, key: &ServiceKey) -> Result<Arc<T>> {
        let payload = resolve_service(self.scope, key, self.request_parameters())?;
        unwrap_service::<T>(&payload)
    }

    /// Resolve any [`Resolvable`] shape (adapters, collections, tuples).
    pub fn resolve<R: Resolvable>(&self) -> Result<R> {
        let nested = ResolveContext::request(self.scope, self.request_parameters());
        R::resolve(&nested)
    }

    /// Resolve with explicit parameters for the directly requested registration.
    pub fn resolve_with<R: Resolvable>(&self, parameters: &Parameters) -> Result<R> {
        R::resolve(&ResolveContext::request(self.scope, parameters))
    }
}

impl fmt::Debug for ResolveContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolveContext")
            .field("scope", &self.scope.id())
            .field("parameters", &self.parameters.len())
            .finish()
    }
}

// =============================================================================
// Pipeline
// =============================================================================

/// Resolve the default registration of `key` and return the service payload.
pub(crate) fn resolve_service(
    scope: &LifetimeScope,
    key: &ServiceKey,
    parameters: &Parameters,
) -> Result<AnyArc> {
    scope.ensure_active()?;
    let entry = scope
        .registry()
        .default_for(key)
        .ok_or_else(|| DiError::not_registered(key))?;
    resolve_entry(scope, entry, key, parameters)
}

/// Resolve one specific registration as `key` and return the service payload.
pub(crate) fn resolve_entry(
    scope: &LifetimeScope,
    entry: &Arc<RegistrationEntry>,
    key: &ServiceKey,
    parameters: &Parameters,
) -> Result<AnyArc> {
    scope.ensure_active()?;

    let guard = match enter(entry, key)? {
        Entered::Fresh(guard) => guard,
        Entered::Wiring(instance) => {
            #[cfg(feature = "logging")]
            trace!(
                target: "lifetime_di",
                service = %key,
                "Returning instance that is still wiring properties"
            );
            return entry.project(key, instance);
        }
    };

    let instance = instance_for(scope, entry, key, parameters, &guard)?;
    drop(guard);

    let payload = entry.project(key, instance)?;
    decorate(scope, key, payload)
}

fn instance_for(
    scope: &LifetimeScope,
    entry: &Arc<RegistrationEntry>,
    key: &ServiceKey,
    parameters: &Parameters,
    guard: &FrameGuard,
) -> Result<AnyArc> {
    let owner = match entry.sharing() {
        SharingPolicy::None => return activate(scope, entry, key, parameters, guard),
        SharingPolicy::SingleInstance => scope.root()?,
        SharingPolicy::PerLifetimeScope => scope.clone(),
        SharingPolicy::PerMatchingScope(tag) => {
            scope
                .find_tagged(tag)
                .ok_or_else(|| DiError::NoMatchingScopeFound {
                    tag: tag.clone(),
                    service: key.to_string(),
                })?
        }
    };

    let cell = owner.instance_cell(entry.id())?;
    if let Some(instance) = cell.get() {
        owner.ensure_active()?;
        #[cfg(feature = "logging")]
        trace!(
            target: "lifetime_di",
            service = %key,
            scope = owner.id().id(),
            "Resolved shared instance from cache"
        );
        return Ok(Arc::clone(instance));
    }

    let instance = cell
        .get_or_try_init(|| activate(&owner, entry, key, parameters, guard))
        .map(Arc::clone)?;
    owner.confirm_cached(entry.id())?;
    Ok(instance)
}

fn activate(
    owner: &LifetimeScope,
    entry: &Arc<RegistrationEntry>,
    key: &ServiceKey,
    parameters: &Parameters,
    guard: &FrameGuard,
) -> Result<AnyArc> {
    let ctx = ResolveContext::activation(owner, parameters);
    let attribute = |e: DiError| e.attribute_to(key);

    for hook in &entry.hooks.preparing {
        hook(&ctx).map_err(attribute)?;
    }

    let mut instance = entry.activator.activate(&ctx).map_err(attribute)?;

    for hook in &entry.hooks.activating {
        instance = hook(&ctx, instance).map_err(attribute)?;
    }

    if !entry.hooks.properties.is_empty() {
        guard.wiring(Some(Arc::clone(&instance)));
        for wire in &entry.hooks.properties {
            wire(&ctx, &instance).map_err(attribute)?;
        }
        guard.wiring(None);
    }

    for hook in &entry.hooks.activated {
        hook(&ctx, &instance).map_err(attribute)?;
    }

    if entry.has_release_hooks() {
        owner.track(Arc::clone(entry), Arc::clone(&instance))?;
    }

    #[cfg(feature = "logging")]
    debug!(
        target: "lifetime_di",
        service = %key,
        component = entry.type_name(),
        scope = owner.id().id(),
        "Activated component"
    );

    Ok(instance)
}

fn decorate(scope: &LifetimeScope, key: &ServiceKey, payload: AnyArc) -> Result<AnyArc> {
    let decorators = scope.registry().decorators_for(key.type_id());
    if decorators.is_empty() {
        return Ok(payload);
    }

    let ctx = ResolveContext::activation(scope, &NO_PARAMETERS);
    decorators.iter().try_fold(payload, |payload, decorator| {
        decorator
            .apply(&ctx, payload)
            .map_err(|e| e.attribute_to(key))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ContainerBuilder;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct A;
    struct B;

    #[test]
    fn test_constructor_cycle_is_reported_with_chain() {
        let mut builder = ContainerBuilder::new();
        builder.register(|ctx| {
            ctx.get::<B>()?;
            Ok(A)
        });
        builder.register(|ctx| {
            ctx.get::<A>()?;
            Ok(B)
        });
        let container = builder.build();

        match container.get::<A>() {
            Err(DiError::CircularDependency { chain }) => {
                assert_eq!(chain.len(), 3);
                assert!(chain[0].ends_with("A"));
                assert!(chain[1].ends_with("B"));
                assert!(chain[2].ends_with("A"));
            }
            other => panic!("expected a cycle, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_chain_is_cleared_after_failure() {
        let mut builder = ContainerBuilder::new();
        builder.register(|ctx| {
            ctx.get::<A>()?;
            Ok(A)
        });
        builder.register(|_| Ok(B));
        let container = builder.build();

        assert!(container.get::<A>().is_err());
        CHAIN.with(|chain| assert!(chain.borrow().is_empty()));
        assert!(container.get::<B>().is_ok());
    }

    #[test]
    fn test_parameters_apply_only_to_requested_registration() {
        struct Inner(Option<i32>);
        struct Outer(i32, Arc<Inner>);

        let mut builder = ContainerBuilder::new();
        builder.register(|ctx| Ok(Inner(ctx.typed_parameter::<i32>())));
        builder.register(|ctx| Ok(Outer(ctx.parameter::<i32>("value")?, ctx.get::<Inner>()?)));
        let container = builder.build();

        let outer = container
            .get_with::<Outer>(&Parameters::new().named("value", 7_i32))
            .unwrap();
        assert_eq!(outer.0, 7);
        assert_eq!(outer.1.0, None);
    }

    #[test]
    fn test_missing_parameter_names_service() {
        let mut builder = ContainerBuilder::new();
        builder.register(|ctx| {
            ctx.parameter::<String>("name")?;
            Ok(A)
        });
        let container = builder.build();

        match container.get::<A>() {
            Err(DiError::MissingParameter { service, parameter }) => {
                assert!(service.ends_with("A"));
                assert_eq!(parameter, "name");
            }
            other => panic!("expected missing parameter, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_failed_shared_activation_is_not_cached() {
        static ATTEMPTS: AtomicUsize = AtomicUsize::new(0);

        let mut builder = ContainerBuilder::new();
        builder
            .register(|_| {
                if ATTEMPTS.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(DiError::failed("first attempt"))
                } else {
                    Ok(A)
                }
            })
            .single_instance();
        let container = builder.build();

        assert!(matches!(
            container.get::<A>(),
            Err(DiError::ActivationFailed { .. })
        ));
        let first = container.get::<A>().unwrap();
        let second = container.get::<A>().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(ATTEMPTS.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_nested_errors_propagate_unchanged() {
        let mut builder = ContainerBuilder::new();
        builder.register(|ctx| ctx.get::<B>().map(|_| A));
        let container = builder.build();

        assert!(matches!(
            container.get::<A>(),
            Err(DiError::NotRegistered { service }) if service.ends_with("B")
        ));
    }
}
