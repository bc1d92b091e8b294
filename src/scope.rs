//! Lifetime scopes
//!
//! Scopes form a tree rooted at the container. Each scope owns a cache of
//! shared instances and the release actions of everything it activated.
//! Disposing a scope disposes its live children first, then releases its own
//! instances in reverse creation order.

use crate::registration::{AnyArc, RegistrationEntry, RegistrationId};
use crate::resolver::ResolveContext;
use crate::{DiError, Parameters, Registry, Resolvable, Result, ServiceKey, parameter::NO_PARAMETERS};
use ahash::RandomState;
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

#[cfg(feature = "logging")]
use tracing::debug;

/// Components that release resources when their owning scope is disposed.
///
/// Register with [`RegistrationBuilder::disposable`](crate::RegistrationBuilder::disposable)
/// to have the scope call [`dispose`](Disposable::dispose).
pub trait Disposable: Send + Sync {
    /// Release resources. Called at most once per tracked instance.
    fn dispose(&self);
}

/// Unique scope identifier.
///
/// Each scope gets a unique ID for tracking and debugging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(u64);

impl ScopeId {
    #[inline]
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

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope-{}", self.0)
    }
}

type Disposer = Box<dyn FnOnce() + Send>;

pub(crate) struct ScopeInner {
    id: ScopeId,
    tag: Option<String>,
    depth: u32,
    registry: Arc<Registry>,
    parent: Option<Weak<ScopeInner>>,
    children: DashMap<u64, Weak<ScopeInner>, RandomState>,
    instances: DashMap<RegistrationId, Arc<OnceCell<AnyArc>>, RandomState>,
    disposers: Mutex<Vec<Disposer>>,
    disposed: AtomicBool,
}

impl ScopeInner {
    fn dispose(&self) {
        let disposers = {
            let mut disposers = self.disposers.lock();
            if self.disposed.swap(true, Ordering::AcqRel) {
                return;
            }
            std::mem::take(&mut *disposers)
        };

        #[cfg(feature = "logging")]
        debug!(
            target: "lifetime_di",
            scope = self.id.0,
            tag = self.tag.as_deref(),
            children = self.children.len(),
            tracked = disposers.len(),
            "Disposing lifetime scope"
        );

        let mut children: Vec<(u64, Weak<ScopeInner>)> = self
            .children
            .iter()
            .map(|child| (*child.key(), child.value().clone()))
            .collect();
        self.children.clear();

        // Newest child first
        children.sort_unstable_by(|a, b| b.0.cmp(&a.0));
        for (_, child) in children {
            if let Some(child) = child.upgrade() {
                child.dispose();
            }
        }

        for dispose in disposers.into_iter().rev() {
            dispose();
        }

        self.instances.clear();

        if let Some(parent) = self.parent.as_ref().and_then(Weak::upgrade) {
            parent.children.remove(&self.id.0);
        }
    }
}

impl Drop for ScopeInner {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// A node in the lifetime-scope tree.
///
/// Cloning the handle shares the same scope. The scope is disposed by an
/// explicit [`dispose`](Self::dispose) or when its last handle is dropped.
/// A child does not keep its parent alive: disposing or dropping the parent
/// disposes every live child.
///
/// # Examples
///
/// ```rust
/// use lifetime_di::ContainerBuilder;
/// use std::sync::Arc;
///
/// struct UnitOfWork;
///
/// let mut builder = ContainerBuilder::new();
/// builder.register(|_| Ok(UnitOfWork)).instance_per_lifetime_scope();
/// let container = builder.build();
///
/// let request = container.begin_scope().unwrap();
/// let a = request.get::<UnitOfWork>().unwrap();
/// let b = request.get::<UnitOfWork>().unwrap();
/// assert!(Arc::ptr_eq(&a, &b));
///
/// let other = container.begin_scope().unwrap();
/// assert!(!Arc::ptr_eq(&a, &other.get::<UnitOfWork>().unwrap()));
/// ```
#[derive(Clone)]
pub struct LifetimeScope {
    inner: Arc<ScopeInner>,
}

impl LifetimeScope {
    pub(crate) fn new_root(registry: Arc<Registry>) -> Self {
        let id = ScopeId::next();

        #[cfg(feature = "logging")]
        debug!(
            target: "lifetime_di",
            scope = id.0,
            registrations = registry.len(),
            "Creating root lifetime scope"
        );

        Self {
            inner: Arc::new(ScopeInner {
                id,
                tag: None,
                depth: 0,
                registry,
                parent: None,
                children: DashMap::with_hasher(RandomState::new()),
                instances: DashMap::with_hasher(RandomState::new()),
                disposers: Mutex::new(Vec::new()),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    fn child(&self, tag: Option<String>) -> Result<Self> {
        self.ensure_active()?;

        let id = ScopeId::next();
        let depth = self.inner.depth + 1;

        #[cfg(feature = "logging")]
        debug!(
            target: "lifetime_di",
            scope = id.0,
            parent = self.inner.id.0,
            tag = tag.as_deref(),
            depth = depth,
            "Beginning lifetime scope"
        );

        let child = Self {
            inner: Arc::new(ScopeInner {
                id,
                tag,
                depth,
                registry: Arc::clone(&self.inner.registry),
                parent: Some(Arc::downgrade(&self.inner)),
                children: DashMap::with_hasher(RandomState::new()),
                instances: DashMap::with_hasher(RandomState::new()),
                disposers: Mutex::new(Vec::new()),
                disposed: AtomicBool::new(false),
            }),
        };
        self.inner
            .children
            .insert(id.0, Arc::downgrade(&child.inner));

        // Disposal may have started while the child was being attached
        if self.is_disposed() {
            child.dispose();
            return Err(DiError::ScopeDisposed);
        }
        Ok(child)
    }

    /// Begin an untagged child scope.
    #[inline]
    pub fn begin_scope(&self) -> Result<Self> {
        self.child(None)
    }

    /// Begin a child scope carrying `tag`.
    #[inline]
    pub fn begin_tagged_scope(&self, tag: impl Into<String>) -> Result<Self> {
        self.child(Some(tag.into()))
    }

    /// Dispose this scope and everything it owns. Idempotent.
    #[inline]
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    /// Whether disposal has started.
    #[inline]
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// Scope identifier.
    #[inline]
    pub fn id(&self) -> ScopeId {
        self.inner.id
    }

    /// Tag given at creation, if any.
    #[inline]
    pub fn tag(&self) -> Option<&str> {
        self.inner.tag.as_deref()
    }

    /// Distance from the root (the root is 0).
    #[inline]
    pub fn depth(&self) -> u32 {
        self.inner.depth
    }

    /// The parent scope, if this is not the root and the parent is alive.
    pub fn parent(&self) -> Option<Self> {
        self.inner
            .parent
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|inner| Self { inner })
    }

    /// Number of live child scopes.
    pub fn child_count(&self) -> usize {
        self.inner.children.len()
    }

    /// The registry shared by the whole tree.
    #[inline]
    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// Whether anything is registered under `key`.
    #[inline]
    pub fn is_registered(&self, key: &ServiceKey) -> bool {
        self.inner.registry.is_registered(key)
    }

    /// Whether a default `T` is registered.
    #[inline]
    pub fn contains<T: ?Sized + 'static>(&self) -> bool {
        self.is_registered(&ServiceKey::of::<T>())
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    /// Resolve the default `T`.
    ///
    /// `T` may be a concrete type or a `dyn Trait` service.
    #[inline]
    pub fn get<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        ResolveContext::request(self, &NO_PARAMETERS).get::<T>()
    }

    /// Resolve `T` with explicit parameters for its own activation.
    #[inline]
    pub fn get_with<T: ?Sized + Send + Sync + 'static>(&self, parameters: &Parameters) -> Result<Arc<T>> {
        ResolveContext::request(self, parameters).get::<T>()
    }

    /// Resolve `T` registered under `name`.
    #[inline]
    pub fn get_named<T: ?Sized + Send + Sync + 'static>(&self, name: impl Into<String>) -> Result<Arc<T>> {
        ResolveContext::request(self, &NO_PARAMETERS).get_named::<T>(name)
    }

    /// Resolve `T` registered under `key`.
    #[inline]
    pub fn get_keyed<T, K>(&self, key: K) -> Result<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
        K: Hash + Eq + fmt::Debug + Send + Sync + 'static,
    {
        ResolveContext::request(self, &NO_PARAMETERS).get_keyed::<T, K>(key)
    }

    /// Resolve `T`, returning `Ok(None)` when it is not registered.
    ///
    /// Other failures (including unregistered nested dependencies) are
    /// still reported as errors.
    #[inline]
    pub fn try_get<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Option<Arc<T>>> {
        ResolveContext::request(self, &NO_PARAMETERS).try_get::<T>()
    }

    /// Resolve any [`Resolvable`] shape, such as `Lazy<T>` or `Vec<Arc<T>>`.
    #[inline]
    pub fn resolve<R: Resolvable>(&self) -> Result<R> {
        R::resolve(&ResolveContext::request(self, &NO_PARAMETERS))
    }

    /// Resolve any [`Resolvable`] shape with explicit parameters.
    #[inline]
    pub fn resolve_with<R: Resolvable>(&self, parameters: &Parameters) -> Result<R> {
        R::resolve(&ResolveContext::request(self, parameters))
    }

    // =========================================================================
    // Resolver support
    // =========================================================================

    pub(crate) fn ensure_active(&self) -> Result<()> {
        if self.is_disposed() {
            Err(DiError::ScopeDisposed)
        } else {
            Ok(())
        }
    }

    /// The root scope. Fails once any ancestor is gone.
    pub(crate) fn root(&self) -> Result<Self> {
        let mut inner = Arc::clone(&self.inner);
        loop {
            let parent = match &inner.parent {
                Some(parent) => parent.upgrade().ok_or(DiError::ScopeDisposed)?,
                None => return Ok(Self { inner }),
            };
            inner = parent;
        }
    }

    /// Nearest live ancestor-or-self carrying `tag`.
    pub(crate) fn find_tagged(&self, tag: &str) -> Option<Self> {
        let mut current = Some(Arc::clone(&self.inner));
        while let Some(inner) = current {
            if inner.tag.as_deref() == Some(tag) {
                return Some(Self { inner });
            }
            current = inner.parent.as_ref().and_then(Weak::upgrade);
        }
        None
    }

    /// The once-cell caching the shared instance of a registration.
    pub(crate) fn instance_cell(&self, id: RegistrationId) -> Result<Arc<OnceCell<AnyArc>>> {
        self.ensure_active()?;
        // Clone out of the map so no shard lock is held during activation
        let cell = Arc::clone(
            self.inner
                .instances
                .entry(id)
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .value(),
        );
        Ok(cell)
    }

    /// Confirm a shared instance was cached before disposal began.
    ///
    /// Disposal clears the cache after setting the disposed flag, so a cell
    /// filled after that point is dropped here instead of outliving the
    /// scope.
    pub(crate) fn confirm_cached(&self, id: RegistrationId) -> Result<()> {
        if self.is_disposed() {
            self.inner.instances.remove(&id);
            return Err(DiError::ScopeDisposed);
        }
        Ok(())
    }

    /// Record the release action for an activated instance.
    ///
    /// If disposal already started, the instance is released right away.
    pub(crate) fn track(&self, entry: Arc<RegistrationEntry>, instance: AnyArc) -> Result<()> {
        let mut disposers = self.inner.disposers.lock();
        if self.is_disposed() {
            drop(disposers);
            entry.release(&instance);
            return Err(DiError::ScopeDisposed);
        }
        disposers.push(Box::new(move || entry.release(&instance)));
        Ok(())
    }

    pub(crate) fn downgrade(&self) -> WeakScope {
        WeakScope(Arc::downgrade(&self.inner))
    }
}

impl fmt::Debug for LifetimeScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifetimeScope")
            .field("id", &self.inner.id)
            .field("tag", &self.inner.tag)
            .field("depth", &self.inner.depth)
            .field("children", &self.inner.children.len())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Non-owning handle captured by adapters.
#[derive(Clone)]
pub(crate) struct WeakScope(Weak<ScopeInner>);

impl WeakScope {
    pub(crate) fn upgrade(&self) -> Result<LifetimeScope> {
        self.0
            .upgrade()
            .map(|inner| LifetimeScope { inner })
            .ok_or(DiError::ScopeDisposed)
    }
}
