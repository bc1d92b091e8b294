//! Service identity
//!
//! A [`ServiceKey`] is the type being requested (a concrete type or a
//! `dyn Trait`) plus an optional discriminator. Names are discriminators of
//! type `String`; any other `Hash + Eq + Debug` value can key a registration.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Object-safe view of a discriminator value.
trait DynKey: Send + Sync + 'static {
    fn as_any(&self) -> &dyn Any;
    fn eq_dyn(&self, other: &dyn DynKey) -> bool;
    fn hash_dyn(&self, state: &mut dyn Hasher);
    fn fmt_dyn(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result;
}

impl<K> DynKey for K
where
    K: Hash + Eq + fmt::Debug + Send + Sync + 'static,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn eq_dyn(&self, other: &dyn DynKey) -> bool {
        other.as_any().downcast_ref::<K>().is_some_and(|o| o == self)
    }

    fn hash_dyn(&self, mut state: &mut dyn Hasher) {
        TypeId::of::<K>().hash(&mut state);
        self.hash(&mut state);
    }

    fn fmt_dyn(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Type-erased registration key (the `Keyed`/`Named` part of a service key).
#[derive(Clone)]
pub struct Discriminator(Arc<dyn DynKey>);

impl Discriminator {
    /// Wrap an arbitrary key value.
    pub fn new<K>(key: K) -> Self
    where
        K: Hash + Eq + fmt::Debug + Send + Sync + 'static,
    {
        Self(Arc::new(key))
    }

    /// A string name; equivalent to `Discriminator::new(String::from(name))`.
    pub fn named(name: impl Into<String>) -> Self {
        Self::new(name.into())
    }

    /// Borrow the key as its concrete type.
    pub fn downcast_ref<K: 'static>(&self) -> Option<&K> {
        self.0.as_any().downcast_ref::<K>()
    }
}

impl PartialEq for Discriminator {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_dyn(other.0.as_ref())
    }
}

impl Eq for Discriminator {}

impl Hash for Discriminator {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash_dyn(state);
    }
}

impl fmt::Debug for Discriminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt_dyn(f)
    }
}

/// Identity under which registrations are looked up.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ServiceKey {
    type_id: TypeId,
    type_name: &'static str,
    discriminator: Option<Discriminator>,
}

impl ServiceKey {
    /// The default (unkeyed) service of type `T`.
    #[inline]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            discriminator: None,
        }
    }

    /// Service `T` registered under a string name.
    #[inline]
    pub fn named<T: ?Sized + 'static>(name: impl Into<String>) -> Self {
        Self::of::<T>().with_discriminator(Discriminator::named(name))
    }

    /// Service `T` registered under an arbitrary key.
    #[inline]
    pub fn keyed<T, K>(key: K) -> Self
    where
        T: ?Sized + 'static,
        K: Hash + Eq + fmt::Debug + Send + Sync + 'static,
    {
        Self::of::<T>().with_discriminator(Discriminator::new(key))
    }

    /// Replace the discriminator.
    #[inline]
    pub fn with_discriminator(mut self, discriminator: Discriminator) -> Self {
        self.discriminator = Some(discriminator);
        self
    }

    /// The same service type without a discriminator.
    #[inline]
    pub fn unkeyed(&self) -> Self {
        Self {
            type_id: self.type_id,
            type_name: self.type_name,
            discriminator: None,
        }
    }

    /// TypeId of the requested service type.
    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Human-readable name of the requested service type.
    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// The discriminator, if this is a keyed or named service.
    #[inline]
    pub fn discriminator(&self) -> Option<&Discriminator> {
        self.discriminator.as_ref()
    }

    /// Whether the key carries a discriminator.
    #[inline]
    pub fn is_keyed(&self) -> bool {
        self.discriminator.is_some()
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.discriminator {
            Some(key) => write!(f, "{}[{:?}]", self.type_name, key),
            None => f.write_str(self.type_name),
        }
    }
}

impl fmt::Debug for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
