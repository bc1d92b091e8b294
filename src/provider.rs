//! Provider traits for dependency injection
//!
//! These traits and enums define what types can be injected, how their
//! instances are shared and who is responsible for releasing them.

use crate::ContainerBuilder;

/// Marker trait for types that can be injected via the DI container.
///
/// This is automatically implemented for all types that are `Send + Sync + 'static`.
/// You never need to implement this manually.
pub trait Injectable: Send + Sync + 'static {
    /// Returns the type name for debugging
    #[inline]
    fn type_name_of() -> &'static str
    where
        Self: Sized,
    {
        std::any::type_name::<Self>()
    }
}

// Blanket implementation - everything that's Send + Sync + 'static is Injectable
impl<T: Send + Sync + 'static> Injectable for T {}

/// Where (and whether) a resolved instance is cached for reuse.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum SharingPolicy {
    /// New instance on every resolution (instance per dependency)
    #[default]
    None,

    /// One instance for the whole container, owned by the root scope
    SingleInstance,

    /// One instance per lifetime scope
    PerLifetimeScope,

    /// One instance per nearest enclosing scope carrying the tag
    PerMatchingScope(String),
}

impl SharingPolicy {
    /// Whether instances are cached at all.
    #[inline]
    pub fn is_shared(&self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Who releases an activated instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OwnershipPolicy {
    /// The owning lifetime scope runs release hooks when it is disposed
    #[default]
    OwnedByScope,

    /// The container never releases the instance
    ExternallyOwned,
}

/// A reusable bundle of registrations applied once at build time.
///
/// Modules may branch on their own fields; they have no presence in the
/// built container.
///
/// # Examples
///
/// ```rust
/// use lifetime_di::{ContainerBuilder, Module};
///
/// struct Greeting(&'static str);
///
/// struct GreetingModule {
///     formal: bool,
/// }
///
/// impl Module for GreetingModule {
///     fn load(&self, builder: &mut ContainerBuilder) {
///         if self.formal {
///             builder.register_instance(Greeting("Good evening"));
///         } else {
///             builder.register_instance(Greeting("Hi"));
///         }
///     }
/// }
///
/// let mut builder = ContainerBuilder::new();
/// builder.register_module(GreetingModule { formal: true });
/// let container = builder.build();
///
/// assert_eq!(container.get::<Greeting>().unwrap().0, "Good evening");
/// ```
pub trait Module {
    /// Add this module's registrations to the builder.
    fn load(&self, builder: &mut ContainerBuilder);
}

impl<F> Module for F
where
    F: Fn(&mut ContainerBuilder),
{
    fn load(&self, builder: &mut ContainerBuilder) {
        self(builder);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        assert_eq!(SharingPolicy::default(), SharingPolicy::None);
        assert_eq!(OwnershipPolicy::default(), OwnershipPolicy::OwnedByScope);
    }

    #[test]
    fn test_is_shared() {
        assert!(!SharingPolicy::None.is_shared());
        assert!(SharingPolicy::SingleInstance.is_shared());
        assert!(SharingPolicy::PerLifetimeScope.is_shared());
        assert!(SharingPolicy::PerMatchingScope("request".into()).is_shared());
    }

    #[test]
    fn test_type_name_of() {
        struct Marker;
        assert!(Marker::type_name_of().ends_with("Marker"));
    }
}
