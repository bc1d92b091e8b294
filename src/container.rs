//! The container root
//!
//! A [`Container`] is the handle returned by
//! [`ContainerBuilder::build`](crate::ContainerBuilder::build). It is the root
//! lifetime scope of the tree: it owns every single-instance component, and
//! disposing it (or dropping its last handle) tears down the whole tree.

use crate::{ContainerBuilder, LifetimeScope, Registry};
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// Root of the lifetime-scope tree.
///
/// Dereferences to [`LifetimeScope`], so every resolution and scoping method
/// is available directly. Cloning shares the same root.
///
/// # Examples
///
/// ```rust
/// use lifetime_di::Container;
/// use std::sync::Arc;
///
/// struct Config {
///     debug: bool,
/// }
///
/// let mut builder = Container::builder();
/// builder.register_instance(Config { debug: true });
/// let container = builder.build();
///
/// let a = container.get::<Config>().unwrap();
/// let b = container.begin_scope().unwrap().get::<Config>().unwrap();
/// assert!(a.debug);
/// assert!(Arc::ptr_eq(&a, &b));
/// ```
#[derive(Clone)]
pub struct Container {
    root: LifetimeScope,
}

impl Container {
    /// Start a new [`ContainerBuilder`].
    #[inline]
    pub fn builder() -> ContainerBuilder {
        ContainerBuilder::new()
    }

    pub(crate) fn from_registry(registry: Arc<Registry>) -> Self {
        Self {
            root: LifetimeScope::new_root(registry),
        }
    }

    /// The root lifetime scope.
    #[inline]
    pub fn root_scope(&self) -> &LifetimeScope {
        &self.root
    }
}

impl Deref for Container {
    type Target = LifetimeScope;

    #[inline]
    fn deref(&self) -> &LifetimeScope {
        &self.root
    }
}

impl AsRef<LifetimeScope> for Container {
    #[inline]
    fn as_ref(&self) -> &LifetimeScope {
        &self.root
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("root", &self.root)
            .field("registry", self.root.registry())
            .finish()
    }
}
