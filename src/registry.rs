//! Registration builder and the frozen registry
//!
//! [`ContainerBuilder`] collects registrations, decorators and modules.
//! [`ContainerBuilder::build`] consumes it and freezes everything into an
//! immutable [`Registry`] shared by every scope of the container, so reads
//! after build never take a lock.

use crate::decorator::Decorator;
use crate::registration::{Activator, RegistrationEntry, RegistrationId};
use crate::{
    Component, Container, Injectable, Module, RegistrationBuilder, ResolveContext, Result,
    ServiceKey, SharingPolicy,
};
use ahash::RandomState;
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::debug;

/// Collects registrations before the container is built.
///
/// # Examples
///
/// ```rust
/// use lifetime_di::ContainerBuilder;
/// use std::sync::Arc;
///
/// trait Log: Send + Sync {
///     fn write(&self, msg: &str) -> String;
/// }
///
/// struct ConsoleLog;
///
/// impl Log for ConsoleLog {
///     fn write(&self, msg: &str) -> String {
///         format!("console: {msg}")
///     }
/// }
///
/// let mut builder = ContainerBuilder::new();
/// builder
///     .register(|_| Ok(ConsoleLog))
///     .as_service(|c| c as Arc<dyn Log>)
///     .single_instance();
///
/// let container = builder.build();
/// let log = container.get::<dyn Log>().unwrap();
/// assert_eq!(log.write("hi"), "console: hi");
/// ```
#[derive(Default)]
pub struct ContainerBuilder {
    entries: Vec<RegistrationEntry>,
    pub(crate) decorators: Vec<Decorator>,
}

impl ContainerBuilder {
    /// Create an empty builder.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component produced by `activate`.
    ///
    /// The delegate receives a [`ResolveContext`] for resolving dependencies
    /// and reading explicit parameters. The registration defaults to
    /// instance-per-dependency and is exposed as its own type until a
    /// service is named.
    pub fn register<C, F>(&mut self, activate: F) -> RegistrationBuilder<'_, C>
    where
        C: Injectable,
        F: Fn(&ResolveContext<'_>) -> Result<C> + Send + Sync + 'static,
    {
        self.add::<C>(Activator::delegate(activate), SharingPolicy::None)
    }

    /// Register a component whose delegate already returns a shared handle.
    pub fn register_arc<C, F>(&mut self, activate: F) -> RegistrationBuilder<'_, C>
    where
        C: Injectable,
        F: Fn(&ResolveContext<'_>) -> Result<Arc<C>> + Send + Sync + 'static,
    {
        self.add::<C>(Activator::delegate_arc(activate), SharingPolicy::None)
    }

    /// Register a [`Component`], constructed from its declared dependencies.
    pub fn register_type<C: Component>(&mut self) -> RegistrationBuilder<'_, C> {
        self.register(crate::component::construct::<C>)
    }

    /// Register a pre-built instance.
    ///
    /// Instances are shared container-wide; the owning scope still releases
    /// them on disposal unless marked externally owned.
    pub fn register_instance<C: Injectable>(&mut self, instance: C) -> RegistrationBuilder<'_, C> {
        self.add::<C>(Activator::instance(instance), SharingPolicy::SingleInstance)
    }

    /// Apply a module's registrations.
    pub fn register_module<M: Module>(&mut self, module: M) -> &mut Self {
        #[cfg(feature = "logging")]
        debug!(
            target: "lifetime_di",
            module = std::any::type_name::<M>(),
            "Loading module"
        );

        module.load(self);
        self
    }

    /// Number of registrations so far.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn add<C: Injectable>(&mut self, activator: Activator, sharing: SharingPolicy) -> RegistrationBuilder<'_, C> {
        #[cfg(feature = "logging")]
        debug!(
            target: "lifetime_di",
            component = std::any::type_name::<C>(),
            registration = self.entries.len(),
            "Registering component"
        );

        self.entries.push(RegistrationEntry::new::<C>(activator, sharing));
        let index = self.entries.len() - 1;
        RegistrationBuilder::new(&mut self.entries[index])
    }

    /// Freeze the registrations into a container.
    pub fn build(self) -> Container {
        Container::from_registry(Arc::new(Registry::freeze(self)))
    }
}

impl fmt::Debug for ContainerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerBuilder")
            .field("registrations", &self.entries.len())
            .field("decorators", &self.decorators.len())
            .finish()
    }
}

/// All registrations of one service key, plus which one is the default.
struct ServiceEntries {
    all: Vec<Arc<RegistrationEntry>>,
    default: usize,
    /// A later registration asked to keep the current default
    pinned: bool,
}

/// Immutable registry produced by [`ContainerBuilder::build`].
pub struct Registry {
    entries: Vec<Arc<RegistrationEntry>>,
    services: HashMap<ServiceKey, ServiceEntries, RandomState>,
    decorators: HashMap<TypeId, Vec<Decorator>, RandomState>,
}

impl Registry {
    fn freeze(builder: ContainerBuilder) -> Self {
        let entries: Vec<Arc<RegistrationEntry>> =
            builder.entries.into_iter().map(Arc::new).collect();

        let mut services: HashMap<ServiceKey, ServiceEntries, RandomState> = HashMap::default();
        for entry in &entries {
            for key in entry.services() {
                let slot = services.entry(key.clone()).or_insert_with(|| ServiceEntries {
                    all: Vec::new(),
                    default: 0,
                    pinned: false,
                });
                slot.all.push(Arc::clone(entry));
                // Last registration wins until one preserves the existing default
                if slot.all.len() > 1 && entry.preserves_existing_defaults() {
                    slot.pinned = true;
                } else if !slot.pinned {
                    slot.default = slot.all.len() - 1;
                }
            }
        }

        let mut decorators: HashMap<TypeId, Vec<Decorator>, RandomState> = HashMap::default();
        for decorator in builder.decorators {
            decorators.entry(decorator.service()).or_default().push(decorator);
        }

        #[cfg(feature = "logging")]
        debug!(
            target: "lifetime_di",
            registrations = entries.len(),
            services = services.len(),
            decorators = decorators.values().map(Vec::len).sum::<usize>(),
            "Registry built"
        );

        Self {
            entries,
            services,
            decorators,
        }
    }

    /// All registrations exposed as `key`, in registration order.
    pub fn lookup(&self, key: &ServiceKey) -> &[Arc<RegistrationEntry>] {
        self.services
            .get(key)
            .map(|s| s.all.as_slice())
            .unwrap_or_default()
    }

    /// The default registration for `key`.
    pub fn default_for(&self, key: &ServiceKey) -> Option<&Arc<RegistrationEntry>> {
        self.services.get(key).and_then(|s| s.all.get(s.default))
    }

    /// Whether anything is registered under `key`.
    #[inline]
    pub fn is_registered(&self, key: &ServiceKey) -> bool {
        self.services.contains_key(key)
    }

    /// Find a registration by id.
    pub fn entry(&self, id: RegistrationId) -> Option<&Arc<RegistrationEntry>> {
        self.entries.iter().find(|e| e.id() == id)
    }

    /// Every registration, in registration order.
    pub fn registrations(&self) -> impl Iterator<Item = &Arc<RegistrationEntry>> {
        self.entries.iter()
    }

    /// Number of registrations.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn decorators_for(&self, service: TypeId) -> &[Decorator] {
        self.decorators
            .get(&service)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("registrations", &self.entries.len())
            .field("services", &self.services.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Log: Send + Sync {
        fn name(&self) -> &'static str;
    }

    struct ConsoleLog;
    struct FileLog;

    impl Log for ConsoleLog {
        fn name(&self) -> &'static str {
            "console"
        }
    }

    impl Log for FileLog {
        fn name(&self) -> &'static str {
            "file"
        }
    }

    #[test]
    fn test_last_registration_is_default() {
        let mut builder = ContainerBuilder::new();
        builder.register(|_| Ok(ConsoleLog)).as_service(|c| c as Arc<dyn Log>);
        builder.register(|_| Ok(FileLog)).as_service(|c| c as Arc<dyn Log>);
        let registry = Registry::freeze(builder);

        let key = ServiceKey::of::<dyn Log>();
        assert_eq!(registry.lookup(&key).len(), 2);
        assert!(registry.default_for(&key).unwrap().type_name().ends_with("FileLog"));
    }

    #[test]
    fn test_preserve_existing_defaults() {
        let mut builder = ContainerBuilder::new();
        builder.register(|_| Ok(ConsoleLog)).as_service(|c| c as Arc<dyn Log>);
        builder
            .register(|_| Ok(FileLog))
            .as_service(|c| c as Arc<dyn Log>)
            .preserve_existing_defaults();
        let registry = Registry::freeze(builder);

        let key = ServiceKey::of::<dyn Log>();
        assert!(registry.default_for(&key).unwrap().type_name().ends_with("ConsoleLog"));
        assert_eq!(registry.lookup(&key).len(), 2);
    }

    #[test]
    fn test_preserving_first_registration_still_becomes_default() {
        let mut builder = ContainerBuilder::new();
        builder
            .register(|_| Ok(FileLog))
            .as_service(|c| c as Arc<dyn Log>)
            .preserve_existing_defaults();
        let registry = Registry::freeze(builder);

        assert!(registry.default_for(&ServiceKey::of::<dyn Log>()).is_some());
    }

    #[test]
    fn test_preserved_default_survives_later_registrations() {
        struct SyslogLog;
        impl Log for SyslogLog {
            fn name(&self) -> &'static str {
                "syslog"
            }
        }

        let mut builder = ContainerBuilder::new();
        builder.register(|_| Ok(ConsoleLog)).as_service(|c| c as Arc<dyn Log>);
        builder
            .register(|_| Ok(FileLog))
            .as_service(|c| c as Arc<dyn Log>)
            .preserve_existing_defaults();
        builder.register(|_| Ok(SyslogLog)).as_service(|c| c as Arc<dyn Log>);
        let registry = Registry::freeze(builder);

        let key = ServiceKey::of::<dyn Log>();
        assert!(registry.default_for(&key).unwrap().type_name().ends_with("ConsoleLog"));
        assert_eq!(registry.lookup(&key).len(), 3);
    }

    #[test]
    fn test_keyed_defaults_are_independent() {
        let mut builder = ContainerBuilder::new();
        builder.register(|_| Ok(ConsoleLog)).named("a", |c| c as Arc<dyn Log>);
        builder
            .register(|_| Ok(FileLog))
            .named("a", |c| c as Arc<dyn Log>)
            .preserve_existing_defaults();
        builder.register(|_| Ok(FileLog)).named("b", |c| c as Arc<dyn Log>);
        let registry = Registry::freeze(builder);

        let a = registry.default_for(&ServiceKey::named::<dyn Log>("a")).unwrap();
        assert!(a.type_name().ends_with("ConsoleLog"));
        assert!(registry.is_registered(&ServiceKey::named::<dyn Log>("b")));
        assert!(!registry.is_registered(&ServiceKey::of::<dyn Log>()));
    }

    #[test]
    fn test_modules_add_registrations() {
        struct Logs {
            file: bool,
        }

        impl Module for Logs {
            fn load(&self, builder: &mut ContainerBuilder) {
                if self.file {
                    builder.register(|_| Ok(FileLog)).as_service(|c| c as Arc<dyn Log>);
                } else {
                    builder.register(|_| Ok(ConsoleLog)).as_service(|c| c as Arc<dyn Log>);
                }
            }
        }

        let mut builder = ContainerBuilder::new();
        builder
            .register_module(Logs { file: true })
            .register_module(|b: &mut ContainerBuilder| {
                b.register_instance(42_u32);
            });
        assert_eq!(builder.len(), 2);

        let registry = Registry::freeze(builder);
        let log = registry.default_for(&ServiceKey::of::<dyn Log>()).unwrap();
        assert!(log.type_name().ends_with("FileLog"));
        assert!(registry.is_registered(&ServiceKey::of::<u32>()));
    }

    #[test]
    fn test_entry_by_id() {
        let mut builder = ContainerBuilder::new();
        let id = builder.register_instance(ConsoleLog).id();
        let registry = Registry::freeze(builder);
        assert_eq!(registry.entry(id).map(|e| e.id()), Some(id));
        assert_eq!(registry.registrations().count(), 1);
    }
}
