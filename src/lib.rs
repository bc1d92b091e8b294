//! # lifetime-di - Dependency Injection with Lifetime Scopes
//!
//! An in-process inversion-of-control container. Components are registered
//! on a [`ContainerBuilder`], frozen into a [`Container`], and resolved from
//! a tree of [`LifetimeScope`]s that decide how long each instance lives and
//! release it deterministically.
//!
//! ## Features
//!
//! - **Trait services** - resolve `dyn Trait` as easily as concrete types
//! - **Sharing policies** - per dependency, per lifetime scope, per tagged scope, single instance
//! - **Deterministic disposal** - children first, then owned instances in reverse creation order
//! - **Relationship types** - `Lazy`, `Owned`, `Func`, `Index`, `Meta`, `Vec<_>` without extra registrations
//! - **Decorators and interception** - wrap services after activation
//! - **Modules** - bundle registrations behind configuration fields
//! - **Cycle detection** - reported with the full dependency chain
//! - **Observable** - optional tracing integration with JSON or pretty output
//!
//! ## Quick Start
//!
//! ```rust
//! use lifetime_di::ContainerBuilder;
//! use std::sync::Arc;
//!
//! trait Output: Send + Sync {
//!     fn write(&self, content: &str) -> String;
//! }
//!
//! struct ConsoleOutput;
//!
//! impl Output for ConsoleOutput {
//!     fn write(&self, content: &str) -> String {
//!         content.to_string()
//!     }
//! }
//!
//! struct TodayWriter {
//!     output: Arc<dyn Output>,
//! }
//!
//! impl TodayWriter {
//!     fn write_date(&self) -> String {
//!         self.output.write("2024-01-01")
//!     }
//! }
//!
//! let mut builder = ContainerBuilder::new();
//! builder
//!     .register(|_| Ok(ConsoleOutput))
//!     .as_service(|o| o as Arc<dyn Output>);
//! builder.register(|ctx| Ok(TodayWriter { output: ctx.get()? }));
//! let container = builder.build();
//!
//! let scope = container.begin_scope().unwrap();
//! let writer = scope.get::<TodayWriter>().unwrap();
//! assert_eq!(writer.write_date(), "2024-01-01");
//! ```
//!
//! ## Lifetime Scopes
//!
//! ```rust
//! use lifetime_di::{ContainerBuilder, DiError};
//! use std::sync::Arc;
//!
//! struct Transaction;
//!
//! let mut builder = ContainerBuilder::new();
//! builder
//!     .register(|_| Ok(Transaction))
//!     .instance_per_matching_lifetime_scope("transaction");
//! let container = builder.build();
//!
//! let tx = container.begin_tagged_scope("transaction").unwrap();
//! let nested = tx.begin_scope().unwrap();
//!
//! // Both resolve the instance owned by the tagged scope
//! assert!(Arc::ptr_eq(
//!     &tx.get::<Transaction>().unwrap(),
//!     &nested.get::<Transaction>().unwrap()
//! ));
//!
//! // Outside any "transaction" scope there is nothing to own it
//! assert!(matches!(
//!     container.get::<Transaction>(),
//!     Err(DiError::NoMatchingScopeFound { .. })
//! ));
//! ```
//!
//! ## Relationship Types
//!
//! ```rust
//! use lifetime_di::{ContainerBuilder, Lazy, Meta};
//! use std::sync::Arc;
//!
//! trait Command: Send + Sync {
//!     fn run(&self) -> &'static str;
//! }
//!
//! struct Save;
//! struct Open;
//!
//! impl Command for Save {
//!     fn run(&self) -> &'static str {
//!         "saved"
//!     }
//! }
//!
//! impl Command for Open {
//!     fn run(&self) -> &'static str {
//!         "opened"
//!     }
//! }
//!
//! let mut builder = ContainerBuilder::new();
//! builder
//!     .register(|_| Ok(Save))
//!     .as_service(|c| c as Arc<dyn Command>)
//!     .with_metadata_value("Name", "Save");
//! builder
//!     .register(|_| Ok(Open))
//!     .as_service(|c| c as Arc<dyn Command>)
//!     .with_metadata_value("Name", "Open");
//! let container = builder.build();
//!
//! let buttons = container.resolve::<Vec<Meta<dyn Command>>>().unwrap();
//! let labels: Vec<_> = buttons
//!     .iter()
//!     .map(|b| b.metadata().get_str("Name").unwrap_or_default().to_string())
//!     .collect();
//! assert_eq!(labels, ["Save", "Open"]);
//!
//! let lazy = container.resolve::<Lazy<dyn Command>>().unwrap();
//! assert_eq!(lazy.value().unwrap().run(), "opened");
//! ```

mod component;
mod container;
mod decorator;
mod error;
mod key;
#[cfg(feature = "logging")]
pub mod logging;
mod parameter;
mod provider;
mod registration;
mod registry;
mod relationship;
mod resolver;
mod scope;

pub use component::{Arg, Component, Resolvable};
pub use container::Container;
pub use decorator::{Interceptor, InterceptorChain, Invocation};
pub use error::{DiError, Result};
pub use key::{Discriminator, ServiceKey};
pub use parameter::{Parameter, Parameters};
pub use provider::{Injectable, Module, OwnershipPolicy, SharingPolicy};
pub use registration::{Metadata, MetadataValue, RegistrationBuilder, RegistrationEntry, RegistrationId};
pub use registry::{ContainerBuilder, Registry};
pub use relationship::{Collectable, Func, Func1, Func2, Index, Lazy, Meta, Owned};
pub use resolver::ResolveContext;
pub use scope::{Disposable, LifetimeScope, ScopeId};

// Re-export tracing macros for convenience when logging feature is enabled
#[cfg(feature = "logging")]
pub use tracing::{debug, error, info, trace, warn};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        Arg, Component, Container, ContainerBuilder, DiError, Disposable, Func, Func1, Func2,
        Index, Injectable, Lazy, LifetimeScope, Meta, Metadata, Module, Owned, Parameters,
        ResolveContext, Result,
    };
    pub use std::sync::Arc;
}

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    trait Repository: Send + Sync {
        fn url(&self) -> &str;
    }

    struct Database {
        url: String,
    }

    impl Repository for Database {
        fn url(&self) -> &str {
            &self.url
        }
    }

    #[test]
    fn test_trait_service_resolution() {
        let mut builder = ContainerBuilder::new();
        builder
            .register(|_| Ok(Database { url: "test".into() }))
            .as_service(|d| d as Arc<dyn Repository>)
            .as_self()
            .single_instance();
        let container = builder.build();

        let repo = container.get::<dyn Repository>().unwrap();
        let db = container.get::<Database>().unwrap();
        assert_eq!(repo.url(), "test");
        assert_eq!(db.url, "test");
    }

    #[test]
    fn test_lazy_singleton() {
        static CREATED: AtomicU32 = AtomicU32::new(0);

        struct LazyService;

        let mut builder = ContainerBuilder::new();
        builder
            .register(|_| {
                CREATED.fetch_add(1, Ordering::SeqCst);
                Ok(LazyService)
            })
            .single_instance();
        let container = builder.build();

        assert_eq!(CREATED.load(Ordering::SeqCst), 0);
        let _ = container.get::<LazyService>().unwrap();
        let _ = container.get::<LazyService>().unwrap();
        assert_eq!(CREATED.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_override_last_registration_wins() {
        let mut builder = ContainerBuilder::new();
        builder.register_instance(Database { url: "production".into() });
        builder.register_instance(Database { url: "test".into() });
        let container = builder.build();

        assert_eq!(container.get::<Database>().unwrap().url, "test");
        assert_eq!(container.resolve::<Vec<Arc<Database>>>().unwrap().len(), 2);
    }

    #[test]
    fn test_scope_resolution_sees_root_registrations() {
        let mut builder = ContainerBuilder::new();
        builder.register_instance(Database { url: "root".into() });
        let container = builder.build();

        let child = container.begin_scope().unwrap();
        assert!(child.contains::<Database>());
        assert_eq!(child.get::<Database>().unwrap().url, "root");
    }
}
