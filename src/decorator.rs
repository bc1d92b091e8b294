//! Decorators and interception
//!
//! A decorator wraps every resolved instance of a service in another
//! implementation of the same service. Decorators run after the instance is
//! taken from (or put into) its scope cache, in registration order, on every
//! resolution; the wrapped result itself is never cached.
//!
//! Interception is a decorator whose wrapper is an explicit forwarding proxy
//! that routes each call through an [`InterceptorChain`].

use crate::registration::{AnyArc, unwrap_service, wrap_service};
use crate::{ContainerBuilder, RegistrationBuilder, ResolveContext, Result};
use std::any::TypeId;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::{debug, trace};

type DecorateFn = Arc<dyn Fn(&ResolveContext<'_>, AnyArc) -> Result<AnyArc> + Send + Sync>;

/// A registered decorator for one service type.
pub(crate) struct Decorator {
    service: TypeId,
    decorate: DecorateFn,
}

impl Decorator {
    fn new<T, F>(decorate: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&ResolveContext<'_>, Arc<T>) -> Result<Arc<T>> + Send + Sync + 'static,
    {
        Self {
            service: TypeId::of::<T>(),
            decorate: Arc::new(move |ctx: &ResolveContext<'_>, payload: AnyArc| {
                let inner = unwrap_service::<T>(&payload)?;
                decorate(ctx, inner).map(wrap_service)
            }),
        }
    }

    #[inline]
    pub(crate) fn service(&self) -> TypeId {
        self.service
    }

    #[inline]
    pub(crate) fn apply(&self, ctx: &ResolveContext<'_>, payload: AnyArc) -> Result<AnyArc> {
        (self.decorate)(ctx, payload)
    }
}

impl ContainerBuilder {
    /// Wrap every resolution of service `T` (under any key).
    ///
    /// ```rust
    /// use lifetime_di::ContainerBuilder;
    /// use std::sync::Arc;
    ///
    /// trait Greeter: Send + Sync {
    ///     fn greet(&self) -> String;
    /// }
    ///
    /// struct Plain;
    ///
    /// impl Greeter for Plain {
    ///     fn greet(&self) -> String {
    ///         "hello".into()
    ///     }
    /// }
    ///
    /// struct Loud(Arc<dyn Greeter>);
    ///
    /// impl Greeter for Loud {
    ///     fn greet(&self) -> String {
    ///         self.0.greet().to_uppercase()
    ///     }
    /// }
    ///
    /// let mut builder = ContainerBuilder::new();
    /// builder.register(|_| Ok(Plain)).as_service(|g| g as Arc<dyn Greeter>);
    /// builder.register_decorator::<dyn Greeter, _>(|_, inner| Ok(Arc::new(Loud(inner))));
    /// let container = builder.build();
    ///
    /// assert_eq!(container.get::<dyn Greeter>().unwrap().greet(), "HELLO");
    /// ```
    pub fn register_decorator<T, F>(&mut self, decorate: F) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&ResolveContext<'_>, Arc<T>) -> Result<Arc<T>> + Send + Sync + 'static,
    {
        #[cfg(feature = "logging")]
        debug!(
            target: "lifetime_di",
            service = std::any::type_name::<T>(),
            "Registering decorator"
        );

        self.decorators.push(Decorator::new(decorate));
        self
    }

    /// Register a new default `T` that decorates the `T` registered under `key`.
    ///
    /// The returned builder configures the decorating registration, so
    /// decorators can be chained by key. Decorators added with
    /// [`register_decorator`](Self::register_decorator) still apply to both
    /// the keyed inner service and this one.
    pub fn register_decorator_from<T, K, F>(&mut self, key: K, decorate: F) -> RegistrationBuilder<'_, Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
        K: Hash + Eq + fmt::Debug + Clone + Send + Sync + 'static,
        F: Fn(&ResolveContext<'_>, Arc<T>) -> Result<Arc<T>> + Send + Sync + 'static,
    {
        self.register(move |ctx| {
            let inner = ctx.get_keyed::<T, K>(key.clone())?;
            decorate(ctx, inner)
        })
        .as_service::<T, _>(|outer: Arc<Arc<T>>| Arc::clone(&*outer))
    }

    /// Intercept calls to service `T` with the registered interceptor `I`.
    ///
    /// `proxy` builds the forwarding implementation of `T` around the real
    /// instance; it should route each method through
    /// [`InterceptorChain::invoke`].
    pub fn register_interceptor<T, I, F>(&mut self, proxy: F) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
        I: Interceptor + 'static,
        F: Fn(Arc<T>, InterceptorChain) -> Arc<T> + Send + Sync + 'static,
    {
        self.register_decorator::<T, _>(move |ctx, inner| {
            let interceptor: Arc<dyn Interceptor> = ctx.get::<I>()?;
            let chain = InterceptorChain::new(std::any::type_name::<T>(), vec![interceptor]);
            Ok(proxy(inner, chain))
        })
    }
}

// =============================================================================
// Interception
// =============================================================================

/// One intercepted call.
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    service: &'static str,
    method: &'a str,
    arguments: &'a [String],
}

impl<'a> Invocation<'a> {
    /// Name of the intercepted service.
    #[inline]
    pub fn service(&self) -> &'static str {
        self.service
    }

    /// Name of the method being called.
    #[inline]
    pub fn method(&self) -> &'a str {
        self.method
    }

    /// Rendered arguments of the call.
    #[inline]
    pub fn arguments(&self) -> &'a [String] {
        self.arguments
    }
}

/// Observes calls made through an intercepting proxy.
pub trait Interceptor: Send + Sync {
    /// Called before the real method runs.
    fn before(&self, invocation: &Invocation<'_>) {
        let _ = invocation;
    }

    /// Called after the real method returns.
    fn after(&self, invocation: &Invocation<'_>, return_value: &dyn fmt::Debug) {
        let _ = (invocation, return_value);
    }
}

/// The interceptors attached to one proxied instance.
#[derive(Clone)]
pub struct InterceptorChain {
    service: &'static str,
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl InterceptorChain {
    /// Build a chain for `service`.
    pub fn new(service: &'static str, interceptors: Vec<Arc<dyn Interceptor>>) -> Self {
        Self {
            service,
            interceptors,
        }
    }

    /// Run `call` between the interceptors' `before` and `after` hooks.
    ///
    /// `before` runs in chain order and `after` in reverse, so the first
    /// interceptor is the outermost.
    pub fn invoke<R, F>(&self, method: &str, arguments: Vec<String>, call: F) -> R
    where
        R: fmt::Debug,
        F: FnOnce() -> R,
    {
        let invocation = Invocation {
            service: self.service,
            method,
            arguments: &arguments,
        };

        #[cfg(feature = "logging")]
        trace!(
            target: "lifetime_di",
            service = self.service,
            method = method,
            interceptors = self.interceptors.len(),
            "Intercepting call"
        );

        for interceptor in &self.interceptors {
            interceptor.before(&invocation);
        }
        let result = call();
        for interceptor in self.interceptors.iter().rev() {
            interceptor.after(&invocation, &result);
        }
        result
    }

    /// Number of interceptors.
    #[inline]
    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    /// Whether the chain has no interceptors.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }
}

impl fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorChain")
            .field("service", &self.service)
            .field("interceptors", &self.interceptors.len())
            .finish()
    }
}
