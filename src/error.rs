//! Error types for dependency injection

use crate::ServiceKey;
use thiserror::Error;

/// Errors that can occur while resolving services from a lifetime scope.
///
/// Every failure is reported synchronously to the caller; the container never
/// retries an activation or substitutes a fallback instance.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiError {
    /// No registration (and no relationship type) matches the requested service
    #[error("Service not registered: {service}")]
    NotRegistered { service: String },

    /// An activation re-entered a registration that is still being constructed
    #[error("Circular dependency detected: {}", .chain.join(" -> "))]
    CircularDependency { chain: Vec<String> },

    /// A per-matching-scope service was requested outside any scope with its tag
    #[error("No lifetime scope tagged '{tag}' is visible when resolving {service}")]
    NoMatchingScopeFound { tag: String, service: String },

    /// An indexed lookup used a key with no registration behind it
    #[error("No {service} registered under key {key}")]
    KeyNotFound { service: String, key: String },

    /// The scope (or the scope an adapter captured) has been disposed
    #[error("Lifetime scope has been disposed")]
    ScopeDisposed,

    /// The activation function or one of its hooks failed
    #[error("Failed to activate {service}: {reason}")]
    ActivationFailed { service: String, reason: String },

    /// A required explicit parameter was not supplied
    #[error("Missing parameter '{parameter}' while activating {service}")]
    MissingParameter { service: String, parameter: String },

    /// A typed metadata view was requested that the registration does not carry
    #[error("Registration {service} carries no metadata of type {metadata}")]
    MetadataNotFound {
        service: String,
        metadata: &'static str,
    },
}

impl DiError {
    /// Create a NotRegistered error for a service key
    #[inline]
    pub fn not_registered(key: &ServiceKey) -> Self {
        Self::NotRegistered {
            service: key.to_string(),
        }
    }

    /// Create an ActivationFailed error for a type
    #[inline]
    pub fn activation_failed<T: ?Sized + 'static>(reason: impl Into<String>) -> Self {
        Self::ActivationFailed {
            service: std::any::type_name::<T>().to_string(),
            reason: reason.into(),
        }
    }

    /// Create an ActivationFailed error from inside an activation function.
    ///
    /// The resolver fills in the service that was being activated.
    #[inline]
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::ActivationFailed {
            service: String::new(),
            reason: reason.into(),
        }
    }

    /// Create a MissingParameter error; the service is filled in by the resolver.
    #[inline]
    pub fn missing_parameter(parameter: impl Into<String>) -> Self {
        Self::MissingParameter {
            service: String::new(),
            parameter: parameter.into(),
        }
    }

    /// Create a KeyNotFound error
    #[inline]
    pub fn key_not_found<T: ?Sized + 'static>(key: impl std::fmt::Debug) -> Self {
        Self::KeyNotFound {
            service: std::any::type_name::<T>().to_string(),
            key: format!("{key:?}"),
        }
    }

    /// Attach the service being activated to errors raised without one.
    pub(crate) fn attribute_to(self, key: &ServiceKey) -> Self {
        match self {
            Self::ActivationFailed { service, reason } if service.is_empty() => {
                Self::ActivationFailed {
                    service: key.to_string(),
                    reason,
                }
            }
            Self::MissingParameter { service, parameter } if service.is_empty() => {
                Self::MissingParameter {
                    service: key.to_string(),
                    parameter,
                }
            }
            other => other,
        }
    }
}

/// Result type alias for DI operations
pub type Result<T> = std::result::Result<T, DiError>;
