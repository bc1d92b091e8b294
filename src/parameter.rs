//! Explicit parameters supplied at resolve time.
//!
//! Parameters only apply to the registration that is directly requested,
//! never to its nested dependencies. When an activation asks for a value the
//! lookup order is name, then type, then position.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

type AnyValue = Arc<dyn Any + Send + Sync>;

/// A single explicit parameter.
#[derive(Clone)]
pub enum Parameter {
    /// Matched by parameter name
    Named(String, AnyValue),
    /// Matched by value type
    Typed(TypeId, AnyValue),
    /// Matched by argument position
    Positional(usize, AnyValue),
}

impl Parameter {
    /// Create a named parameter.
    pub fn named<V: Send + Sync + 'static>(name: impl Into<String>, value: V) -> Self {
        Self::Named(name.into(), Arc::new(value))
    }

    /// Create a typed parameter.
    pub fn typed<V: Send + Sync + 'static>(value: V) -> Self {
        Self::Typed(TypeId::of::<V>(), Arc::new(value))
    }

    /// Create a positional parameter.
    pub fn positional<V: Send + Sync + 'static>(position: usize, value: V) -> Self {
        Self::Positional(position, Arc::new(value))
    }

    fn value<V: Clone + 'static>(&self) -> Option<V> {
        let value = match self {
            Self::Named(_, v) | Self::Typed(_, v) | Self::Positional(_, v) => v,
        };
        value.downcast_ref::<V>().cloned()
    }
}

impl fmt::Debug for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name, _) => write!(f, "Named({name})"),
            Self::Typed(type_id, _) => write!(f, "Typed({type_id:?})"),
            Self::Positional(position, _) => write!(f, "Positional({position})"),
        }
    }
}

/// An ordered set of explicit parameters.
///
/// # Examples
///
/// ```rust
/// use lifetime_di::Parameters;
///
/// let params = Parameters::new()
///     .named("phone_number", String::from("+12345678"))
///     .positional(1, 42_i32);
///
/// assert_eq!(params.find_named::<String>("phone_number").as_deref(), Some("+12345678"));
/// assert_eq!(params.find_positional::<i32>(1), Some(42));
/// ```
#[derive(Clone, Debug, Default)]
pub struct Parameters(Vec<Parameter>);

pub(crate) static NO_PARAMETERS: Parameters = Parameters(Vec::new());

impl Parameters {
    /// Create an empty parameter set.
    #[inline]
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Add a named parameter.
    pub fn named<V: Send + Sync + 'static>(mut self, name: impl Into<String>, value: V) -> Self {
        self.0.push(Parameter::named(name, value));
        self
    }

    /// Add a typed parameter.
    pub fn typed<V: Send + Sync + 'static>(mut self, value: V) -> Self {
        self.0.push(Parameter::typed(value));
        self
    }

    /// Add a positional parameter.
    pub fn positional<V: Send + Sync + 'static>(mut self, position: usize, value: V) -> Self {
        self.0.push(Parameter::positional(position, value));
        self
    }

    /// Add a prepared parameter.
    pub fn with(mut self, parameter: Parameter) -> Self {
        self.0.push(parameter);
        self
    }

    /// Number of parameters.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// First named parameter `name` whose value is a `V`.
    pub fn find_named<V: Clone + 'static>(&self, name: &str) -> Option<V> {
        self.0.iter().find_map(|p| match p {
            Parameter::Named(n, _) if n == name => p.value(),
            _ => None,
        })
    }

    /// First typed parameter of type `V`.
    pub fn find_typed<V: Clone + 'static>(&self) -> Option<V> {
        let wanted = TypeId::of::<V>();
        self.0.iter().find_map(|p| match p {
            Parameter::Typed(type_id, _) if *type_id == wanted => p.value(),
            _ => None,
        })
    }

    /// Positional parameter at `position` whose value is a `V`.
    pub fn find_positional<V: Clone + 'static>(&self, position: usize) -> Option<V> {
        self.0.iter().find_map(|p| match p {
            Parameter::Positional(at, _) if *at == position => p.value(),
            _ => None,
        })
    }

    /// Look a value up by name, then by type, then by position.
    pub fn find<V: Clone + 'static>(&self, name: Option<&str>, position: Option<usize>) -> Option<V> {
        name.and_then(|n| self.find_named(n))
            .or_else(|| self.find_typed())
            .or_else(|| position.and_then(|p| self.find_positional(p)))
    }
}

impl FromIterator<Parameter> for Parameters {
    fn from_iter<I: IntoIterator<Item = Parameter>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
