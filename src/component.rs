//! Constructor injection
//!
//! A [`Component`] declares its dependencies as a [`Resolvable`] type and
//! builds itself from them. The container resolves the dependencies and calls
//! [`Component::create`].
//!
//! # Example
//!
//! ```rust
//! use lifetime_di::{Component, ContainerBuilder};
//! use std::sync::Arc;
//!
//! struct Database {
//!     url: String,
//! }
//!
//! impl Component for Database {
//!     type Dependencies = ();
//!
//!     fn create(_deps: Self::Dependencies) -> Self {
//!         Database { url: "postgres://localhost".into() }
//!     }
//! }
//!
//! struct UserRepository {
//!     db: Arc<Database>,
//! }
//!
//! impl Component for UserRepository {
//!     type Dependencies = Arc<Database>;
//!
//!     fn create(db: Self::Dependencies) -> Self {
//!         UserRepository { db }
//!     }
//! }
//!
//! let mut builder = ContainerBuilder::new();
//! builder.register_type::<Database>().single_instance();
//! builder.register_type::<UserRepository>();
//! let container = builder.build();
//!
//! let repo = container.get::<UserRepository>().unwrap();
//! assert_eq!(repo.db.url, "postgres://localhost");
//! ```

use crate::{DiError, Injectable, ResolveContext, Result};
use std::sync::Arc;

// =============================================================================
// Component Trait
// =============================================================================

/// A type the container can construct from its declared dependencies.
pub trait Component: Injectable + Sized {
    /// Dependencies resolved before construction.
    ///
    /// Use `()` for none, `Arc<T>` for one, or a tuple for several.
    type Dependencies: Resolvable;

    /// Build the component.
    fn create(deps: Self::Dependencies) -> Self;
}

pub(crate) fn construct<C: Component>(ctx: &ResolveContext<'_>) -> Result<C> {
    C::Dependencies::resolve(ctx).map(C::create)
}

// =============================================================================
// Resolvable Trait - shapes that can be resolved from a context
// =============================================================================

/// Something the container can produce for a dependency slot.
///
/// Implemented for service handles (`Arc<T>`, `Option<Arc<T>>`), explicit
/// arguments ([`Arg`]), the relationship adapters and tuples of any of these.
pub trait Resolvable: Sized {
    /// Resolve a dependency sitting at `position` of a constructor, if known.
    fn resolve_at(ctx: &ResolveContext<'_>, position: Option<usize>) -> Result<Self>;

    /// Resolve as a standalone request.
    #[inline]
    fn resolve(ctx: &ResolveContext<'_>) -> Result<Self> {
        Self::resolve_at(ctx, None)
    }
}

// No dependencies
impl Resolvable for () {
    #[inline]
    fn resolve_at(_ctx: &ResolveContext<'_>, _position: Option<usize>) -> Result<Self> {
        Ok(())
    }
}

// Single dependency
impl<T: ?Sized + Send + Sync + 'static> Resolvable for Arc<T> {
    #[inline]
    fn resolve_at(ctx: &ResolveContext<'_>, _position: Option<usize>) -> Result<Self> {
        ctx.get::<T>()
    }
}

// Optional dependency
impl<T: ?Sized + Send + Sync + 'static> Resolvable for Option<Arc<T>> {
    #[inline]
    fn resolve_at(ctx: &ResolveContext<'_>, _position: Option<usize>) -> Result<Self> {
        ctx.try_get::<T>()
    }
}

/// An explicit value supplied as a parameter rather than resolved.
///
/// Matched first by the constructor position it occupies, then by type.
///
/// ```rust
/// use lifetime_di::{Arg, Component, ContainerBuilder, Parameters};
///
/// struct DomainObject {
///     id: i32,
/// }
///
/// impl Component for DomainObject {
///     type Dependencies = (Arg<i32>,);
///
///     fn create((Arg(id),): Self::Dependencies) -> Self {
///         DomainObject { id }
///     }
/// }
///
/// let mut builder = ContainerBuilder::new();
/// builder.register_type::<DomainObject>();
/// let container = builder.build();
///
/// let obj = container
///     .get_with::<DomainObject>(&Parameters::new().positional(0, 42_i32))
///     .unwrap();
/// assert_eq!(obj.id, 42);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arg<V>(pub V);

impl<V: Clone + Send + Sync + 'static> Resolvable for Arg<V> {
    fn resolve_at(ctx: &ResolveContext<'_>, position: Option<usize>) -> Result<Self> {
        position
            .and_then(|p| ctx.positional_parameter::<V>(p))
            .or_else(|| ctx.typed_parameter::<V>())
            .map(Arg)
            .ok_or_else(|| {
                let name = std::any::type_name::<V>();
                DiError::missing_parameter(match position {
                    Some(p) => format!("#{p} ({name})"),
                    None => name.to_string(),
                })
            })
    }
}

// Tuple implementations (1-12 elements)
macro_rules! impl_resolvable_tuple {
    ($($idx:tt $T:ident),+) => {
        impl<$($T: Resolvable),+> Resolvable for ($($T,)+) {
            #[inline]
            fn resolve_at(ctx: &ResolveContext<'_>, _position: Option<usize>) -> Result<Self> {
                Ok(($($T::resolve_at(ctx, Some($idx))?,)+))
            }
        }
    };
}

impl_resolvable_tuple!(0 A);
impl_resolvable_tuple!(0 A, 1 B);
impl_resolvable_tuple!(0 A, 1 B, 2 C);
impl_resolvable_tuple!(0 A, 1 B, 2 C, 3 D);
impl_resolvable_tuple!(0 A, 1 B, 2 C, 3 D, 4 E);
impl_resolvable_tuple!(0 A, 1 B, 2 C, 3 D, 4 E, 5 F);
impl_resolvable_tuple!(0 A, 1 B, 2 C, 3 D, 4 E, 5 F, 6 G);
impl_resolvable_tuple!(0 A, 1 B, 2 C, 3 D, 4 E, 5 F, 6 G, 7 H);
impl_resolvable_tuple!(0 A, 1 B, 2 C, 3 D, 4 E, 5 F, 6 G, 7 H, 8 I);
impl_resolvable_tuple!(0 A, 1 B, 2 C, 3 D, 4 E, 5 F, 6 G, 7 H, 8 I, 9 J);
impl_resolvable_tuple!(0 A, 1 B, 2 C, 3 D, 4 E, 5 F, 6 G, 7 H, 8 I, 9 J, 10 K);
impl_resolvable_tuple!(0 A, 1 B, 2 C, 3 D, 4 E, 5 F, 6 G, 7 H, 8 I, 9 J, 10 K, 11 L);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ContainerBuilder, Parameters};

    trait Engine: Send + Sync {
        fn power(&self) -> u32;
    }

    struct V8;

    impl Engine for V8 {
        fn power(&self) -> u32 {
            400
        }
    }

    struct Car {
        engine: Arc<dyn Engine>,
        radio: Option<Arc<Radio>>,
        plate: String,
    }

    struct Radio;

    impl Component for Car {
        type Dependencies = (Arc<dyn Engine>, Option<Arc<Radio>>, Arg<String>);

        fn create((engine, radio, Arg(plate)): Self::Dependencies) -> Self {
            Car { engine, radio, plate }
        }
    }

    #[test]
    fn test_tuple_dependencies() {
        let mut builder = ContainerBuilder::new();
        builder.register(|_| Ok(V8)).as_service(|e| e as Arc<dyn Engine>);
        builder.register_type::<Car>();
        let container = builder.build();

        let car = container
            .get_with::<Car>(&Parameters::new().positional(2, String::from("AB-123")))
            .unwrap();
        assert_eq!(car.engine.power(), 400);
        assert!(car.radio.is_none());
        assert_eq!(car.plate, "AB-123");
    }

    #[test]
    fn test_position_wins_over_typed_argument() {
        let mut builder = ContainerBuilder::new();
        builder.register(|_| Ok(V8)).as_service(|e| e as Arc<dyn Engine>);
        builder.register_type::<Car>();
        let container = builder.build();

        let params = Parameters::new()
            .positional(2, String::from("positional"))
            .typed(String::from("typed"));
        assert_eq!(container.get_with::<Car>(&params).unwrap().plate, "positional");

        // A positional value of another type falls through to the typed one
        let params = Parameters::new()
            .positional(2, 7_u32)
            .typed(String::from("typed"));
        assert_eq!(container.get_with::<Car>(&params).unwrap().plate, "typed");
    }

    #[test]
    fn test_arguments_of_one_type_bind_by_position() {
        struct Point {
            x: i32,
            y: i32,
        }

        impl Component for Point {
            type Dependencies = (Arg<i32>, Arg<i32>);

            fn create((Arg(x), Arg(y)): Self::Dependencies) -> Self {
                Point { x, y }
            }
        }

        let mut builder = ContainerBuilder::new();
        builder.register_type::<Point>();
        let container = builder.build();

        let params = Parameters::new().positional(0, 1_i32).positional(1, 2_i32);
        let point = container.get_with::<Point>(&params).unwrap();
        assert_eq!((point.x, point.y), (1, 2));
    }

    #[test]
    fn test_missing_argument() {
        let mut builder = ContainerBuilder::new();
        builder.register(|_| Ok(V8)).as_service(|e| e as Arc<dyn Engine>);
        builder.register_type::<Car>();
        let container = builder.build();

        match container.get::<Car>() {
            Err(DiError::MissingParameter { service, parameter }) => {
                assert!(service.ends_with("Car"));
                assert!(parameter.starts_with("#2"));
            }
            other => panic!("expected missing parameter, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_missing_dependency() {
        let mut builder = ContainerBuilder::new();
        builder.register_type::<Car>();
        let container = builder.build();

        assert!(matches!(
            container.get_with::<Car>(&Parameters::new().typed(String::new())),
            Err(DiError::NotRegistered { .. })
        ));
    }
}
