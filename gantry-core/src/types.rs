//! Core type identity primitives.
//!
//! The engine is runtime-typed: services travel as [`Instance`] (an erased
//! `Arc`) and are keyed by [`TypeInfo`]. The typed entry points on
//! [`InjectionScope`](crate::InjectionScope) downcast at the boundary.

use std::any::{Any, TypeId};
use std::borrow::Cow;
use std::sync::Arc;

use crate::error::{LocateError, Result};

/// Erased service instance, the engine's common currency.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Marker trait for types that can be located through the container.
///
/// Automatically implemented for all `Send + Sync + 'static` types; you
/// never implement it manually.
pub trait Injectable: Send + Sync + 'static {}

impl<T: Send + Sync + 'static> Injectable for T {}

/// Type name and type id, carried together for diagnostics.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct TypeInfo {
    pub type_id: TypeId,
    pub type_name: &'static str,
}

impl TypeInfo {
    pub fn of<T: ?Sized + 'static>() -> TypeInfo {
        TypeInfo {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }
}

impl std::fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.type_name)
    }
}

/// Key attached to an export for keyed registration and lookup.
///
/// Keys are compared by value equality. When keyed and keyless exports
/// exist for the same type, the keyless ones answer unkeyed requests and
/// keyed ones are addressable only by their key.
///
/// # Examples
///
/// ```rust
/// use gantry_core::ExportKey;
///
/// let a = ExportKey::from("primary");
/// let b = ExportKey::from("primary");
/// assert_eq!(a, b);
/// assert_ne!(a, ExportKey::from(7));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExportKey {
    Str(Cow<'static, str>),
    Int(i64),
    Type(TypeId),
}

impl ExportKey {
    /// Key derived from a type identity.
    pub fn of_type<T: ?Sized + 'static>() -> Self {
        ExportKey::Type(TypeId::of::<T>())
    }
}

impl From<&'static str> for ExportKey {
    fn from(value: &'static str) -> Self {
        ExportKey::Str(Cow::Borrowed(value))
    }
}

impl From<String> for ExportKey {
    fn from(value: String) -> Self {
        ExportKey::Str(Cow::Owned(value))
    }
}

impl From<i64> for ExportKey {
    fn from(value: i64) -> Self {
        ExportKey::Int(value)
    }
}

impl std::fmt::Display for ExportKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportKey::Str(s) => write!(f, "{s}"),
            ExportKey::Int(i) => write!(f, "{i}"),
            ExportKey::Type(t) => write!(f, "{t:?}"),
        }
    }
}

/// Downcast an erased instance to its concrete service type.
pub(crate) fn downcast_arc<T: Injectable>(instance: Instance) -> Result<Arc<T>> {
    instance
        .downcast::<T>()
        .map_err(|_| LocateError::TypeMismatch {
            expected: std::any::type_name::<T>(),
        })
}

/// Downcast an erased instance holding a trait object (`Arc<I>` boxed as
/// the `Any` payload) back to `Arc<I>`.
pub(crate) fn downcast_trait<I: ?Sized + Send + Sync + 'static>(instance: Instance) -> Result<Arc<I>> {
    instance
        .downcast::<Arc<I>>()
        .map(|outer| (*outer).clone())
        .map_err(|_| LocateError::TypeMismatch {
            expected: std::any::type_name::<I>(),
        })
}
