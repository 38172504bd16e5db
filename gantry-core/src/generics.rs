//! Open-generic exports.
//!
//! Rust monomorphizes at the call site, so a closed instantiation of an
//! open-generic export is bridged by a single generic [`GenericExport`]
//! impl written by the binding author, while presence, lifestyle, priority,
//! key, conditions, and constraint predicates live in the runtime
//! open-generic index of the strategy container.
//!
//! # Examples
//!
//! ```rust
//! use gantry_core::{GenericDefId, GenericExport, InjectionScope, Resolution, Result, TypeInfo};
//! use std::sync::Arc;
//!
//! #[derive(Clone)]
//! struct Audit;
//!
//! // The open definition marker, registered once.
//! struct RepositoryDef;
//!
//! // The implementation family, bridged generically.
//! struct Repository<T: Send + Sync + 'static> {
//!     audit: Arc<Audit>,
//!     _marker: std::marker::PhantomData<fn() -> T>,
//! }
//!
//! impl<T: Send + Sync + 'static> GenericExport for Repository<T> {
//!     fn definition() -> GenericDefId {
//!         GenericDefId::of::<RepositoryDef>()
//!     }
//!
//!     fn type_arguments() -> Vec<TypeInfo> {
//!         vec![TypeInfo::of::<T>()]
//!     }
//!
//!     fn activate(resolution: &mut Resolution<'_>) -> Result<Self> {
//!         Ok(Repository {
//!             audit: resolution.locate::<Audit>()?,
//!             _marker: std::marker::PhantomData,
//!         })
//!     }
//! }
//!
//! let scope = InjectionScope::new();
//! scope.configure(|block| {
//!     block.export(|_| Ok(Audit));
//!     block.export_open_generic::<RepositoryDef>();
//! });
//!
//! let users: Arc<Repository<String>> = scope.locate_generic().unwrap();
//! let counts: Arc<Repository<u32>> = scope.locate_generic().unwrap();
//! ```

use std::any::TypeId;
use std::sync::Arc;

use crate::compiler::Resolution;
use crate::error::Result;
use crate::strategy::ConstraintFn;
use crate::types::TypeInfo;

/// Identity of an open-generic definition, derived from a marker type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GenericDefId(TypeId);

impl GenericDefId {
    pub fn of<D: ?Sized + 'static>() -> Self {
        GenericDefId(TypeId::of::<D>())
    }
}

/// Closed instantiation of an open-generic export.
///
/// One generic impl per binding connects the closed type to its open
/// definition and provides the activation body; everything else about the
/// binding (lifestyle, priority, key, conditions, constraints) is runtime
/// registration data.
pub trait GenericExport: Send + Sync + Sized + 'static {
    /// The open definition this closed type instantiates.
    fn definition() -> GenericDefId;

    /// Type identities of the closed type arguments, in declaration order.
    fn type_arguments() -> Vec<TypeInfo>;

    /// Construct the closed instance, resolving dependencies through the
    /// resolution context.
    fn activate(resolution: &mut Resolution<'_>) -> Result<Self>;
}

/// Constraint predicate helpers for open-generic registrations.
pub mod constraint {
    use super::*;

    /// Requires exactly `count` type arguments.
    pub fn argument_count(count: usize) -> ConstraintFn {
        Arc::new(move |args| args.len() == count)
    }

    /// Requires the argument at `index` to be exactly `T`.
    pub fn argument_is<T: ?Sized + 'static>(index: usize) -> ConstraintFn {
        let expected = TypeId::of::<T>();
        Arc::new(move |args| {
            args.get(index)
                .map(|info| info.type_id == expected)
                .unwrap_or(false)
        })
    }

    /// Requires the argument at `index` to be anything but `T`.
    pub fn argument_is_not<T: ?Sized + 'static>(index: usize) -> ConstraintFn {
        let rejected = TypeId::of::<T>();
        Arc::new(move |args| {
            args.get(index)
                .map(|info| info.type_id != rejected)
                .unwrap_or(false)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_def_id_identity() {
        struct DefA;
        struct DefB;

        assert_eq!(GenericDefId::of::<DefA>(), GenericDefId::of::<DefA>());
        assert_ne!(GenericDefId::of::<DefA>(), GenericDefId::of::<DefB>());
    }

    #[test]
    fn test_constraint_helpers() {
        let args = [TypeInfo::of::<String>(), TypeInfo::of::<u32>()];

        assert!(constraint::argument_count(2)(&args));
        assert!(!constraint::argument_count(1)(&args));
        assert!(constraint::argument_is::<String>(0)(&args));
        assert!(!constraint::argument_is::<String>(1)(&args));
        assert!(constraint::argument_is_not::<String>(1)(&args));
        assert!(!constraint::argument_is::<u8>(5)(&args));
    }
}
