//! Wrapper shapes.
//!
//! Wrappers adapt a request for a container-like type into a request for
//! its element type: factories capture the scope and resolve on call,
//! [`Lazy`] memoises its first resolve, and [`Owned`] bundles a value with
//! a private disposal scope. Collections resolve through
//! [`locate_all`](crate::InjectionScope::locate_all). User-registered
//! wrapper strategies take precedence over these built-ins.
//!
//! # Examples
//!
//! ```rust
//! use gantry_core::InjectionScope;
//! use std::sync::atomic::{AtomicU32, Ordering};
//!
//! static BUILT: AtomicU32 = AtomicU32::new(0);
//!
//! struct Probe(u32);
//!
//! let scope = InjectionScope::new();
//! scope.configure(|block| {
//!     block.export(|_| Ok(Probe(BUILT.fetch_add(1, Ordering::SeqCst))));
//! });
//!
//! let lazy = scope.lazy::<Probe>().unwrap();
//! assert!(!lazy.is_evaluated());
//!
//! let first = lazy.value().unwrap();
//! let second = lazy.value().unwrap();
//! assert_eq!(first.0, second.0);
//! assert_eq!(BUILT.load(Ordering::SeqCst), 1);
//! ```

use std::marker::PhantomData;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::context::InjectionContext;
use crate::disposal::DisposalScope;
use crate::error::Result;
use crate::generics::GenericExport;
use crate::scope::InjectionScope;
use crate::strategy::ActivationDelegate;
use crate::types::{downcast_arc, Injectable, Instance};

type ResolveFn<T> = fn(&InjectionScope, &mut InjectionContext) -> Result<Arc<T>>;

fn resolve_plain<T: Injectable>(
    scope: &InjectionScope,
    ctx: &mut InjectionContext,
) -> Result<Arc<T>> {
    scope.locate_in_context::<T>(ctx)
}

fn resolve_generic<G: GenericExport>(
    scope: &InjectionScope,
    ctx: &mut InjectionContext,
) -> Result<Arc<G>> {
    scope.locate_generic_in_context::<G>(ctx)
}

/// Nullary factory resolving `T` in the captured scope on every call.
pub struct Factory<T: Injectable> {
    scope: InjectionScope,
    resolve: ResolveFn<T>,
}

impl<T: Injectable> Factory<T> {
    /// Factory resolving `T` by type in `scope`.
    pub fn new(scope: InjectionScope) -> Self {
        Self::for_type(scope)
    }

    pub(crate) fn for_type(scope: InjectionScope) -> Self {
        Self {
            scope,
            resolve: resolve_plain::<T>,
        }
    }

    /// Resolve a fresh value (subject to the export's lifestyle).
    pub fn invoke(&self) -> Result<Arc<T>> {
        let mut ctx = InjectionContext::new();
        (self.resolve)(&self.scope, &mut ctx)
    }
}

impl<G: GenericExport> Factory<G> {
    pub(crate) fn for_generic(scope: InjectionScope) -> Self {
        Self {
            scope,
            resolve: resolve_generic::<G>,
        }
    }
}

impl<T: Injectable> Clone for Factory<T> {
    fn clone(&self) -> Self {
        Self {
            scope: self.scope.clone(),
            resolve: self.resolve,
        }
    }
}

impl<T: Injectable> std::fmt::Debug for Factory<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Factory")
            .field("service", &std::any::type_name::<T>())
            .finish()
    }
}

/// Unary factory; the argument is stored positionally in a fresh injection
/// context before `T` resolves.
pub struct FactoryArg<A: Injectable, T: Injectable> {
    scope: InjectionScope,
    resolve: ResolveFn<T>,
    _marker: PhantomData<fn(A)>,
}

impl<A: Injectable, T: Injectable> FactoryArg<A, T> {
    /// Factory resolving `T` by type in `scope`.
    pub fn new(scope: InjectionScope) -> Self {
        Self::for_type(scope)
    }

    pub(crate) fn for_type(scope: InjectionScope) -> Self {
        Self {
            scope,
            resolve: resolve_plain::<T>,
            _marker: PhantomData,
        }
    }

    pub fn invoke(&self, arg: A) -> Result<Arc<T>> {
        let mut ctx = InjectionContext::new();
        ctx.push_positional(Arc::new(arg) as Instance);
        (self.resolve)(&self.scope, &mut ctx)
    }
}

impl<A: Injectable, G: GenericExport> FactoryArg<A, G> {
    pub(crate) fn for_generic(scope: InjectionScope) -> Self {
        Self {
            scope,
            resolve: resolve_generic::<G>,
            _marker: PhantomData,
        }
    }
}

impl<A: Injectable, T: Injectable> Clone for FactoryArg<A, T> {
    fn clone(&self) -> Self {
        Self {
            scope: self.scope.clone(),
            resolve: self.resolve,
            _marker: PhantomData,
        }
    }
}

impl<A: Injectable, T: Injectable> std::fmt::Debug for FactoryArg<A, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FactoryArg")
            .field("argument", &std::any::type_name::<A>())
            .field("service", &std::any::type_name::<T>())
            .finish()
    }
}

/// Binary factory; both arguments are stored positionally, in order.
pub struct FactoryArg2<A1: Injectable, A2: Injectable, T: Injectable> {
    scope: InjectionScope,
    resolve: ResolveFn<T>,
    _marker: PhantomData<fn(A1, A2)>,
}

impl<A1: Injectable, A2: Injectable, T: Injectable> FactoryArg2<A1, A2, T> {
    pub(crate) fn for_type(scope: InjectionScope) -> Self {
        Self {
            scope,
            resolve: resolve_plain::<T>,
            _marker: PhantomData,
        }
    }

    pub fn invoke(&self, first: A1, second: A2) -> Result<Arc<T>> {
        let mut ctx = InjectionContext::new();
        ctx.push_positional(Arc::new(first) as Instance);
        ctx.push_positional(Arc::new(second) as Instance);
        (self.resolve)(&self.scope, &mut ctx)
    }
}

impl<A1: Injectable, A2: Injectable, T: Injectable> Clone for FactoryArg2<A1, A2, T> {
    fn clone(&self) -> Self {
        Self {
            scope: self.scope.clone(),
            resolve: self.resolve,
            _marker: PhantomData,
        }
    }
}

enum LazyResolver<T: Injectable> {
    ByType(ResolveFn<T>),
    Delegate(ActivationDelegate),
}

impl<T: Injectable> Clone for LazyResolver<T> {
    fn clone(&self) -> Self {
        match self {
            LazyResolver::ByType(resolve) => LazyResolver::ByType(*resolve),
            LazyResolver::Delegate(delegate) => LazyResolver::Delegate(delegate.clone()),
        }
    }
}

/// Memoised nullary resolve: `T` is constructed on first use, clones share
/// the memoised value.
pub struct Lazy<T: Injectable> {
    scope: InjectionScope,
    resolver: LazyResolver<T>,
    cell: Arc<OnceCell<Arc<T>>>,
}

impl<T: Injectable> Lazy<T> {
    /// Lazy resolving `T` by type in `scope` on first use.
    pub fn new(scope: InjectionScope) -> Self {
        Self::for_type(scope)
    }

    pub(crate) fn for_type(scope: InjectionScope) -> Self {
        Self {
            scope,
            resolver: LazyResolver::ByType(resolve_plain::<T>),
            cell: Arc::new(OnceCell::new()),
        }
    }

    pub(crate) fn from_delegate(scope: InjectionScope, delegate: ActivationDelegate) -> Self {
        Self {
            scope,
            resolver: LazyResolver::Delegate(delegate),
            cell: Arc::new(OnceCell::new()),
        }
    }

    /// Resolve on first call, then return the memoised instance.
    pub fn value(&self) -> Result<Arc<T>> {
        self.cell
            .get_or_try_init(|| {
                let mut ctx = InjectionContext::new();
                match &self.resolver {
                    LazyResolver::ByType(resolve) => resolve(&self.scope, &mut ctx),
                    LazyResolver::Delegate(delegate) => {
                        let instance =
                            delegate(&self.scope, self.scope.disposal_scope(), &mut ctx)?;
                        downcast_arc::<T>(instance)
                    }
                }
            })
            .cloned()
    }

    pub fn is_evaluated(&self) -> bool {
        self.cell.get().is_some()
    }
}

impl<G: GenericExport> Lazy<G> {
    pub(crate) fn for_generic(scope: InjectionScope) -> Self {
        Self {
            scope,
            resolver: LazyResolver::ByType(resolve_generic::<G>),
            cell: Arc::new(OnceCell::new()),
        }
    }
}

impl<T: Injectable> Clone for Lazy<T> {
    fn clone(&self) -> Self {
        Self {
            scope: self.scope.clone(),
            resolver: self.resolver.clone(),
            cell: self.cell.clone(),
        }
    }
}

impl<T: Injectable> std::fmt::Debug for Lazy<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lazy")
            .field("service", &std::any::type_name::<T>())
            .field("evaluated", &self.is_evaluated())
            .finish()
    }
}

/// A resolved value bundled with its own disposal scope.
///
/// Disposables registered during the resolve belong to this handle, not to
/// the locating scope; dropping (or explicitly disposing) the handle
/// releases them in LIFO order.
pub struct Owned<T: Injectable> {
    value: Arc<T>,
    disposal: DisposalScope,
}

impl<T: Injectable> Owned<T> {
    pub(crate) fn new(value: Arc<T>, disposal: DisposalScope) -> Self {
        Self { value, disposal }
    }

    pub fn value(&self) -> &Arc<T> {
        &self.value
    }

    /// Release the bundled disposables now.
    pub fn dispose(self) {
        self.disposal.dispose();
    }
}

impl<T: Injectable> std::ops::Deref for Owned<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: Injectable> std::fmt::Debug for Owned<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Owned")
            .field("service", &std::any::type_name::<T>())
            .field("disposal", &self.disposal)
            .finish()
    }
}
