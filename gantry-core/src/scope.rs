//! Injection scopes.
//!
//! An [`InjectionScope`] is a node in the container tree. The root owns the
//! strategy containers and the compiled-delegate cache; lifetime scopes
//! created with [`begin_lifetime_scope`](InjectionScope::begin_lifetime_scope)
//! share both and add only their own disposal scope, while child scopes
//! created with [`create_child_scope`](InjectionScope::create_child_scope)
//! carry their own registrations that shadow ancestors.
//!
//! # Examples
//!
//! ```rust
//! use gantry_core::InjectionScope;
//! use std::sync::Arc;
//!
//! #[derive(Clone)]
//! struct Database {
//!     url: String,
//! }
//!
//! struct UserService {
//!     db: Arc<Database>,
//! }
//!
//! let scope = InjectionScope::new();
//! scope.configure(|block| {
//!     block
//!         .export(|_| {
//!             Ok(Database {
//!                 url: "postgres://localhost".to_string(),
//!             })
//!         })
//!         .singleton();
//!     block.export(|r| {
//!         Ok(UserService {
//!             db: r.locate::<Database>()?,
//!         })
//!     });
//! });
//!
//! let users = scope.locate::<UserService>().unwrap();
//! assert_eq!(users.db.url, "postgres://localhost");
//! ```
//!
//! ## Lifetime scopes
//!
//! ```rust
//! use gantry_core::InjectionScope;
//!
//! #[derive(Clone)]
//! struct RequestState;
//!
//! let root = InjectionScope::new();
//! root.configure(|block| {
//!     block.export(|_| Ok(RequestState)).per_scope();
//! });
//!
//! let request = root.begin_lifetime_scope("request");
//! let a = request.locate::<RequestState>().unwrap();
//! let b = request.locate::<RequestState>().unwrap();
//! assert!(std::sync::Arc::ptr_eq(&a, &b));
//! request.dispose();
//! ```

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};

use crate::cache::DelegateCache;
use crate::collection::StrategyContainer;
use crate::compiler::{self, Resolution};
use crate::config::ScopeConfiguration;
use crate::context::InjectionContext;
use crate::disposal::DisposalScope;
use crate::error::{LocateError, Result};
use crate::generics::GenericExport;
use crate::logging::{debug, trace};
use crate::registration::{
    ConfigurationModule, MissingExportProvider, RegistrationBlock, StrategyInspector, ValueProvider,
};
use crate::strategy::{ActivationStrategy, RequestOrigin, StrategyFilter};
use crate::types::{downcast_arc, downcast_trait, ExportKey, Injectable, Instance, TypeInfo};
use crate::wrappers::{Factory, FactoryArg, FactoryArg2, Lazy, Owned};

/// Name of the lock object serializing configure calls on a scope.
pub const ACTIVATION_STRATEGY_ADD_LOCK: &str = "ActivationStrategyAddLock";

static SCOPE_COUNTER: AtomicU64 = AtomicU64::new(1);

/// One atomically published registration snapshot: exports, wrappers,
/// decorators, and providers are replaced together so a configure batch is
/// observed all-or-none.
#[derive(Clone, Default)]
pub(crate) struct RegistrySnapshot {
    pub exports: StrategyContainer,
    pub wrappers: StrategyContainer,
    pub decorators: StrategyContainer,
    pub value_providers: Vec<Arc<dyn ValueProvider>>,
    pub missing_providers: Vec<Arc<dyn MissingExportProvider>>,
}

struct ContainerLayer {
    snapshot: RwLock<Arc<RegistrySnapshot>>,
    inspectors: RwLock<Vec<Arc<dyn StrategyInspector>>>,
}

impl ContainerLayer {
    fn empty() -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(RegistrySnapshot::default())),
            inspectors: RwLock::new(Vec::new()),
        }
    }
}

type LockTable = DashMap<String, Arc<Mutex<()>>, ahash::RandomState>;
type LifestyleStorage = DashMap<(u64, TypeId), Arc<OnceCell<Instance>>, ahash::RandomState>;

struct ScopeInner {
    id: OnceCell<u64>,
    name: String,
    parent: Option<InjectionScope>,
    containers: OnceCell<ContainerLayer>,
    cache: RwLock<DelegateCache>,
    disposal: DisposalScope,
    extra: RwLock<HashMap<String, Instance>>,
    locks: LockTable,
    lifestyle_storage: LifestyleStorage,
    config: Arc<ScopeConfiguration>,
    disposed: AtomicBool,
}

/// Request options for [`InjectionScope::locate_with`] and
/// [`InjectionScope::locate_all_with`]. A key, filter, or the dynamic flag
/// bypasses the compiled-delegate cache.
#[derive(Default)]
pub struct LocateOptions {
    pub(crate) key: Option<ExportKey>,
    pub(crate) filter: Option<StrategyFilter>,
    pub(crate) dynamic: bool,
    pub(crate) extra: Vec<(String, Instance)>,
}

impl LocateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(mut self, key: impl Into<ExportKey>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn filter(
        mut self,
        filter: impl Fn(&ActivationStrategy) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Skip the delegate cache entirely, both read and publish.
    pub fn dynamic(mut self) -> Self {
        self.dynamic = true;
        self
    }

    /// Seed the injection context with a keyed value.
    pub fn extra_value<T: Injectable>(mut self, key: impl Into<String>, value: T) -> Self {
        self.extra.push((key.into(), Arc::new(value) as Instance));
        self
    }
}

/// A declared constructor dependency that [`InjectionScope::validate`]
/// found unresolvable.
#[derive(Debug, Clone)]
pub struct DependencyIssue {
    /// Export whose declared dependency is missing.
    pub exported: TypeInfo,
    /// The unresolvable parameter type.
    pub dependency: TypeInfo,
    /// Declared parameter name.
    pub param_name: &'static str,
}

impl std::fmt::Display for DependencyIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "'{}' declares parameter '{}' of type '{}' but no export matches it",
            self.exported, self.param_name, self.dependency
        )
    }
}

pub(crate) struct ResolveSpec<'r> {
    pub target: TypeInfo,
    pub key: Option<&'r ExportKey>,
    pub filter: Option<&'r StrategyFilter>,
    pub origin: RequestOrigin,
    pub dynamic: bool,
}

impl ResolveSpec<'_> {
    pub(crate) fn plain(target: TypeInfo, origin: RequestOrigin) -> ResolveSpec<'static> {
        ResolveSpec {
            target,
            key: None,
            filter: None,
            origin,
            dynamic: false,
        }
    }
}

/// A node in the scope tree and the entry point for resolution.
#[derive(Clone)]
pub struct InjectionScope {
    inner: Arc<ScopeInner>,
}

impl InjectionScope {
    /// Root scope with default configuration.
    pub fn new() -> Self {
        Self::with_configuration(ScopeConfiguration::default())
    }

    /// Root scope with explicit configuration.
    pub fn with_configuration(config: ScopeConfiguration) -> Self {
        let config = Arc::new(config);
        let containers = OnceCell::new();
        let _ = containers.set(ContainerLayer::empty());
        let scope = Self {
            inner: Arc::new(ScopeInner {
                id: OnceCell::new(),
                name: String::new(),
                parent: None,
                containers,
                cache: RwLock::new(DelegateCache::new(config.cache_shards)),
                disposal: DisposalScope::new(),
                extra: RwLock::new(HashMap::new()),
                locks: LockTable::default(),
                lifestyle_storage: LifestyleStorage::default(),
                config,
                disposed: AtomicBool::new(false),
            }),
        };
        debug!(scope_id = scope.scope_id(), "Created root injection scope");
        scope
    }

    /// Short-lived child for per-request graphs.
    ///
    /// Shares the parent's strategy containers and delegate cache; owns its
    /// name, id, disposal scope, and per-scope lifestyle storage.
    pub fn begin_lifetime_scope(&self, name: impl Into<String>) -> InjectionScope {
        let scope = Self {
            inner: Arc::new(ScopeInner {
                id: OnceCell::new(),
                name: name.into(),
                parent: Some(self.clone()),
                containers: OnceCell::new(),
                cache: RwLock::new(self.inner.cache.read().clone()),
                disposal: DisposalScope::new(),
                extra: RwLock::new(HashMap::new()),
                locks: LockTable::default(),
                lifestyle_storage: LifestyleStorage::default(),
                config: self.inner.config.clone(),
                disposed: AtomicBool::new(false),
            }),
        };
        debug!(
            scope_id = scope.scope_id(),
            parent_id = self.scope_id(),
            scope_name = scope.scope_name(),
            "Began lifetime scope"
        );
        scope
    }

    /// Child scope carrying its own registrations, which shadow ancestors.
    pub fn create_child_scope(
        &self,
        name: impl Into<String>,
        registration: impl FnOnce(&mut RegistrationBlock),
    ) -> InjectionScope {
        let config = self.inner.config.clone();
        let containers = OnceCell::new();
        let _ = containers.set(ContainerLayer::empty());
        let scope = Self {
            inner: Arc::new(ScopeInner {
                id: OnceCell::new(),
                name: name.into(),
                parent: Some(self.clone()),
                containers,
                cache: RwLock::new(DelegateCache::new(config.cache_shards)),
                disposal: DisposalScope::new(),
                extra: RwLock::new(HashMap::new()),
                locks: LockTable::default(),
                lifestyle_storage: LifestyleStorage::default(),
                config,
                disposed: AtomicBool::new(false),
            }),
        };
        debug!(
            scope_id = scope.scope_id(),
            parent_id = self.scope_id(),
            "Created child scope"
        );
        scope.configure(registration);
        scope
    }

    // ---- scope properties ----------------------------------------------

    /// Unique scope id, assigned on first observation and stable afterwards.
    pub fn scope_id(&self) -> u64 {
        *self
            .inner
            .id
            .get_or_init(|| SCOPE_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn scope_name(&self) -> &str {
        &self.inner.name
    }

    pub fn parent(&self) -> Option<InjectionScope> {
        self.inner.parent.clone()
    }

    pub fn config(&self) -> &ScopeConfiguration {
        &self.inner.config
    }

    /// Walk to the root of the scope tree.
    pub fn root_scope(&self) -> InjectionScope {
        let mut current = self.clone();
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current
    }

    /// This scope's disposal scope.
    pub fn disposal_scope(&self) -> &DisposalScope {
        &self.inner.disposal
    }

    /// Named lock object, created on first request.
    pub fn get_lock_object(&self, name: &str) -> Arc<Mutex<()>> {
        self.inner
            .locks
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    // ---- extra data ----------------------------------------------------

    pub fn get_extra_data(&self, key: &str) -> Option<Instance> {
        self.inner.extra.read().get(key).cloned()
    }

    pub fn get_extra_data_as<T: Injectable>(&self, key: &str) -> Option<Arc<T>> {
        self.get_extra_data(key)
            .and_then(|value| value.downcast::<T>().ok())
    }

    pub fn set_extra_data<T: Injectable>(&self, key: impl Into<String>, value: T) {
        self.inner
            .extra
            .write()
            .insert(key.into(), Arc::new(value) as Instance);
    }

    pub fn keys(&self) -> Vec<String> {
        self.inner.extra.read().keys().cloned().collect()
    }

    pub fn values(&self) -> Vec<Instance> {
        self.inner.extra.read().values().cloned().collect()
    }

    // ---- disposal ------------------------------------------------------

    /// Dispose this scope's disposables in LIFO order. Idempotent; parent
    /// and child scopes are unaffected.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!(scope_id = self.scope_id(), "Disposing scope");
        self.inner.disposal.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(LocateError::ScopeDisposed {
                scope_name: self.describe(),
            });
        }
        Ok(())
    }

    fn describe(&self) -> String {
        if self.inner.name.is_empty() {
            format!("scope-{}", self.scope_id())
        } else {
            self.inner.name.clone()
        }
    }

    // ---- configuration -------------------------------------------------

    /// Apply a registration block atomically.
    ///
    /// Takes the `"ActivationStrategyAddLock"` named lock, runs the block,
    /// then merges inspectors, providers, wrapper and decorator strategies,
    /// and exports (plus secondary strategies) into this scope's containers
    /// in one snapshot publish.
    pub fn configure(&self, registration: impl FnOnce(&mut RegistrationBlock)) {
        let lock = self.get_lock_object(ACTIVATION_STRATEGY_ADD_LOCK);
        let _guard = lock.lock();
        let mut block = RegistrationBlock::new();
        registration(&mut block);
        self.apply_block(block);
    }

    /// Apply a reusable configuration module.
    pub fn configure_module(&self, module: &dyn ConfigurationModule) {
        self.configure(|block| module.configure(block));
    }

    fn apply_block(&self, block: RegistrationBlock) {
        let had_containers = self.inner.containers.get().is_some();
        let layer = self.inner.containers.get_or_init(ContainerLayer::empty);
        if !had_containers {
            // A scope that gains its own registrations stops sharing the
            // parent's delegate cache; shared entries would shadow them.
            *self.inner.cache.write() = DelegateCache::new(self.inner.config.cache_shards);
        }

        let (exports, wrappers, decorators, inspectors, missing, values) = block.into_parts();

        layer.inspectors.write().extend(inspectors);
        let active_inspectors = layer.inspectors.read().clone();

        let current = layer.snapshot.read().clone();
        let mut next = (*current).clone();
        let mut count = 0usize;

        for mut strategy in exports {
            for inspector in &active_inspectors {
                inspector.inspect(&mut strategy);
            }
            trace!(
                service = strategy.export_type().type_name,
                strategy_id = strategy.id(),
                "Export strategy registered"
            );
            next.exports.add_strategy(strategy);
            count += 1;
        }
        for mut strategy in wrappers {
            for inspector in &active_inspectors {
                inspector.inspect(&mut strategy);
            }
            next.wrappers.add_strategy(strategy);
            count += 1;
        }
        for mut strategy in decorators {
            for inspector in &active_inspectors {
                inspector.inspect(&mut strategy);
            }
            next.decorators.add_strategy(strategy);
            count += 1;
        }
        next.value_providers.extend(values);
        next.missing_providers.extend(missing);

        *layer.snapshot.write() = Arc::new(next);
        debug!(
            scope_id = self.scope_id(),
            strategies = count,
            "Configure batch merged"
        );
    }

    /// Install a single strategy, used by the missing-export path.
    pub(crate) fn install_strategy(&self, strategy: ActivationStrategy) -> Arc<ActivationStrategy> {
        let lock = self.get_lock_object(ACTIVATION_STRATEGY_ADD_LOCK);
        let _guard = lock.lock();
        let layer = self.inner.containers.get_or_init(ContainerLayer::empty);
        let current = layer.snapshot.read().clone();
        let mut next = (*current).clone();
        let installed = next.exports.add_strategy(strategy);
        *layer.snapshot.write() = Arc::new(next);
        installed
    }

    // ---- resolution ----------------------------------------------------

    /// Resolve a service by type.
    pub fn locate<T: Injectable>(&self) -> Result<Arc<T>> {
        let mut ctx = InjectionContext::new();
        self.locate_in_context::<T>(&mut ctx)
    }

    /// Resolve a service inside an existing injection context.
    pub fn locate_in_context<T: Injectable>(&self, ctx: &mut InjectionContext) -> Result<Arc<T>> {
        let instance = self.resolve_erased(
            ResolveSpec::plain(TypeInfo::of::<T>(), RequestOrigin::Root),
            ctx,
            None,
        )?;
        downcast_arc(instance)
    }

    /// Resolve with request options; a key, filter, or dynamic flag
    /// bypasses the delegate cache.
    pub fn locate_with<T: Injectable>(&self, options: LocateOptions) -> Result<Arc<T>> {
        let mut ctx = InjectionContext::with_extra_data(options.extra);
        let spec = ResolveSpec {
            target: TypeInfo::of::<T>(),
            key: options.key.as_ref(),
            filter: options.filter.as_ref(),
            origin: RequestOrigin::Root,
            dynamic: options.dynamic,
        };
        let instance = self.resolve_erased(spec, &mut ctx, None)?;
        downcast_arc(instance)
    }

    /// Resolve, downgrading a missing export to `None`. Other errors
    /// propagate.
    pub fn try_locate<T: Injectable>(&self) -> Result<Option<Arc<T>>> {
        match self.locate::<T>() {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.is_missing_export() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Resolve a service exported as trait object `I`.
    pub fn locate_trait<I: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<I>> {
        let mut ctx = InjectionContext::new();
        let instance = self.resolve_erased(
            ResolveSpec::plain(TypeInfo::of::<I>(), RequestOrigin::Root),
            &mut ctx,
            None,
        )?;
        downcast_trait(instance)
    }

    pub fn try_locate_trait<I: ?Sized + Send + Sync + 'static>(&self) -> Result<Option<Arc<I>>> {
        match self.locate_trait::<I>() {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.is_missing_export() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Resolve a closed instantiation of an open-generic export.
    pub fn locate_generic<G: GenericExport>(&self) -> Result<Arc<G>> {
        let mut ctx = InjectionContext::new();
        self.locate_generic_in_context::<G>(&mut ctx)
    }

    pub fn locate_generic_in_context<G: GenericExport>(
        &self,
        ctx: &mut InjectionContext,
    ) -> Result<Arc<G>> {
        let instance = self.resolve_generic_erased::<G>(None, None, false, ctx, None)?;
        downcast_arc(instance)
    }

    pub fn try_locate_generic<G: GenericExport>(&self) -> Result<Option<Arc<G>>> {
        match self.locate_generic::<G>() {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.is_missing_export() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Resolve a strategy registered under a name.
    pub fn locate_by_name(&self, name: &str) -> Result<Instance> {
        self.ensure_live()?;
        let entry = compiler::compile_named(self, name)?;
        let mut ctx = InjectionContext::new();
        (entry.delegate)(self, self.disposal_scope(), &mut ctx)
    }

    /// Named resolve downcast to a concrete type.
    pub fn locate_by_name_as<T: Injectable>(&self, name: &str) -> Result<Arc<T>> {
        self.locate_by_name(name).and_then(downcast_arc)
    }

    pub fn try_locate_by_name(&self, name: &str) -> Result<Option<Instance>> {
        match self.locate_by_name(name) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.is_missing_export() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Resolve every matching export for `T`, this scope's registrations
    /// first, then the parent chain. Order within one container is priority
    /// descending, insertion ascending. Each element activates with a
    /// cloned context.
    pub fn locate_all<T: Injectable>(&self) -> Result<Vec<Arc<T>>> {
        self.locate_all_with(LocateOptions::new())
    }

    pub fn locate_all_with<T: Injectable>(&self, options: LocateOptions) -> Result<Vec<Arc<T>>> {
        self.ensure_live()?;
        let delegates = compiler::compile_collection(
            self,
            TypeInfo::of::<T>(),
            options.key.as_ref(),
            options.filter.as_ref(),
        );
        let base_ctx = InjectionContext::with_extra_data(options.extra);
        let mut out = Vec::with_capacity(delegates.len());
        for delegate in delegates {
            let mut ctx = base_ctx.clone();
            let instance = delegate(self, self.disposal_scope(), &mut ctx)?;
            out.push(downcast_arc::<T>(instance)?);
        }
        trace!(
            service = std::any::type_name::<T>(),
            count = out.len(),
            "Resolved collection"
        );
        Ok(out)
    }

    /// Collection resolve materialized as a contiguous array.
    pub fn locate_array<T: Injectable>(&self) -> Result<Box<[Arc<T>]>> {
        self.locate_all::<T>().map(Vec::into_boxed_slice)
    }

    /// Collection resolve with a stable comparator sort applied.
    pub fn locate_all_sorted<T: Injectable>(
        &self,
        comparator: impl Fn(&Arc<T>, &Arc<T>) -> std::cmp::Ordering,
    ) -> Result<Vec<Arc<T>>> {
        let mut all = self.locate_all::<T>()?;
        all.sort_by(comparator);
        Ok(all)
    }

    /// One [`Lazy`] per matching export; nothing activates until each lazy
    /// is forced.
    pub fn locate_all_lazy<T: Injectable>(&self) -> Vec<Lazy<T>> {
        compiler::compile_collection(self, TypeInfo::of::<T>(), None, None)
            .into_iter()
            .map(|delegate| Lazy::from_delegate(self.clone(), delegate))
            .collect()
    }

    /// Static check: does any export for `T` exist after key and filter
    /// consideration? Conditions are ignored.
    pub fn can_locate<T: Injectable>(&self) -> bool {
        self.can_locate_with::<T>(None, None)
    }

    pub fn can_locate_with<T: Injectable>(
        &self,
        key: Option<&ExportKey>,
        filter: Option<&StrategyFilter>,
    ) -> bool {
        for level in self.chain() {
            let Some(registry) = level.registry() else {
                continue;
            };
            if let Some(collection) = registry.exports.get_collection(TypeId::of::<T>()) {
                if !collection.get_strategies(filter, key).is_empty() {
                    return true;
                }
            }
        }
        false
    }

    /// Static check for a closed open-generic instantiation, constraints
    /// included, conditions ignored. An exact closed export for the
    /// instantiation also counts.
    pub fn can_locate_generic<G: GenericExport>(&self) -> bool {
        if self.has_keyless_export(TypeId::of::<G>()) {
            return true;
        }
        let arguments = G::type_arguments();
        for level in self.chain() {
            let Some(registry) = level.registry() else {
                continue;
            };
            if let Some(collection) = registry.exports.get_open_collection(G::definition()) {
                if collection
                    .get_strategies(None, None)
                    .iter()
                    .any(|strategy| strategy.satisfies_constraints(&arguments))
                {
                    return true;
                }
            }
        }
        false
    }

    /// Check every declared dependency descriptor against the exports
    /// visible from this scope.
    ///
    /// Optional dependencies are skipped. Only the export indices are
    /// consulted (not value or missing-export providers), so an issue
    /// means a plain `locate` for the parameter type would find no
    /// registration.
    pub fn validate(&self) -> Vec<DependencyIssue> {
        let mut issues = Vec::new();
        for level in self.chain() {
            let Some(registry) = level.registry() else {
                continue;
            };
            for strategy in registry.exports.all_strategies() {
                for dependency in strategy.dependencies() {
                    if dependency.optional {
                        continue;
                    }
                    if !self.has_keyless_export(dependency.type_info.type_id) {
                        issues.push(DependencyIssue {
                            exported: strategy.export_type(),
                            dependency: dependency.type_info,
                            param_name: dependency.param_name,
                        });
                    }
                }
            }
        }
        if !issues.is_empty() {
            debug!(
                scope_id = self.scope_id(),
                issues = issues.len(),
                "Validation found unresolvable declared dependencies"
            );
        }
        issues
    }

    fn has_keyless_export(&self, type_id: TypeId) -> bool {
        for level in self.chain() {
            let Some(registry) = level.registry() else {
                continue;
            };
            if let Some(collection) = registry.exports.get_collection(type_id) {
                if !collection.get_strategies(None, None).is_empty() {
                    return true;
                }
            }
        }
        false
    }

    /// Fresh injection context seeded with extra data.
    pub fn create_context(
        &self,
        extra: impl IntoIterator<Item = (String, Instance)>,
    ) -> InjectionContext {
        InjectionContext::with_extra_data(extra)
    }

    // ---- wrapper entry points ------------------------------------------

    /// Nullary factory for `T`. A user wrapper strategy registered for
    /// `Factory<T>` takes precedence over the built-in shape.
    pub fn factory<T: Injectable>(&self) -> Result<Factory<T>> {
        if let Some(strategy) = compiler::find_wrapper_strategy(self, TypeInfo::of::<Factory<T>>())
        {
            return self.activate_custom_wrapper::<Factory<T>>(&strategy);
        }
        Ok(Factory::for_type(self.clone()))
    }

    /// Nullary factory for a closed open-generic export.
    pub fn factory_generic<G: GenericExport>(&self) -> Result<Factory<G>> {
        Ok(Factory::for_generic(self.clone()))
    }

    /// Unary factory; the argument is stored positionally in a fresh
    /// context before `T` resolves.
    pub fn factory_arg<A: Injectable, T: Injectable>(&self) -> Result<FactoryArg<A, T>> {
        if let Some(strategy) =
            compiler::find_wrapper_strategy(self, TypeInfo::of::<FactoryArg<A, T>>())
        {
            return self.activate_custom_wrapper::<FactoryArg<A, T>>(&strategy);
        }
        Ok(FactoryArg::for_type(self.clone()))
    }

    pub fn factory_arg_generic<A: Injectable, G: GenericExport>(
        &self,
    ) -> Result<FactoryArg<A, G>> {
        Ok(FactoryArg::for_generic(self.clone()))
    }

    /// Binary factory.
    pub fn factory_arg2<A1: Injectable, A2: Injectable, T: Injectable>(
        &self,
    ) -> Result<FactoryArg2<A1, A2, T>> {
        if let Some(strategy) =
            compiler::find_wrapper_strategy(self, TypeInfo::of::<FactoryArg2<A1, A2, T>>())
        {
            return self.activate_custom_wrapper::<FactoryArg2<A1, A2, T>>(&strategy);
        }
        Ok(FactoryArg2::for_type(self.clone()))
    }

    /// Memoised lazy resolve of `T`.
    pub fn lazy<T: Injectable>(&self) -> Result<Lazy<T>> {
        if let Some(strategy) = compiler::find_wrapper_strategy(self, TypeInfo::of::<Lazy<T>>()) {
            return self.activate_custom_wrapper::<Lazy<T>>(&strategy);
        }
        Ok(Lazy::for_type(self.clone()))
    }

    pub fn lazy_generic<G: GenericExport>(&self) -> Result<Lazy<G>> {
        Ok(Lazy::for_generic(self.clone()))
    }

    /// Resolve `T` into a fresh disposal scope bundled with the value.
    pub fn owned<T: Injectable>(&self) -> Result<Owned<T>> {
        let disposal = DisposalScope::new();
        let mut ctx = InjectionContext::new();
        let instance = self.resolve_erased(
            ResolveSpec::plain(TypeInfo::of::<T>(), RequestOrigin::Wrapper),
            &mut ctx,
            Some(&disposal),
        )?;
        Ok(Owned::new(downcast_arc::<T>(instance)?, disposal))
    }

    fn activate_custom_wrapper<W: Injectable + Clone>(
        &self,
        strategy: &Arc<ActivationStrategy>,
    ) -> Result<W> {
        trace!(
            wrapper = std::any::type_name::<W>(),
            strategy_id = strategy.id(),
            "Activating user wrapper strategy"
        );
        let mut ctx = InjectionContext::new();
        let activation = strategy.activation();
        let mut resolution = Resolution::new(self, self.disposal_scope(), &mut ctx);
        let instance = activation(&mut resolution)?;
        let wrapper = downcast_arc::<W>(instance)?;
        Ok((*wrapper).clone())
    }

    // ---- engine internals ----------------------------------------------

    /// Scope chain, self first, root last.
    pub(crate) fn chain(&self) -> Vec<InjectionScope> {
        let mut chain = vec![self.clone()];
        let mut current = self.clone();
        while let Some(parent) = current.parent() {
            chain.push(parent.clone());
            current = parent;
        }
        chain
    }

    /// Current registration snapshot, if this scope owns containers.
    pub(crate) fn registry(&self) -> Option<Arc<RegistrySnapshot>> {
        self.inner
            .containers
            .get()
            .map(|layer| layer.snapshot.read().clone())
    }

    pub(crate) fn lifestyle_cell(&self, slot: (u64, TypeId)) -> Arc<OnceCell<Instance>> {
        self.inner
            .lifestyle_storage
            .entry(slot)
            .or_default()
            .clone()
    }

    pub(crate) fn resolve_erased(
        &self,
        spec: ResolveSpec<'_>,
        ctx: &mut InjectionContext,
        disposal: Option<&DisposalScope>,
    ) -> Result<Instance> {
        self.ensure_live()?;
        self.guard_chain(spec.target, spec.key, ctx)?;

        let plain = spec.key.is_none() && spec.filter.is_none() && !spec.dynamic;
        let cached = if plain {
            self.inner.cache.read().get(&spec.target.type_id)
        } else {
            None
        };

        let delegate = match cached {
            Some(delegate) => {
                trace!(service = spec.target.type_name, "Delegate cache hit");
                delegate
            }
            None => {
                let entry = compiler::compile_for_type(
                    self,
                    spec.target,
                    spec.key,
                    spec.filter,
                    spec.origin,
                    ctx.chain_names(),
                )?;
                if plain && entry.cacheable {
                    self.inner
                        .cache
                        .read()
                        .install(spec.target.type_id, entry.delegate)
                } else {
                    entry.delegate
                }
            }
        };

        self.run_delegate(delegate, spec.target, spec.key, ctx, disposal)
    }

    pub(crate) fn resolve_generic_erased<G: GenericExport>(
        &self,
        key: Option<&ExportKey>,
        filter: Option<&StrategyFilter>,
        dynamic: bool,
        ctx: &mut InjectionContext,
        disposal: Option<&DisposalScope>,
    ) -> Result<Instance> {
        self.ensure_live()?;
        let target = TypeInfo::of::<G>();
        self.guard_chain(target, key, ctx)?;

        let plain = key.is_none() && filter.is_none() && !dynamic;
        let cached = if plain {
            self.inner.cache.read().get(&target.type_id)
        } else {
            None
        };

        let delegate = match cached {
            Some(delegate) => delegate,
            None => {
                let entry =
                    compiler::compile_for_generic::<G>(self, key, filter, ctx.chain_names())?;
                if plain && entry.cacheable {
                    self.inner.cache.read().install(target.type_id, entry.delegate)
                } else {
                    entry.delegate
                }
            }
        };

        self.run_delegate(delegate, target, key, ctx, disposal)
    }

    fn guard_chain(
        &self,
        target: TypeInfo,
        key: Option<&ExportKey>,
        ctx: &InjectionContext,
    ) -> Result<()> {
        if ctx.chain_contains(target.type_id, key) || ctx.chain_len() >= self.inner.config.max_resolution_depth
        {
            let mut chain = ctx.chain_names();
            chain.push(target.type_name.to_string());
            return Err(LocateError::CircularDependency { chain });
        }
        Ok(())
    }

    fn run_delegate(
        &self,
        delegate: crate::strategy::ActivationDelegate,
        target: TypeInfo,
        key: Option<&ExportKey>,
        ctx: &mut InjectionContext,
        disposal: Option<&DisposalScope>,
    ) -> Result<Instance> {
        ctx.push_frame(target, key.cloned());
        let disposal_scope = disposal.unwrap_or_else(|| self.disposal_scope());
        let result = delegate(self, disposal_scope, ctx);
        ctx.pop_frame();
        result
    }
}

impl Default for InjectionScope {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InjectionScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InjectionScope")
            .field("id", &self.inner.id.get())
            .field("name", &self.inner.name)
            .field("has_parent", &self.inner.parent.is_some())
            .field("owns_containers", &self.inner.containers.get().is_some())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug)]
    struct Widget {
        label: &'static str,
    }

    fn configured_scope() -> InjectionScope {
        let scope = InjectionScope::new();
        scope.configure(|block| {
            block.export(|_| Ok(Widget { label: "root" }));
        });
        scope
    }

    #[test]
    fn test_scope_ids_unique_and_stable() {
        let root = InjectionScope::new();
        let child = root.begin_lifetime_scope("child");

        let id = child.scope_id();
        assert_ne!(root.scope_id(), id);
        assert_eq!(child.scope_id(), id);
    }

    #[test]
    fn test_locate_after_dispose_fails() {
        let scope = configured_scope();
        scope.dispose();

        let err = scope.locate::<Widget>().unwrap_err();
        assert!(matches!(err, LocateError::ScopeDisposed { .. }));
    }

    #[test]
    fn test_lifetime_scope_resolves_parent_exports() {
        let scope = configured_scope();
        let request = scope.begin_lifetime_scope("request");

        let widget = request.locate::<Widget>().unwrap();
        assert_eq!(widget.label, "root");
    }

    #[test]
    fn test_child_scope_shadows_parent() {
        let scope = configured_scope();
        let child = scope.create_child_scope("child", |block| {
            block.export(|_| Ok(Widget { label: "child" }));
        });

        assert_eq!(child.locate::<Widget>().unwrap().label, "child");
        assert_eq!(scope.locate::<Widget>().unwrap().label, "root");
    }

    #[test]
    fn test_extra_data_roundtrip() {
        let scope = InjectionScope::new();
        scope.set_extra_data("tenant", "acme".to_string());

        let tenant = scope.get_extra_data_as::<String>("tenant").unwrap();
        assert_eq!(tenant.as_str(), "acme");
        assert_eq!(scope.keys(), vec!["tenant".to_string()]);
        assert_eq!(scope.values().len(), 1);
    }

    #[test]
    fn test_lock_object_identity() {
        let scope = InjectionScope::new();
        let a = scope.get_lock_object("migration");
        let b = scope.get_lock_object("migration");
        let c = scope.get_lock_object("other");

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn test_can_locate_ignores_conditions() {
        let scope = InjectionScope::new();
        scope.configure(|block| {
            block.export(|_| Ok(Widget { label: "guarded" })).when(|_| false);
        });

        assert!(scope.can_locate::<Widget>());
        assert!(scope.locate::<Widget>().is_err());
    }

    #[test]
    fn test_keyed_request_bypasses_cache() {
        let scope = InjectionScope::new();
        scope.configure(|block| {
            block.export(|_| Ok(Widget { label: "keyless" }));
            block.export(|_| Ok(Widget { label: "keyed" })).with_key("alt");
        });

        assert_eq!(scope.locate::<Widget>().unwrap().label, "keyless");
        let keyed = scope
            .locate_with::<Widget>(LocateOptions::new().key("alt"))
            .unwrap();
        assert_eq!(keyed.label, "keyed");
        // The keyless path is still served by the cached delegate.
        assert_eq!(scope.locate::<Widget>().unwrap().label, "keyless");
    }
}
