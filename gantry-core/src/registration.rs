//! Registration block and fluent export builders.
//!
//! A [`RegistrationBlock`] collects everything one `configure` call wants to
//! add: export, wrapper, and decorator strategies, inspectors,
//! missing-export providers, and value providers. The owning scope merges
//! the block atomically when the configure call returns.
//!
//! # Examples
//!
//! ```rust
//! use gantry_core::InjectionScope;
//! use std::sync::Arc;
//!
//! trait Greeter: Send + Sync {
//!     fn greet(&self) -> String;
//! }
//!
//! struct EnglishGreeter;
//! impl Greeter for EnglishGreeter {
//!     fn greet(&self) -> String {
//!         "hello".to_string()
//!     }
//! }
//!
//! let scope = InjectionScope::new();
//! scope.configure(|block| {
//!     block
//!         .export(|_| Ok(EnglishGreeter))
//!         .singleton()
//!         .as_name("EnglishGreeter")
//!         .as_trait(|service| service as Arc<dyn Greeter>);
//! });
//!
//! let greeter = scope.locate_trait::<dyn Greeter>().unwrap();
//! assert_eq!(greeter.greet(), "hello");
//! ```

use std::marker::PhantomData;
use std::sync::Arc;

use crate::compiler::Resolution;
use crate::error::Result;
use crate::generics::GenericDefId;
use crate::lifestyle::Lifestyle;
use crate::strategy::{
    ActivationFn, ActivationStrategy, ConstraintFn, DecoratorFn, DependencyInfo, DisposerFn,
    RequestInfo,
};
use crate::types::{ExportKey, Injectable, Instance, TypeInfo};

/// Inspects (and may adjust) strategies before they are published.
pub trait StrategyInspector: Send + Sync {
    fn inspect(&self, strategy: &mut ActivationStrategy);
}

impl<F> StrategyInspector for F
where
    F: Fn(&mut ActivationStrategy) + Send + Sync,
{
    fn inspect(&self, strategy: &mut ActivationStrategy) {
        self(strategy)
    }
}

/// Consulted when no export matches a request; the first provider to return
/// a strategy wins.
pub trait MissingExportProvider: Send + Sync {
    fn provide(&self, request: &RequestInfo) -> Option<ActivationStrategy>;
}

impl<F> MissingExportProvider for F
where
    F: Fn(&RequestInfo) -> Option<ActivationStrategy> + Send + Sync,
{
    fn provide(&self, request: &RequestInfo) -> Option<ActivationStrategy> {
        self(request)
    }
}

/// Supplies constant values for requests it claims.
///
/// A provider that claims a request (`handles` returns true) and then
/// yields `None` surfaces [`NullInstanceReturned`](crate::LocateError::NullInstanceReturned).
pub trait ValueProvider: Send + Sync {
    fn handles(&self, request: &RequestInfo) -> bool;
    fn provide(&self, request: &RequestInfo) -> Option<Instance>;
}

/// Value provider for a single concrete type.
pub struct TypedValueProvider<T: Injectable> {
    make: Box<dyn Fn() -> Option<T> + Send + Sync>,
}

impl<T: Injectable> TypedValueProvider<T> {
    pub fn new(make: impl Fn() -> Option<T> + Send + Sync + 'static) -> Self {
        Self {
            make: Box::new(make),
        }
    }
}

impl<T: Injectable> ValueProvider for TypedValueProvider<T> {
    fn handles(&self, request: &RequestInfo) -> bool {
        request.target.type_id == std::any::TypeId::of::<T>()
    }

    fn provide(&self, _request: &RequestInfo) -> Option<Instance> {
        (self.make)().map(|value| Arc::new(value) as Instance)
    }
}

/// Reusable bundle of registrations, applied via
/// [`InjectionScope::configure_module`](crate::InjectionScope::configure_module).
pub trait ConfigurationModule: Send + Sync {
    fn configure(&self, block: &mut RegistrationBlock);
}

/// Build an export strategy outside a block, for missing-export providers.
pub fn export_strategy<T, F>(factory: F) -> ActivationStrategy
where
    T: Injectable,
    F: Fn(&mut Resolution<'_>) -> Result<T> + Send + Sync + 'static,
{
    ActivationStrategy::export(TypeInfo::of::<T>(), TypeInfo::of::<T>(), erase(factory))
}

fn erase<T, F>(factory: F) -> ActivationFn
where
    T: Injectable,
    F: Fn(&mut Resolution<'_>) -> Result<T> + Send + Sync + 'static,
{
    Arc::new(move |resolution| factory(resolution).map(|value| Arc::new(value) as Instance))
}

/// Pending registrations for one configure call.
#[derive(Default)]
pub struct RegistrationBlock {
    exports: Vec<ActivationStrategy>,
    wrappers: Vec<ActivationStrategy>,
    decorators: Vec<ActivationStrategy>,
    inspectors: Vec<Arc<dyn StrategyInspector>>,
    missing_providers: Vec<Arc<dyn MissingExportProvider>>,
    value_providers: Vec<Arc<dyn ValueProvider>>,
}

impl RegistrationBlock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Export a service built by `factory`.
    pub fn export<T, F>(&mut self, factory: F) -> ExportBuilder<'_, T>
    where
        T: Injectable,
        F: Fn(&mut Resolution<'_>) -> Result<T> + Send + Sync + 'static,
    {
        let strategy =
            ActivationStrategy::export(TypeInfo::of::<T>(), TypeInfo::of::<T>(), erase(factory));
        ExportBuilder {
            block: self,
            strategy: Some(strategy),
            secondaries: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Export an existing instance. Every resolve observes the same value.
    pub fn export_instance<T: Injectable>(&mut self, value: T) -> ExportBuilder<'_, T> {
        let shared: Instance = Arc::new(value);
        let activation: ActivationFn = Arc::new(move |_| Ok(shared.clone()));
        let strategy =
            ActivationStrategy::export(TypeInfo::of::<T>(), TypeInfo::of::<T>(), activation);
        ExportBuilder {
            block: self,
            strategy: Some(strategy),
            secondaries: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Register an open-generic export for a definition marker.
    ///
    /// Closed instantiations are resolved through
    /// [`locate_generic`](crate::InjectionScope::locate_generic) and bridged
    /// by their [`GenericExport`](crate::GenericExport) impl.
    pub fn export_open_generic<Def: ?Sized + 'static>(&mut self) -> OpenGenericBuilder<'_> {
        let strategy = ActivationStrategy::open_generic(
            GenericDefId::of::<Def>(),
            TypeInfo::of::<Def>(),
        );
        OpenGenericBuilder {
            block: self,
            strategy: Some(strategy),
        }
    }

    /// Register a decorator wrapping activations of `T`.
    pub fn export_decorator<T, D>(&mut self, decorator: D) -> DecoratorBuilder<'_>
    where
        T: Injectable,
        D: Fn(Arc<T>, &mut Resolution<'_>) -> Result<Arc<T>> + Send + Sync + 'static,
    {
        let erased: DecoratorFn = Arc::new(move |instance, resolution| {
            let inner = crate::types::downcast_arc::<T>(instance)?;
            decorator(inner, resolution).map(|wrapped| wrapped as Instance)
        });
        let strategy = ActivationStrategy::decorator(TypeInfo::of::<T>(), erased);
        DecoratorBuilder {
            block: self,
            strategy: Some(strategy),
        }
    }

    /// Register a custom wrapper strategy for wrapper type `W`.
    ///
    /// User wrappers take precedence over the built-in shapes.
    pub fn export_wrapper<W, F>(&mut self, factory: F)
    where
        W: Injectable,
        F: Fn(&mut Resolution<'_>) -> Result<W> + Send + Sync + 'static,
    {
        self.wrappers
            .push(ActivationStrategy::wrapper(TypeInfo::of::<W>(), erase(factory)));
    }

    /// Add an inspector applied to this batch and all future batches.
    pub fn add_inspector(&mut self, inspector: impl StrategyInspector + 'static) {
        self.inspectors.push(Arc::new(inspector));
    }

    /// Add a missing-export strategy provider.
    pub fn add_missing_export_provider(&mut self, provider: impl MissingExportProvider + 'static) {
        self.missing_providers.push(Arc::new(provider));
    }

    /// Add a value provider.
    pub fn add_value_provider(&mut self, provider: impl ValueProvider + 'static) {
        self.value_providers.push(Arc::new(provider));
    }

    // ---- provider surface ----------------------------------------------

    pub fn get_inspectors(&self) -> &[Arc<dyn StrategyInspector>] {
        &self.inspectors
    }

    pub fn get_missing_export_strategy_providers(&self) -> &[Arc<dyn MissingExportProvider>] {
        &self.missing_providers
    }

    pub fn get_value_providers(&self) -> &[Arc<dyn ValueProvider>] {
        &self.value_providers
    }

    pub fn get_wrapper_strategies(&self) -> &[ActivationStrategy] {
        &self.wrappers
    }

    pub fn get_decorator_strategies(&self) -> &[ActivationStrategy] {
        &self.decorators
    }

    pub fn get_export_strategies(&self) -> &[ActivationStrategy] {
        &self.exports
    }

    #[allow(clippy::type_complexity)]
    pub(crate) fn into_parts(
        self,
    ) -> (
        Vec<ActivationStrategy>,
        Vec<ActivationStrategy>,
        Vec<ActivationStrategy>,
        Vec<Arc<dyn StrategyInspector>>,
        Vec<Arc<dyn MissingExportProvider>>,
        Vec<Arc<dyn ValueProvider>>,
    ) {
        (
            self.exports,
            self.wrappers,
            self.decorators,
            self.inspectors,
            self.missing_providers,
            self.value_providers,
        )
    }
}

/// Fluent configuration of a pending export. The strategy (plus any
/// secondary strategies) is committed to the block when the builder drops.
pub struct ExportBuilder<'b, T: Injectable> {
    block: &'b mut RegistrationBlock,
    strategy: Option<ActivationStrategy>,
    secondaries: Vec<ActivationStrategy>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Injectable> ExportBuilder<'_, T> {
    /// Tie-break priority; higher wins.
    pub fn with_priority(&mut self, priority: i32) -> &mut Self {
        if let Some(strategy) = self.strategy.as_mut() {
            strategy.set_priority(priority);
        }
        self
    }

    /// Key this export; it becomes addressable only by the key.
    pub fn with_key(&mut self, key: impl Into<ExportKey>) -> &mut Self {
        if let Some(strategy) = self.strategy.as_mut() {
            strategy.set_key(key.into());
        }
        self
    }

    /// Register under a name for [`locate_by_name`](crate::InjectionScope::locate_by_name).
    pub fn as_name(&mut self, name: impl Into<String>) -> &mut Self {
        if let Some(strategy) = self.strategy.as_mut() {
            strategy.set_name(name);
        }
        self
    }

    /// Only match when `condition` passes against the static request context.
    pub fn when(
        &mut self,
        condition: impl Fn(&RequestInfo) -> bool + Send + Sync + 'static,
    ) -> &mut Self {
        if let Some(strategy) = self.strategy.as_mut() {
            strategy.add_condition(Arc::new(condition));
        }
        self
    }

    pub fn lifestyle(&mut self, lifestyle: Lifestyle) -> &mut Self {
        if let Some(strategy) = self.strategy.as_mut() {
            strategy.set_lifestyle(lifestyle);
        }
        self
    }

    /// One instance per root scope.
    pub fn singleton(&mut self) -> &mut Self {
        self.lifestyle(Lifestyle::Singleton)
    }

    /// One instance per scope id.
    pub fn per_scope(&mut self) -> &mut Self {
        self.lifestyle(Lifestyle::PerScope)
    }

    /// One instance per top-level locate call.
    pub fn per_context(&mut self) -> &mut Self {
        self.lifestyle(Lifestyle::PerContext)
    }

    /// Run `dispose` when the owning disposal scope is disposed.
    pub fn dispose_with(&mut self, dispose: impl Fn(&T) + Send + Sync + 'static) -> &mut Self {
        if let Some(strategy) = self.strategy.as_mut() {
            let erased: DisposerFn = Arc::new(move |instance: &Instance| {
                if let Some(value) = instance.downcast_ref::<T>() {
                    dispose(value);
                }
            });
            strategy.set_disposer(erased);
        }
        self
    }

    /// Declare a required constructor dependency.
    ///
    /// [`InjectionScope::validate`](crate::InjectionScope::validate) checks
    /// every declared dependency against the registered exports.
    pub fn with_dependency<D: Injectable>(&mut self, param_name: &'static str) -> &mut Self {
        self.declare_dependency::<D>(param_name, false)
    }

    /// Declare an optional constructor dependency; validation will not
    /// flag it when no export matches.
    pub fn with_optional_dependency<D: Injectable>(&mut self, param_name: &'static str) -> &mut Self {
        self.declare_dependency::<D>(param_name, true)
    }

    fn declare_dependency<D: Injectable>(
        &mut self,
        param_name: &'static str,
        optional: bool,
    ) -> &mut Self {
        if let Some(strategy) = self.strategy.as_mut() {
            strategy.add_dependency(DependencyInfo {
                type_info: TypeInfo::of::<D>(),
                param_name,
                optional,
            });
        }
        self
    }

    /// Additionally export this service as trait object `I`.
    ///
    /// The secondary strategy resolves the primary through the engine, so
    /// the primary's lifestyle governs both views.
    pub fn as_trait<I, C>(&mut self, coerce: C) -> &mut Self
    where
        I: ?Sized + Send + Sync + 'static,
        C: Fn(Arc<T>) -> Arc<I> + Send + Sync + 'static,
    {
        let activation: ActivationFn = Arc::new(move |resolution: &mut Resolution<'_>| {
            let concrete = resolution.locate::<T>()?;
            let coerced: Arc<I> = coerce(concrete);
            Ok(Arc::new(coerced) as Instance)
        });
        self.secondaries.push(ActivationStrategy::export(
            TypeInfo::of::<I>(),
            TypeInfo::of::<T>(),
            activation,
        ));
        self
    }

    /// Additionally export a value derived from this service.
    pub fn also_exports<U, M>(&mut self, map: M) -> &mut Self
    where
        U: Injectable,
        M: Fn(Arc<T>) -> U + Send + Sync + 'static,
    {
        let activation: ActivationFn = Arc::new(move |resolution: &mut Resolution<'_>| {
            let concrete = resolution.locate::<T>()?;
            Ok(Arc::new(map(concrete)) as Instance)
        });
        self.secondaries.push(ActivationStrategy::export(
            TypeInfo::of::<U>(),
            TypeInfo::of::<T>(),
            activation,
        ));
        self
    }
}

impl<T: Injectable> Drop for ExportBuilder<'_, T> {
    fn drop(&mut self) {
        if let Some(strategy) = self.strategy.take() {
            self.block.exports.push(strategy);
        }
        self.block.exports.append(&mut self.secondaries);
    }
}

/// Fluent configuration of a pending open-generic export.
pub struct OpenGenericBuilder<'b> {
    block: &'b mut RegistrationBlock,
    strategy: Option<ActivationStrategy>,
}

impl OpenGenericBuilder<'_> {
    pub fn with_priority(&mut self, priority: i32) -> &mut Self {
        if let Some(strategy) = self.strategy.as_mut() {
            strategy.set_priority(priority);
        }
        self
    }

    pub fn with_key(&mut self, key: impl Into<ExportKey>) -> &mut Self {
        if let Some(strategy) = self.strategy.as_mut() {
            strategy.set_key(key.into());
        }
        self
    }

    /// Constraint over the closed type-argument list; all constraints must
    /// accept an instantiation or it fails with
    /// [`GenericConstraintUnsatisfied`](crate::LocateError::GenericConstraintUnsatisfied).
    pub fn with_constraint(&mut self, constraint: ConstraintFn) -> &mut Self {
        if let Some(strategy) = self.strategy.as_mut() {
            strategy.add_constraint(constraint);
        }
        self
    }

    pub fn when(
        &mut self,
        condition: impl Fn(&RequestInfo) -> bool + Send + Sync + 'static,
    ) -> &mut Self {
        if let Some(strategy) = self.strategy.as_mut() {
            strategy.add_condition(Arc::new(condition));
        }
        self
    }

    pub fn lifestyle(&mut self, lifestyle: Lifestyle) -> &mut Self {
        if let Some(strategy) = self.strategy.as_mut() {
            strategy.set_lifestyle(lifestyle);
        }
        self
    }

    pub fn singleton(&mut self) -> &mut Self {
        self.lifestyle(Lifestyle::Singleton)
    }

    pub fn per_scope(&mut self) -> &mut Self {
        self.lifestyle(Lifestyle::PerScope)
    }
}

impl Drop for OpenGenericBuilder<'_> {
    fn drop(&mut self) {
        if let Some(strategy) = self.strategy.take() {
            self.block.exports.push(strategy);
        }
    }
}

/// Fluent configuration of a pending decorator.
pub struct DecoratorBuilder<'b> {
    block: &'b mut RegistrationBlock,
    strategy: Option<ActivationStrategy>,
}

impl DecoratorBuilder<'_> {
    /// Decorator application order; higher priority wraps outermost.
    pub fn with_priority(&mut self, priority: i32) -> &mut Self {
        if let Some(strategy) = self.strategy.as_mut() {
            strategy.set_priority(priority);
        }
        self
    }

    pub fn when(
        &mut self,
        condition: impl Fn(&RequestInfo) -> bool + Send + Sync + 'static,
    ) -> &mut Self {
        if let Some(strategy) = self.strategy.as_mut() {
            strategy.add_condition(Arc::new(condition));
        }
        self
    }
}

impl Drop for DecoratorBuilder<'_> {
    fn drop(&mut self) {
        if let Some(strategy) = self.strategy.take() {
            self.block.decorators.push(strategy);
        }
    }
}
