//! Activation strategy compiler.
//!
//! Turns a resolution request plus a matched strategy into a compiled
//! activation delegate. The delegate is a composed closure tree: the
//! strategy's activation body innermost, then decorators
//! (priority-ascending, so the highest priority wraps outermost), then
//! disposal registration, then the lifestyle accessor. Delegates without
//! condition predicates are cacheable for plain requests.

use std::sync::Arc;

use crate::context::InjectionContext;
use crate::disposal::DisposalScope;
use crate::error::{LocateError, Result};
use crate::generics::GenericExport;
use crate::logging::trace;
use crate::scope::{InjectionScope, ResolveSpec};
use crate::strategy::{
    ActivationDelegate, ActivationFn, ActivationStrategy, RequestInfo, RequestOrigin,
    StrategyFilter,
};
use crate::types::{downcast_arc, downcast_trait, ExportKey, Injectable, Instance, TypeInfo};

/// Live resolution state handed to activation bodies, decorators, and
/// wrapper factories. Dependencies resolved through it re-enter the engine
/// with the caller's request chain attached, so cycles are detected across
/// the whole graph.
pub struct Resolution<'a> {
    pub(crate) scope: &'a InjectionScope,
    pub(crate) disposal: &'a DisposalScope,
    pub(crate) context: &'a mut InjectionContext,
}

impl<'a> Resolution<'a> {
    pub(crate) fn new(
        scope: &'a InjectionScope,
        disposal: &'a DisposalScope,
        context: &'a mut InjectionContext,
    ) -> Self {
        Self {
            scope,
            disposal,
            context,
        }
    }

    /// The scope this resolution is executing against.
    pub fn scope(&self) -> &InjectionScope {
        self.scope
    }

    /// The per-call injection context.
    pub fn context(&mut self) -> &mut InjectionContext {
        self.context
    }

    /// Resolve a dependency by type.
    pub fn locate<T: Injectable>(&mut self) -> Result<Arc<T>> {
        let instance = self.scope.resolve_erased(
            ResolveSpec::plain(TypeInfo::of::<T>(), RequestOrigin::Dependency),
            self.context,
            Some(self.disposal),
        )?;
        downcast_arc(instance)
    }

    /// Resolve a dependency, downgrading a missing export to `None`.
    pub fn try_locate<T: Injectable>(&mut self) -> Result<Option<Arc<T>>> {
        match self.locate::<T>() {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.is_missing_export() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Resolve a trait-object dependency.
    pub fn locate_trait<I: ?Sized + Send + Sync + 'static>(&mut self) -> Result<Arc<I>> {
        let instance = self.scope.resolve_erased(
            ResolveSpec::plain(TypeInfo::of::<I>(), RequestOrigin::Dependency),
            self.context,
            Some(self.disposal),
        )?;
        downcast_trait(instance)
    }

    /// Resolve a closed open-generic dependency.
    pub fn locate_generic<G: GenericExport>(&mut self) -> Result<Arc<G>> {
        let instance = self.scope.resolve_generic_erased::<G>(
            None,
            None,
            false,
            self.context,
            Some(self.disposal),
        )?;
        downcast_arc(instance)
    }

    /// Resolve a named constructor parameter.
    ///
    /// A missing export for the parameter type reports as
    /// [`MissingConstructorParam`](LocateError::MissingConstructorParam)
    /// against the type currently being activated.
    pub fn dependency<T: Injectable>(&mut self, param: &'static str) -> Result<Arc<T>> {
        let owner = self.owner_name();
        self.locate::<T>().map_err(|err| {
            if err.is_missing_export() {
                LocateError::MissingConstructorParam {
                    type_name: owner,
                    param: param.to_string(),
                }
            } else {
                err
            }
        })
    }

    /// Take the next positional argument by value.
    pub fn positional<T: Injectable + Clone>(&mut self) -> Result<T> {
        self.positional_arc::<T>().map(|arc| (*arc).clone())
    }

    /// Take the next positional argument without cloning the payload.
    pub fn positional_arc<T: Injectable>(&mut self) -> Result<Arc<T>> {
        let owner = self.owner_name();
        let instance =
            self.context
                .next_positional()
                .ok_or_else(|| LocateError::MissingConstructorParam {
                    type_name: owner,
                    param: "positional argument".to_string(),
                })?;
        downcast_arc(instance)
    }

    fn owner_name(&self) -> &'static str {
        self.context
            .current_target()
            .map(|info| info.type_name)
            .unwrap_or("<root>")
    }
}

impl std::fmt::Debug for Resolution<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolution")
            .field("scope", &self.scope.scope_name())
            .finish()
    }
}

pub(crate) struct CompiledEntry {
    pub delegate: ActivationDelegate,
    pub cacheable: bool,
}

/// Select a strategy for `target` and compile its delegate.
///
/// Selection order: exact export match walking the scope chain, value
/// providers, missing-export providers, failure.
pub(crate) fn compile_for_type(
    scope: &InjectionScope,
    target: TypeInfo,
    key: Option<&ExportKey>,
    filter: Option<&StrategyFilter>,
    origin: RequestOrigin,
    chain: Vec<String>,
) -> Result<CompiledEntry> {
    let request = RequestInfo {
        target,
        key: key.cloned(),
        origin,
        scope_name: scope.scope_name().to_string(),
    };

    let mut selected: Option<Arc<ActivationStrategy>> = None;

    for level in scope.chain() {
        let Some(registry) = level.registry() else {
            continue;
        };
        if let Some(collection) = registry.exports.get_collection(target.type_id) {
            if let Some(strategy) = collection
                .get_strategies(filter, key)
                .into_iter()
                .find(|strategy| strategy.matches_conditions(&request))
            {
                selected = Some(strategy);
                break;
            }
        }
    }

    if selected.is_none() {
        for level in scope.chain() {
            let Some(registry) = level.registry() else {
                continue;
            };
            for provider in &registry.value_providers {
                if provider.handles(&request) {
                    return match provider.provide(&request) {
                        Some(value) => Ok(CompiledEntry {
                            delegate: constant_delegate(value),
                            cacheable: true,
                        }),
                        None => Err(LocateError::NullInstanceReturned {
                            type_name: target.type_name,
                        }),
                    };
                }
            }
        }
    }

    let mut uninstalled_synthetic = false;
    if selected.is_none() {
        'providers: for level in scope.chain() {
            let Some(registry) = level.registry() else {
                continue;
            };
            for provider in &registry.missing_providers {
                if let Some(synthesized) = provider.provide(&request) {
                    trace!(
                        service = target.type_name,
                        "Missing-export provider synthesized a strategy"
                    );
                    let strategy = if scope.config().auto_register_unknown {
                        level.install_strategy(synthesized)
                    } else {
                        // Serves this request only; never published to the
                        // delegate cache so the container stays the source
                        // of truth for can_locate.
                        uninstalled_synthetic = true;
                        Arc::new(synthesized)
                    };
                    selected = Some(strategy);
                    break 'providers;
                }
            }
        }
    }

    let Some(strategy) = selected else {
        return Err(LocateError::NoMatchingExport {
            type_name: target.type_name,
            chain,
        });
    };

    let base = strategy.activation();
    let mut entry = build_entry(scope, &strategy, target, base, &request);
    if uninstalled_synthetic {
        entry.cacheable = false;
    }
    Ok(entry)
}

/// Compile a delegate for a closed open-generic instantiation.
///
/// Follows the same selection chain as closed types: an exact closed
/// export for the instantiation (e.g. one installed earlier by a provider)
/// wins, then the constraint-checked open-generic match, then value
/// providers, then missing-export providers, then failure.
pub(crate) fn compile_for_generic<G: GenericExport>(
    scope: &InjectionScope,
    key: Option<&ExportKey>,
    filter: Option<&StrategyFilter>,
    chain: Vec<String>,
) -> Result<CompiledEntry> {
    let target = TypeInfo::of::<G>();
    let request = RequestInfo {
        target,
        key: key.cloned(),
        origin: RequestOrigin::Root,
        scope_name: scope.scope_name().to_string(),
    };
    let arguments = G::type_arguments();

    for level in scope.chain() {
        let Some(registry) = level.registry() else {
            continue;
        };
        if let Some(collection) = registry.exports.get_collection(target.type_id) {
            if let Some(strategy) = collection
                .get_strategies(filter, key)
                .into_iter()
                .find(|strategy| strategy.matches_conditions(&request))
            {
                let base = strategy.activation();
                return Ok(build_entry(scope, &strategy, target, base, &request));
            }
        }
    }

    let mut constraint_failure = false;
    for level in scope.chain() {
        let Some(registry) = level.registry() else {
            continue;
        };
        if let Some(collection) = registry.exports.get_open_collection(G::definition()) {
            for strategy in collection.get_strategies(filter, key) {
                if !strategy.matches_conditions(&request) {
                    continue;
                }
                if !strategy.satisfies_constraints(&arguments) {
                    constraint_failure = true;
                    continue;
                }
                // The closed bridge impl is the activation body; the open
                // strategy contributes lifestyle, priority, and policy.
                let base: ActivationFn = Arc::new(|resolution| {
                    G::activate(resolution).map(|value| Arc::new(value) as Instance)
                });
                return Ok(build_entry(scope, &strategy, target, base, &request));
            }
        }
    }

    for level in scope.chain() {
        let Some(registry) = level.registry() else {
            continue;
        };
        for provider in &registry.value_providers {
            if provider.handles(&request) {
                return match provider.provide(&request) {
                    Some(value) => Ok(CompiledEntry {
                        delegate: constant_delegate(value),
                        cacheable: true,
                    }),
                    None => Err(LocateError::NullInstanceReturned {
                        type_name: target.type_name,
                    }),
                };
            }
        }
    }

    for level in scope.chain() {
        let Some(registry) = level.registry() else {
            continue;
        };
        for provider in &registry.missing_providers {
            if let Some(synthesized) = provider.provide(&request) {
                trace!(
                    service = target.type_name,
                    "Missing-export provider synthesized a strategy"
                );
                let (strategy, installed) = if scope.config().auto_register_unknown {
                    (level.install_strategy(synthesized), true)
                } else {
                    (Arc::new(synthesized), false)
                };
                let base = strategy.activation();
                let mut entry = build_entry(scope, &strategy, target, base, &request);
                if !installed {
                    entry.cacheable = false;
                }
                return Ok(entry);
            }
        }
    }

    Err(if constraint_failure {
        LocateError::GenericConstraintUnsatisfied {
            type_name: target.type_name,
        }
    } else {
        LocateError::NoMatchingExport {
            type_name: target.type_name,
            chain,
        }
    })
}

/// Compile one delegate per matching export for the collection path.
///
/// Scope-chain order is child first; order within one container is the
/// collection order (priority descending, insertion ascending).
pub(crate) fn compile_collection(
    scope: &InjectionScope,
    element: TypeInfo,
    key: Option<&ExportKey>,
    filter: Option<&StrategyFilter>,
) -> Vec<ActivationDelegate> {
    let request = RequestInfo {
        target: element,
        key: key.cloned(),
        origin: RequestOrigin::CollectionElement,
        scope_name: scope.scope_name().to_string(),
    };

    let mut delegates = Vec::new();
    for level in scope.chain() {
        let Some(registry) = level.registry() else {
            continue;
        };
        if let Some(collection) = registry.exports.get_collection(element.type_id) {
            for strategy in collection.get_strategies(filter, key) {
                if strategy.matches_conditions(&request) {
                    let base = strategy.activation();
                    delegates.push(build_entry(scope, &strategy, element, base, &request).delegate);
                }
            }
        }
    }
    delegates
}

/// Look up a named strategy and compile it.
pub(crate) fn compile_named(scope: &InjectionScope, name: &str) -> Result<CompiledEntry> {
    for level in scope.chain() {
        let Some(registry) = level.registry() else {
            continue;
        };
        if let Some(collection) = registry.exports.get_named_collection(name) {
            for strategy in collection.all() {
                let request = RequestInfo {
                    target: strategy.export_type(),
                    key: None,
                    origin: RequestOrigin::Root,
                    scope_name: scope.scope_name().to_string(),
                };
                if strategy.matches_conditions(&request) {
                    let base = strategy.activation();
                    return Ok(build_entry(
                        scope,
                        strategy,
                        strategy.export_type(),
                        base,
                        &request,
                    ));
                }
            }
        }
    }
    Err(LocateError::NoMatchingExport {
        type_name: "<named export>",
        chain: vec![name.to_string()],
    })
}

/// Look up a custom wrapper strategy registered for wrapper type `W`.
pub(crate) fn find_wrapper_strategy(
    scope: &InjectionScope,
    wrapper: TypeInfo,
) -> Option<Arc<ActivationStrategy>> {
    let request = RequestInfo {
        target: wrapper,
        key: None,
        origin: RequestOrigin::Wrapper,
        scope_name: scope.scope_name().to_string(),
    };
    for level in scope.chain() {
        let Some(registry) = level.registry() else {
            continue;
        };
        if let Some(collection) = registry.wrappers.get_collection(wrapper.type_id) {
            if let Some(strategy) = collection
                .get_strategies(None, None)
                .into_iter()
                .find(|strategy| strategy.matches_conditions(&request))
            {
                return Some(strategy);
            }
        }
    }
    None
}

fn constant_delegate(value: Instance) -> ActivationDelegate {
    Arc::new(move |_, _, _| Ok(value.clone()))
}

fn build_entry(
    scope: &InjectionScope,
    strategy: &Arc<ActivationStrategy>,
    target: TypeInfo,
    base: ActivationFn,
    request: &RequestInfo,
) -> CompiledEntry {
    let mut delegate: ActivationDelegate = Arc::new(move |scope, disposal, ctx| {
        let mut resolution = Resolution::new(scope, disposal, ctx);
        base(&mut resolution)
    });

    // Decorators across the chain, innermost = lowest priority.
    let mut decorators = Vec::new();
    for level in scope.chain() {
        let Some(registry) = level.registry() else {
            continue;
        };
        if let Some(collection) = registry.decorators.get_collection(target.type_id) {
            decorators.extend(
                collection
                    .get_strategies(None, None)
                    .into_iter()
                    .filter(|decorator| decorator.matches_conditions(request)),
            );
        }
    }
    decorators.sort_by_key(|decorator| (decorator.priority(), decorator.insertion()));

    let conditioned = strategy.has_conditions()
        || decorators.iter().any(|decorator| decorator.has_conditions());

    for decorator in decorators {
        if let Some(wrap) = decorator.decorator_fn() {
            let prev = delegate;
            delegate = Arc::new(move |scope, disposal, ctx| {
                let inner = prev(scope, disposal, ctx)?;
                let mut resolution = Resolution::new(scope, disposal, ctx);
                wrap(inner, &mut resolution)
            });
        }
    }

    if let Some(disposer) = strategy.disposer() {
        let prev = delegate;
        delegate = Arc::new(move |scope, disposal, ctx| {
            let instance = prev(scope, disposal, ctx)?;
            let captured = instance.clone();
            let dispose = disposer.clone();
            disposal.add_disposable(move || dispose(&captured));
            Ok(instance)
        });
    }

    let delegate = crate::lifestyle::apply(
        strategy.lifestyle(),
        strategy.id(),
        target.type_id,
        delegate,
    );

    trace!(
        service = target.type_name,
        strategy_id = strategy.id(),
        lifestyle = %strategy.lifestyle(),
        "Compiled activation delegate"
    );

    CompiledEntry {
        delegate,
        cacheable: !conditioned,
    }
}
