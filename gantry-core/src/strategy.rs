//! Activation strategies.
//!
//! A strategy records how one export is activated: its exported type,
//! implementation type, priority, optional key/name, condition predicates,
//! lifestyle, declared dependencies, and the activation function itself.
//! Strategies are immutable once published to a container; replacement is
//! done by adding a higher-priority strategy.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::context::InjectionContext;
use crate::disposal::DisposalScope;
use crate::error::Result;
use crate::generics::GenericDefId;
use crate::lifestyle::Lifestyle;
use crate::scope::InjectionScope;
use crate::types::{ExportKey, Instance, TypeInfo};

/// Compiled activation delegate: one callable per `(type, key)` binding.
pub type ActivationDelegate =
    Arc<dyn Fn(&InjectionScope, &DisposalScope, &mut InjectionContext) -> Result<Instance> + Send + Sync>;

/// User-supplied activation body, resolving dependencies through
/// [`Resolution`](crate::Resolution).
pub type ActivationFn = Arc<dyn Fn(&mut crate::Resolution<'_>) -> Result<Instance> + Send + Sync>;

/// Predicate over the static request context.
pub type ConditionFn = Arc<dyn Fn(&RequestInfo) -> bool + Send + Sync>;

/// Wraps an activated instance with another.
pub type DecoratorFn = Arc<dyn Fn(Instance, &mut crate::Resolution<'_>) -> Result<Instance> + Send + Sync>;

/// Releases resources held by an activated instance.
pub type DisposerFn = Arc<dyn Fn(&Instance) + Send + Sync>;

/// Request-time strategy filter.
pub type StrategyFilter = Arc<dyn Fn(&ActivationStrategy) -> bool + Send + Sync>;

/// Constraint predicate over the closed type-argument list of an
/// open-generic instantiation.
pub type ConstraintFn = Arc<dyn Fn(&[TypeInfo]) -> bool + Send + Sync>;

/// Where a resolution request originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOrigin {
    Root,
    Dependency,
    CollectionElement,
    Wrapper,
}

/// Static context handed to condition predicates, value providers, and
/// missing-export providers.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub target: TypeInfo,
    pub key: Option<ExportKey>,
    pub origin: RequestOrigin,
    pub scope_name: String,
}

/// Declared constructor dependency, kept for diagnostics and inspection.
#[derive(Debug, Clone)]
pub struct DependencyInfo {
    pub type_info: TypeInfo,
    pub param_name: &'static str,
    pub optional: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Export,
    Wrapper,
    Decorator,
}

static STRATEGY_COUNTER: AtomicU64 = AtomicU64::new(1);

pub struct ActivationStrategy {
    id: u64,
    kind: StrategyKind,
    export_type: TypeInfo,
    implementation: TypeInfo,
    priority: i32,
    insertion: u64,
    key: Option<ExportKey>,
    name: Option<String>,
    conditions: Vec<ConditionFn>,
    lifestyle: Lifestyle,
    dependencies: Vec<DependencyInfo>,
    activation: ActivationFn,
    decorator: Option<DecoratorFn>,
    disposer: Option<DisposerFn>,
    open_definition: Option<GenericDefId>,
    constraints: Vec<ConstraintFn>,
}

impl ActivationStrategy {
    /// Export strategy for a concrete service type.
    pub fn export(export_type: TypeInfo, implementation: TypeInfo, activation: ActivationFn) -> Self {
        Self::new(StrategyKind::Export, export_type, implementation, activation)
    }

    /// Wrapper strategy activating a wrapper shape.
    pub fn wrapper(export_type: TypeInfo, activation: ActivationFn) -> Self {
        Self::new(StrategyKind::Wrapper, export_type, export_type, activation)
    }

    /// Decorator strategy wrapping another activation of `export_type`.
    pub fn decorator(export_type: TypeInfo, decorator: DecoratorFn) -> Self {
        let mut strategy = Self::new(
            StrategyKind::Decorator,
            export_type,
            export_type,
            Arc::new(move |_| {
                Err(crate::LocateError::LifestyleViolation {
                    message: "decorator strategies cannot be activated directly".to_string(),
                })
            }),
        );
        strategy.decorator = Some(decorator);
        strategy
    }

    /// Open-generic export strategy for a generic definition.
    pub fn open_generic(definition: GenericDefId, definition_info: TypeInfo) -> Self {
        let mut strategy = Self::new(
            StrategyKind::Export,
            definition_info,
            definition_info,
            Arc::new(move |_| {
                Err(crate::LocateError::LifestyleViolation {
                    message: "open generic strategies activate through closed instantiations"
                        .to_string(),
                })
            }),
        );
        strategy.open_definition = Some(definition);
        strategy
    }

    fn new(
        kind: StrategyKind,
        export_type: TypeInfo,
        implementation: TypeInfo,
        activation: ActivationFn,
    ) -> Self {
        Self {
            id: STRATEGY_COUNTER.fetch_add(1, Ordering::Relaxed),
            kind,
            export_type,
            implementation,
            priority: 0,
            insertion: 0,
            key: None,
            name: None,
            conditions: Vec::new(),
            lifestyle: Lifestyle::Transient,
            dependencies: Vec::new(),
            activation,
            decorator: None,
            disposer: None,
            open_definition: None,
            constraints: Vec::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> StrategyKind {
        self.kind
    }

    pub fn export_type(&self) -> TypeInfo {
        self.export_type
    }

    pub fn implementation(&self) -> TypeInfo {
        self.implementation
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn key(&self) -> Option<&ExportKey> {
        self.key.as_ref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn lifestyle(&self) -> Lifestyle {
        self.lifestyle
    }

    pub fn dependencies(&self) -> &[DependencyInfo] {
        &self.dependencies
    }

    pub fn open_definition(&self) -> Option<GenericDefId> {
        self.open_definition
    }

    pub fn has_conditions(&self) -> bool {
        !self.conditions.is_empty()
    }

    /// All condition predicates must pass for the strategy to match.
    pub fn matches_conditions(&self, request: &RequestInfo) -> bool {
        self.conditions.iter().all(|condition| condition(request))
    }

    /// All constraint predicates must accept the closed argument list.
    pub fn satisfies_constraints(&self, arguments: &[TypeInfo]) -> bool {
        self.constraints.iter().all(|constraint| constraint(arguments))
    }

    pub(crate) fn activation(&self) -> ActivationFn {
        self.activation.clone()
    }

    pub(crate) fn decorator_fn(&self) -> Option<DecoratorFn> {
        self.decorator.clone()
    }

    pub(crate) fn disposer(&self) -> Option<DisposerFn> {
        self.disposer.clone()
    }

    pub(crate) fn insertion(&self) -> u64 {
        self.insertion
    }

    pub(crate) fn set_insertion(&mut self, insertion: u64) {
        self.insertion = insertion;
    }

    // Pre-publication mutators, used by the registration builders and by
    // inspectors before a batch is merged.

    pub fn set_priority(&mut self, priority: i32) {
        self.priority = priority;
    }

    pub fn set_key(&mut self, key: ExportKey) {
        self.key = Some(key);
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    pub fn set_lifestyle(&mut self, lifestyle: Lifestyle) {
        self.lifestyle = lifestyle;
    }

    pub fn add_condition(&mut self, condition: ConditionFn) {
        self.conditions.push(condition);
    }

    pub fn add_constraint(&mut self, constraint: ConstraintFn) {
        self.constraints.push(constraint);
    }

    pub fn add_dependency(&mut self, dependency: DependencyInfo) {
        self.dependencies.push(dependency);
    }

    pub fn set_disposer(&mut self, disposer: DisposerFn) {
        self.disposer = Some(disposer);
    }
}

impl std::fmt::Debug for ActivationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivationStrategy")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("export_type", &self.export_type.type_name)
            .field("implementation", &self.implementation.type_name)
            .field("priority", &self.priority)
            .field("key", &self.key)
            .field("name", &self.name)
            .field("lifestyle", &self.lifestyle)
            .finish()
    }
}
