//! Integration tests for the resolution engine: registration, lifestyles,
//! wrappers, open generics, and error propagation.

use std::any::TypeId;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use gantry_core::{
    constraint, export_strategy, ActivationStrategy, ExportKey, GenericDefId, GenericExport,
    Injectable, InjectionScope, Lazy, LocateError, LocateOptions, RequestInfo, Resolution, Result,
    ScopeConfiguration, TypeInfo, TypedValueProvider,
};

// =============================================================================
// Basic services
// =============================================================================

trait IBasicService: Send + Sync {
    fn value(&self) -> u32;
}

#[derive(Debug)]
struct BasicService;

impl IBasicService for BasicService {
    fn value(&self) -> u32 {
        42
    }
}

#[test]
fn test_basic_resolve_transient_instances_are_distinct() {
    let scope = InjectionScope::new();
    scope.configure(|block| {
        block
            .export(|_| Ok(BasicService))
            .as_trait(|service| service as Arc<dyn IBasicService>);
    });

    let first = scope.locate::<BasicService>().unwrap();
    let second = scope.locate::<BasicService>().unwrap();
    assert!(!Arc::ptr_eq(&first, &second));

    let as_trait = scope.locate_trait::<dyn IBasicService>().unwrap();
    assert_eq!(as_trait.value(), 42);
}

#[test]
fn test_named_resolve() {
    let scope = InjectionScope::new();
    scope.configure(|block| {
        block.export(|_| Ok(BasicService)).as_name("BasicService");
    });

    let service = scope
        .locate_by_name_as::<BasicService>("BasicService")
        .unwrap();
    assert!(Arc::strong_count(&service) >= 1);

    assert!(scope.try_locate_by_name("Unknown").unwrap().is_none());
}

// =============================================================================
// Open generics
// =============================================================================

struct TwoDependencyDef;

#[derive(Debug)]
struct TwoDependencyService<A: Injectable, B: Injectable> {
    dependency1: Arc<A>,
    dependency2: Arc<B>,
}

impl<A: Injectable, B: Injectable> GenericExport for TwoDependencyService<A, B> {
    fn definition() -> GenericDefId {
        GenericDefId::of::<TwoDependencyDef>()
    }

    fn type_arguments() -> Vec<TypeInfo> {
        vec![TypeInfo::of::<A>(), TypeInfo::of::<B>()]
    }

    fn activate(resolution: &mut Resolution<'_>) -> Result<Self> {
        Ok(Self {
            dependency1: resolution.locate::<A>()?,
            dependency2: resolution.locate::<B>()?,
        })
    }
}

struct OneArgFuncDef;

struct DependsOnOneArgFunc<A: Injectable, B: Injectable + Clone> {
    dependency1: Arc<A>,
    dependency2: B,
}

impl<A: Injectable, B: Injectable + Clone> GenericExport for DependsOnOneArgFunc<A, B> {
    fn definition() -> GenericDefId {
        GenericDefId::of::<OneArgFuncDef>()
    }

    fn type_arguments() -> Vec<TypeInfo> {
        vec![TypeInfo::of::<A>(), TypeInfo::of::<B>()]
    }

    fn activate(resolution: &mut Resolution<'_>) -> Result<Self> {
        Ok(Self {
            dependency1: resolution.dependency::<A>("dependency1")?,
            dependency2: resolution.positional::<B>()?,
        })
    }
}

#[derive(Clone, Debug)]
struct Marker;

#[test]
fn test_open_generic_closed_instantiations() {
    let scope = InjectionScope::new();
    scope.configure(|block| {
        block.export(|_| Ok(BasicService));
        block.export(|_| Ok(Marker));
        block.export_open_generic::<TwoDependencyDef>();
    });

    let service = scope
        .locate_generic::<TwoDependencyService<BasicService, Marker>>()
        .unwrap();
    assert_eq!(service.dependency1.value(), 42);
    let _second_dep: Arc<Marker> = service.dependency2.clone();

    assert!(scope.can_locate_generic::<TwoDependencyService<BasicService, Marker>>());
    assert!(scope
        .try_locate_generic::<TwoDependencyService<Marker, Marker>>()
        .unwrap()
        .is_some());
}

#[test]
fn test_open_generic_with_one_arg_factory() {
    let scope = InjectionScope::new();
    scope.configure(|block| {
        block.export(|_| Ok(BasicService));
        block.export_open_generic::<TwoDependencyDef>();
        block.export_open_generic::<OneArgFuncDef>();
    });

    let factory = scope
        .factory_arg_generic::<i32, DependsOnOneArgFunc<BasicService, i32>>()
        .unwrap();
    let service = factory.invoke(5).unwrap();

    assert_eq!(service.dependency1.value(), 42);
    assert_eq!(service.dependency2, 5);
}

#[test]
fn test_unregistered_definition_is_missing_export() {
    let scope = InjectionScope::new();
    scope.configure(|block| {
        block.export(|_| Ok(BasicService));
        block.export(|_| Ok(Marker));
    });

    let err = scope
        .locate_generic::<TwoDependencyService<BasicService, Marker>>()
        .unwrap_err();
    assert!(err.is_missing_export());
}

struct ConstrainedDef;

#[derive(Debug)]
struct ConstrainedRepo<T: Injectable> {
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T: Injectable> GenericExport for ConstrainedRepo<T> {
    fn definition() -> GenericDefId {
        GenericDefId::of::<ConstrainedDef>()
    }

    fn type_arguments() -> Vec<TypeInfo> {
        vec![TypeInfo::of::<T>()]
    }

    fn activate(_resolution: &mut Resolution<'_>) -> Result<Self> {
        Ok(Self {
            _marker: std::marker::PhantomData,
        })
    }
}

#[test]
fn test_generic_constraint_unsatisfied() {
    let scope = InjectionScope::new();
    scope.configure(|block| {
        block
            .export_open_generic::<ConstrainedDef>()
            .with_constraint(constraint::argument_is::<String>(0));
    });

    assert!(scope.locate_generic::<ConstrainedRepo<String>>().is_ok());

    let err = scope
        .locate_generic::<ConstrainedRepo<u32>>()
        .unwrap_err();
    assert!(matches!(
        err,
        LocateError::GenericConstraintUnsatisfied { .. }
    ));
    assert!(!scope.can_locate_generic::<ConstrainedRepo<u32>>());
}

// =============================================================================
// Cycles and missing parameters
// =============================================================================

#[derive(Debug)]
struct CycleA {
    _b: Arc<CycleB>,
}

#[derive(Debug)]
struct CycleB {
    _a: Arc<CycleA>,
}

#[test]
fn test_circular_dependency_reports_full_chain() {
    let scope = InjectionScope::new();
    scope.configure(|block| {
        block.export(|r| {
            Ok(CycleA {
                _b: r.locate::<CycleB>()?,
            })
        });
        block.export(|r| {
            Ok(CycleB {
                _a: r.locate::<CycleA>()?,
            })
        });
    });

    let err = scope.locate::<CycleA>().unwrap_err();
    let message = err.to_string();
    assert!(matches!(err, LocateError::CircularDependency { .. }));
    assert!(message.contains("CycleA"));
    assert!(message.contains("CycleB"));

    // try_locate only downgrades missing exports; a cycle still propagates.
    assert!(scope.try_locate::<CycleA>().is_err());
}

#[derive(Debug)]
struct NeedsDatabase {
    _db: Arc<NeverExported>,
}

#[derive(Debug)]
struct NeverExported;

#[test]
fn test_missing_constructor_param() {
    let scope = InjectionScope::new();
    scope.configure(|block| {
        block.export(|r| {
            Ok(NeedsDatabase {
                _db: r.dependency::<NeverExported>("database")?,
            })
        });
    });

    let err = scope.locate::<NeedsDatabase>().unwrap_err();
    match err {
        LocateError::MissingConstructorParam { type_name, param } => {
            assert!(type_name.contains("NeedsDatabase"));
            assert_eq!(param, "database");
        }
        other => panic!("expected MissingConstructorParam, got {other}"),
    }
}

// =============================================================================
// Lifestyles
// =============================================================================

static COUNTER_BUILDS: AtomicU32 = AtomicU32::new(0);

struct Counter {
    id: u32,
}

#[test]
fn test_per_scope_lifestyle_sibling_isolation() {
    let root = InjectionScope::new();
    root.configure(|block| {
        block
            .export(|_| {
                Ok(Counter {
                    id: COUNTER_BUILDS.fetch_add(1, Ordering::SeqCst),
                })
            })
            .per_scope();
    });

    let s1 = root.begin_lifetime_scope("s1");
    let s2 = root.begin_lifetime_scope("s2");

    let a = s1.locate::<Counter>().unwrap();
    let b = s1.locate::<Counter>().unwrap();
    let c = s2.locate::<Counter>().unwrap();

    assert!(Arc::ptr_eq(&a, &b));
    assert_ne!(a.id, c.id);
}

static SINGLETON_BUILDS: AtomicU32 = AtomicU32::new(0);

struct Shared;

#[test]
fn test_concurrent_singleton_resolution_constructs_once() {
    let scope = InjectionScope::new();
    scope.configure(|block| {
        block
            .export(|_| {
                SINGLETON_BUILDS.fetch_add(1, Ordering::SeqCst);
                Ok(Shared)
            })
            .singleton();
    });

    let instances: Vec<Arc<Shared>> = std::thread::scope(|threads| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let scope = scope.clone();
                threads.spawn(move || scope.locate::<Shared>().unwrap())
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(SINGLETON_BUILDS.load(Ordering::SeqCst), 1);
    for instance in &instances {
        assert!(Arc::ptr_eq(instance, &instances[0]));
    }

    // Descendants observe the same singleton.
    let child = scope.begin_lifetime_scope("child");
    assert!(Arc::ptr_eq(
        &child.locate::<Shared>().unwrap(),
        &instances[0]
    ));
}

static TOKEN_BUILDS: AtomicU32 = AtomicU32::new(0);

struct Token {
    id: u32,
}

struct TokenPair {
    first: Arc<Token>,
    second: Arc<Token>,
}

#[test]
fn test_per_context_lifestyle_one_instance_per_locate_call() {
    let scope = InjectionScope::new();
    scope.configure(|block| {
        block
            .export(|_| {
                Ok(Token {
                    id: TOKEN_BUILDS.fetch_add(1, Ordering::SeqCst),
                })
            })
            .per_context();
        block.export(|r| {
            Ok(TokenPair {
                first: r.locate::<Token>()?,
                second: r.locate::<Token>()?,
            })
        });
    });

    let pair = scope.locate::<TokenPair>().unwrap();
    assert!(Arc::ptr_eq(&pair.first, &pair.second));

    let other = scope.locate::<TokenPair>().unwrap();
    assert_ne!(pair.first.id, other.first.id);
}

#[test]
fn test_singleton_survives_dynamic_requests() {
    #[derive(Clone)]
    struct Config;

    let scope = InjectionScope::new();
    scope.configure(|block| {
        block.export(|_| Ok(Config)).singleton();
    });

    let cached = scope.locate::<Config>().unwrap();
    let dynamic = scope
        .locate_with::<Config>(LocateOptions::new().dynamic())
        .unwrap();
    assert!(Arc::ptr_eq(&cached, &dynamic));
}

// =============================================================================
// Disposal
// =============================================================================

#[test]
fn test_disposal_is_lifo_per_scope() {
    struct First;
    struct Second;

    let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
    let first_order = order.clone();
    let second_order = order.clone();

    let root = InjectionScope::new();
    root.configure(move |block| {
        let first_order = first_order.clone();
        let second_order = second_order.clone();
        block
            .export(|_| Ok(First))
            .dispose_with(move |_| first_order.lock().unwrap().push("first"));
        block
            .export(|_| Ok(Second))
            .dispose_with(move |_| second_order.lock().unwrap().push("second"));
    });

    let request = root.begin_lifetime_scope("request");
    let _first = request.locate::<First>().unwrap();
    let _second = request.locate::<Second>().unwrap();

    assert!(order.lock().unwrap().is_empty());
    request.dispose();
    assert_eq!(*order.lock().unwrap(), vec!["second", "first"]);

    // Parent disposal is independent of the child's.
    root.dispose();
    assert_eq!(order.lock().unwrap().len(), 2);
}

#[test]
fn test_owned_bundles_its_own_disposal_scope() {
    struct Resource;

    static RELEASED: AtomicBool = AtomicBool::new(false);

    let scope = InjectionScope::new();
    scope.configure(|block| {
        block
            .export(|_| Ok(Resource))
            .dispose_with(|_| RELEASED.store(true, Ordering::SeqCst));
    });

    let owned = scope.owned::<Resource>().unwrap();
    assert!(!RELEASED.load(Ordering::SeqCst));

    owned.dispose();
    assert!(RELEASED.load(Ordering::SeqCst));
    assert!(!scope.is_disposed());
}

// =============================================================================
// Collections
// =============================================================================

struct Plugin {
    name: &'static str,
}

fn plugin_scope() -> InjectionScope {
    let scope = InjectionScope::new();
    scope.configure(|block| {
        block.export(|_| Ok(Plugin { name: "low" })).with_priority(1);
        block
            .export(|_| Ok(Plugin { name: "high" }))
            .with_priority(10);
        block.export(|_| Ok(Plugin { name: "mid" })).with_priority(5);
        block
            .export(|_| Ok(Plugin { name: "keyed" }))
            .with_key("fallback");
        block
            .export(|_| Ok(Plugin { name: "guarded" }))
            .when(|_| false);
    });
    scope
}

#[test]
fn test_locate_all_counts_and_ordering() {
    let scope = plugin_scope();

    let plugins = scope.locate_all::<Plugin>().unwrap();
    let names: Vec<&str> = plugins.iter().map(|p| p.name).collect();
    assert_eq!(names, vec!["high", "mid", "low"]);

    let keyed = scope
        .locate_all_with::<Plugin>(LocateOptions::new().key("fallback"))
        .unwrap();
    assert_eq!(keyed.len(), 1);
    assert_eq!(keyed[0].name, "keyed");
}

#[test]
fn test_locate_all_merges_parent_chain_child_first() {
    let root = plugin_scope();
    let child = root.create_child_scope("child", |block| {
        block
            .export(|_| Ok(Plugin { name: "child" }))
            .with_priority(0);
    });

    let names: Vec<&str> = child
        .locate_all::<Plugin>()
        .unwrap()
        .iter()
        .map(|p| p.name)
        .collect();
    assert_eq!(names, vec!["child", "high", "mid", "low"]);
}

#[test]
fn test_locate_array_materializes_matching_exports() {
    let scope = plugin_scope();
    let plugins = scope.locate_array::<Plugin>().unwrap();
    assert_eq!(plugins.len(), 3);
    assert_eq!(plugins[0].name, "high");
}

#[test]
fn test_locate_all_sorted_applies_comparator() {
    let scope = plugin_scope();
    let plugins = scope
        .locate_all_sorted::<Plugin>(|a, b| a.name.cmp(b.name))
        .unwrap();
    let names: Vec<&str> = plugins.iter().map(|p| p.name).collect();
    assert_eq!(names, vec!["high", "low", "mid"]);
}

#[test]
fn test_collection_of_lazies() {
    let scope = plugin_scope();

    let lazies = scope.locate_all_lazy::<Plugin>();
    assert_eq!(lazies.len(), 3);
    assert!(lazies.iter().all(|lazy| !lazy.is_evaluated()));
    assert_eq!(lazies[0].value().unwrap().name, "high");
}

// =============================================================================
// Keyed exports
// =============================================================================

#[test]
fn test_keyed_and_keyless_addressing() {
    #[derive(Clone)]
    struct Endpoint {
        url: &'static str,
    }

    let scope = InjectionScope::new();
    scope.configure(|block| {
        block.export(|_| Ok(Endpoint { url: "primary" }));
        block
            .export(|_| Ok(Endpoint { url: "backup" }))
            .with_key("backup")
            .with_priority(100);
    });

    // Keyless export answers unkeyed requests even at lower priority.
    assert_eq!(scope.locate::<Endpoint>().unwrap().url, "primary");
    assert_eq!(
        scope
            .locate_with::<Endpoint>(LocateOptions::new().key("backup"))
            .unwrap()
            .url,
        "backup"
    );
    assert!(scope
        .locate_with::<Endpoint>(LocateOptions::new().key(ExportKey::from("absent")))
        .is_err());
}

// =============================================================================
// Decorators
// =============================================================================

#[test]
fn test_decorators_wrap_by_priority() {
    struct Message(String);

    let scope = InjectionScope::new();
    scope.configure(|block| {
        block.export(|_| Ok(Message("base".to_string())));
        block
            .export_decorator::<Message, _>(|inner, _| Ok(Arc::new(Message(format!("{}|outer", inner.0)))))
            .with_priority(10);
        block
            .export_decorator::<Message, _>(|inner, _| Ok(Arc::new(Message(format!("{}|inner", inner.0)))))
            .with_priority(1);
    });

    let message = scope.locate::<Message>().unwrap();
    assert_eq!(message.0, "base|inner|outer");
}

// =============================================================================
// Missing exports and providers
// =============================================================================

struct ConcreteClass;

#[test]
fn test_missing_export_provider_synthesizes_and_installs() {
    let scope =
        InjectionScope::with_configuration(ScopeConfiguration::new().auto_register_unknown(true));
    scope.configure(|block| {
        block.add_missing_export_provider(|request: &RequestInfo| {
            (request.target.type_id == TypeId::of::<ConcreteClass>())
                .then(|| export_strategy::<ConcreteClass, _>(|_| Ok(ConcreteClass)))
        });
    });

    assert!(!scope.can_locate::<ConcreteClass>());
    assert!(scope.locate::<ConcreteClass>().is_ok());

    // auto_register_unknown installed the synthesized strategy.
    assert!(scope.can_locate::<ConcreteClass>());
}

#[test]
fn test_missing_export_provider_without_auto_register() {
    let scope = InjectionScope::new();
    scope.configure(|block| {
        block.add_missing_export_provider(|request: &RequestInfo| {
            (request.target.type_id == TypeId::of::<ConcreteClass>())
                .then(|| export_strategy::<ConcreteClass, _>(|_| Ok(ConcreteClass)))
        });
    });

    assert!(scope.locate::<ConcreteClass>().is_ok());
    assert!(!scope.can_locate::<ConcreteClass>());
}

#[test]
fn test_missing_export_provider_serves_generic_requests() {
    let scope =
        InjectionScope::with_configuration(ScopeConfiguration::new().auto_register_unknown(true));
    scope.configure(|block| {
        block.add_missing_export_provider(|request: &RequestInfo| {
            (request.target.type_id == TypeId::of::<ConstrainedRepo<u64>>()).then(|| {
                export_strategy::<ConstrainedRepo<u64>, _>(|_| {
                    Ok(ConstrainedRepo {
                        _marker: std::marker::PhantomData,
                    })
                })
            })
        });
    });

    // No open registration for the definition; the provider serves the
    // closed instantiation and auto-registration installs it.
    assert!(!scope.can_locate_generic::<ConstrainedRepo<u64>>());
    assert!(scope.locate_generic::<ConstrainedRepo<u64>>().is_ok());
    assert!(scope.can_locate_generic::<ConstrainedRepo<u64>>());
}

#[test]
fn test_value_provider_serves_generic_requests() {
    let scope = InjectionScope::new();
    scope.configure(|block| {
        block.add_value_provider(TypedValueProvider::new(|| {
            Some(ConstrainedRepo::<u8> {
                _marker: std::marker::PhantomData,
            })
        }));
    });

    assert!(scope.locate_generic::<ConstrainedRepo<u8>>().is_ok());
}

#[test]
fn test_value_provider_supplies_and_null_guards() {
    #[derive(Clone)]
    struct Timeout(u64);

    #[derive(Debug)]
    struct Absent;

    let scope = InjectionScope::new();
    scope.configure(|block| {
        block.add_value_provider(TypedValueProvider::new(|| Some(Timeout(30))));
        block.add_value_provider(TypedValueProvider::<Absent>::new(|| None));
    });

    assert_eq!(scope.locate::<Timeout>().unwrap().0, 30);

    let err = scope.locate::<Absent>().unwrap_err();
    assert!(matches!(err, LocateError::NullInstanceReturned { .. }));
}

// =============================================================================
// Declared-dependency validation
// =============================================================================

#[test]
fn test_validate_reports_missing_declared_dependencies() {
    struct Database;
    struct Metrics;
    struct Repo {
        _db: Arc<Database>,
    }

    let scope = InjectionScope::new();
    scope.configure(|block| {
        block
            .export(|r| {
                Ok(Repo {
                    _db: r.dependency::<Database>("db")?,
                })
            })
            .with_dependency::<Database>("db")
            .with_optional_dependency::<Metrics>("metrics");
    });

    let issues = scope.validate();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].param_name, "db");
    assert!(issues[0].dependency.type_name.contains("Database"));
    assert!(issues[0].to_string().contains("db"));

    scope.configure(|block| {
        block.export(|_| Ok(Database));
    });
    assert!(scope.validate().is_empty());
}

// =============================================================================
// Inspectors
// =============================================================================

#[test]
fn test_inspector_adjusts_batch_strategies() {
    struct Service {
        tag: &'static str,
    }

    let scope = InjectionScope::new();
    scope.configure(|block| {
        block.add_inspector(|strategy: &mut ActivationStrategy| {
            if strategy.name() == Some("winner") {
                strategy.set_priority(100);
            }
        });
        block
            .export(|_| Ok(Service { tag: "boosted" }))
            .as_name("winner");
        block
            .export(|_| Ok(Service { tag: "plain" }))
            .with_priority(50);
    });

    assert_eq!(scope.locate::<Service>().unwrap().tag, "boosted");
}

// =============================================================================
// Wrapper precedence
// =============================================================================

static CUSTOM_WRAPPER_USED: AtomicBool = AtomicBool::new(false);

#[test]
fn test_user_wrapper_strategy_takes_precedence() {
    #[derive(Clone)]
    struct Probe;

    let scope = InjectionScope::new();
    scope.configure(|block| {
        block.export(|_| Ok(Probe));
        block.export_wrapper::<Lazy<Probe>, _>(|r| {
            CUSTOM_WRAPPER_USED.store(true, Ordering::SeqCst);
            Ok(Lazy::new(r.scope().clone()))
        });
    });

    let lazy = scope.lazy::<Probe>().unwrap();
    assert!(CUSTOM_WRAPPER_USED.load(Ordering::SeqCst));
    assert!(lazy.value().is_ok());
}

// =============================================================================
// Conditions
// =============================================================================

#[test]
fn test_conditions_select_by_scope_name() {
    struct Renderer {
        mode: &'static str,
    }

    let root = InjectionScope::new();
    root.configure(|block| {
        block
            .export(|_| Ok(Renderer { mode: "web" }))
            .when(|request| request.scope_name != "worker");
        block
            .export(|_| Ok(Renderer { mode: "headless" }))
            .when(|request| request.scope_name == "worker")
            .with_priority(10);
    });

    let worker = root.begin_lifetime_scope("worker");
    assert_eq!(worker.locate::<Renderer>().unwrap().mode, "headless");
    assert_eq!(root.locate::<Renderer>().unwrap().mode, "web");
}
