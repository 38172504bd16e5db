//! # Gantry Core
//!
//! Core resolution engine for the Gantry dependency injection container:
//! strategy discovery over closed and open-generic exports, a compilation
//! pipeline that fuses activation strategies into reusable delegates, a
//! concurrency-safe compiled-delegate cache, nested locator scopes with
//! hierarchical fallback, and deterministic LIFO disposal.
//!
//! ## Quick Start
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
//! ## Lifestyles
//!
//! Exports default to transient construction; `singleton()`, `per_scope()`,
//! and `per_context()` switch the lifestyle. Singleton and per-scope
//! construction are single-flight: concurrent first resolves build once.
//!
//! ## Scopes
//!
//! [`InjectionScope::begin_lifetime_scope`] creates a cheap per-request
//! child sharing the root's registrations and delegate cache;
//! [`InjectionScope::create_child_scope`] creates a child with its own
//! registrations that shadow ancestors. Disposal is per scope and strictly
//! LIFO.

pub mod cache;
pub mod collection;
pub mod compiler;
pub mod config;
pub mod context;
pub mod disposal;
pub mod error;
pub mod generics;
pub mod lifestyle;
pub mod logging;
pub mod registration;
pub mod scope;
pub mod strategy;
pub mod types;
pub mod wrappers;

pub use compiler::Resolution;
pub use config::ScopeConfiguration;
pub use context::InjectionContext;
pub use disposal::DisposalScope;
pub use error::{LocateError, Result};
pub use generics::{constraint, GenericDefId, GenericExport};
pub use lifestyle::Lifestyle;
pub use registration::{
    export_strategy, ConfigurationModule, DecoratorBuilder, ExportBuilder, MissingExportProvider,
    OpenGenericBuilder, RegistrationBlock, StrategyInspector, TypedValueProvider, ValueProvider,
};
pub use scope::{DependencyIssue, InjectionScope, LocateOptions, ACTIVATION_STRATEGY_ADD_LOCK};
pub use strategy::{
    ActivationStrategy, DependencyInfo, RequestInfo, RequestOrigin, StrategyKind,
};
pub use types::{ExportKey, Injectable, Instance, TypeInfo};
pub use wrappers::{Factory, FactoryArg, FactoryArg2, Lazy, Owned};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{
        ExportKey, GenericExport, Injectable, InjectionContext, InjectionScope, Lifestyle,
        LocateError, LocateOptions, RegistrationBlock, Resolution, Result, ScopeConfiguration,
    };
    pub use std::sync::Arc;
}
