// Error types for the Gantry container

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, LocateError>;

#[derive(Error, Debug)]
pub enum LocateError {
    #[error(
        "No matching export for '{type_name}' (request chain: {}). Did you forget to register it? Use scope.configure() and block.export().",
        format_chain(.chain)
    )]
    NoMatchingExport {
        type_name: &'static str,
        chain: Vec<String>,
    },

    #[error("Circular dependency detected: {}", format_chain(.chain))]
    CircularDependency { chain: Vec<String> },

    #[error(
        "Constructor parameter '{param}' of '{type_name}' could not be resolved and has no default."
    )]
    MissingConstructorParam {
        type_name: &'static str,
        param: String,
    },

    #[error(
        "Open generic export matched '{type_name}' but its generic constraints were not satisfied."
    )]
    GenericConstraintUnsatisfied { type_name: &'static str },

    #[error("A value provider claimed '{type_name}' but returned no instance.")]
    NullInstanceReturned { type_name: &'static str },

    #[error("Lifestyle violation: {message}")]
    LifestyleViolation { message: String },

    #[error("Scope '{scope_name}' has been disposed. Resolve from a live scope instead.")]
    ScopeDisposed { scope_name: String },

    #[error(
        "Type mismatch: the activated instance could not be downcast to '{expected}'. Check the registration's implementation type."
    )]
    TypeMismatch { expected: &'static str },
}

fn format_chain(chain: &[String]) -> String {
    if chain.is_empty() {
        "<root>".to_string()
    } else {
        chain.join(" -> ")
    }
}

impl LocateError {
    /// True when the error only means "nothing was registered for this type".
    ///
    /// `try_locate` style entry points downgrade exactly this case.
    pub fn is_missing_export(&self) -> bool {
        matches!(self, LocateError::NoMatchingExport { .. })
    }
}
