// Gantry - a scope-based dependency injection container for Rust
//
// This library provides strategy-based registration, compiled activation
// delegates, nested locator scopes, and deterministic disposal.

// Re-export core functionality
pub use gantry_core::*;

/// Prelude for convenient imports
pub mod prelude {
    pub use gantry_core::prelude::*;
}
