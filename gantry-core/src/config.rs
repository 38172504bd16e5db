//! Root scope configuration.

/// Configuration applied when building a root [`InjectionScope`](crate::InjectionScope).
///
/// # Examples
///
/// ```rust
/// use gantry_core::{InjectionScope, ScopeConfiguration};
///
/// let config = ScopeConfiguration::new()
///     .cache_shards(32)
///     .auto_register_unknown(true)
///     .max_resolution_depth(128);
///
/// let scope = InjectionScope::with_configuration(config);
/// assert_eq!(scope.scope_name(), "");
/// ```
#[derive(Debug, Clone)]
pub struct ScopeConfiguration {
    pub(crate) cache_shards: usize,
    pub(crate) auto_register_unknown: bool,
    pub(crate) max_resolution_depth: usize,
}

impl Default for ScopeConfiguration {
    fn default() -> Self {
        Self {
            cache_shards: 16,
            auto_register_unknown: false,
            max_resolution_depth: 64,
        }
    }
}

impl ScopeConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of shards in the compiled-delegate cache.
    ///
    /// Rounded up to the next power of two; the minimum is 2.
    pub fn cache_shards(mut self, shards: usize) -> Self {
        self.cache_shards = shards.next_power_of_two().max(2);
        self
    }

    /// When enabled, strategies synthesized by missing-export providers are
    /// installed into the owning container instead of serving one request.
    pub fn auto_register_unknown(mut self, enabled: bool) -> Self {
        self.auto_register_unknown = enabled;
        self
    }

    /// Ceiling for the resolution chain before the request is treated as
    /// circular.
    pub fn max_resolution_depth(mut self, depth: usize) -> Self {
        self.max_resolution_depth = depth.max(1);
        self
    }
}
