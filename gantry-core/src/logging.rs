//! Logging facade for the container.
//!
//! Gantry emits structured `tracing` events on registration and resolution
//! paths (`service`, `scope_id`, `strategy_id` fields). The library never
//! installs a subscriber; applications pick their own
//! `tracing-subscriber` setup.

pub use tracing::{debug, error, info, trace, warn};
