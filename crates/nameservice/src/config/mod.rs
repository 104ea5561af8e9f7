//! Resolution service configuration.
//!
//! Split into:
//! - `types`: configuration data structures and defaults
//! - `methods`: builder and helper methods

pub mod methods;
pub mod types;

pub use types::{ServiceConfig, ServiceConfigBuilder, DEFAULT_CACHE_SIZE};
