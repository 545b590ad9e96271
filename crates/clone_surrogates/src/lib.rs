//! # Clone Surrogates
//!
//! The standard surrogate set for the cloning system: plain-data leaf types
//! cloned by value, and reference containers whose elements are walked
//! through the operation so ownership, cycles, and skips resolve the same way
//! they do for descriptor-driven types.
//!
//! ## Usage Example
//!
//! ```rust
//! use clone_surrogates::register_standard_surrogates;
//! use clone_system::SurrogateRegistry;
//!
//! let mut surrogates = SurrogateRegistry::new();
//! register_standard_surrogates(&mut surrogates);
//! assert!(!surrogates.is_empty());
//! ```

pub mod containers;
pub mod pod;

pub use containers::{ObjMap, ObjMapSurrogate, ObjVec, ObjVecSurrogate};
pub use pod::PodSurrogate;

use clone_system::SurrogateRegistry;
use std::sync::Arc;
use tracing::debug;

/// Register the standard surrogates: common plain-data types and the
/// reference containers.
pub fn register_standard_surrogates(registry: &mut SurrogateRegistry) {
    registry.register(Arc::new(PodSurrogate::<String>::new()));
    registry.register(Arc::new(PodSurrogate::<bool>::new()));
    registry.register(Arc::new(PodSurrogate::<i32>::new()));
    registry.register(Arc::new(PodSurrogate::<i64>::new()));
    registry.register(Arc::new(PodSurrogate::<u32>::new()));
    registry.register(Arc::new(PodSurrogate::<u64>::new()));
    registry.register(Arc::new(PodSurrogate::<f32>::new()));
    registry.register(Arc::new(PodSurrogate::<f64>::new()));
    registry.register(Arc::new(ObjVecSurrogate));
    registry.register(Arc::new(ObjMapSurrogate));
    debug!(surrogates = registry.len(), "standard surrogates registered");
}

/// Version information for embedders that check compatibility
pub const CLONE_SURROGATES_VERSION: &str = env!("CARGO_PKG_VERSION");
