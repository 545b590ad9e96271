//! # Clone System
//!
//! Generic, deep object-graph cloning: given an arbitrary graph of
//! interconnected objects and values, produce an independent target graph
//! that preserves the source graph's topology, cycles and shared references
//! included. Each object declares whether it is copied by reference
//! (externally owned) or duplicated (owned child data).
//!
//! ## Key Concepts
//!
//! - **CloneProvider**: entry point; runs one setup+copy pass per invocation
//! - **Surrogates**: pluggable strategies overriding default field-by-field
//!   cloning for specific types, selected by priority
//! - **Identity map**: source→target correspondence for one operation; makes
//!   cycles and shared references safe
//! - **Type descriptors**: ahead-of-time field tables replacing runtime
//!   reflection for the default cloning path
//!
//! ## Usage Example
//!
//! ```rust
//! use clone_system::*;
//! use std::sync::Arc;
//!
//! #[derive(Default)]
//! struct Node {
//!     value: i64,
//!     next: Option<ObjRef>,
//! }
//!
//! let mut types = TypeRegistry::new();
//! types.register(
//!     TypeDescriptor::of::<Node>("Node")
//!         .value_field("value", |s: &Node, t: &mut Node| t.value = s.value)
//!         .object_field(
//!             "next",
//!             |n: &Node| n.next.clone(),
//!             |n: &mut Node, v| n.next = v,
//!         )
//!         .build(),
//! );
//!
//! let provider = CloneProvider::new(Arc::new(SurrogateRegistry::new()), Arc::new(types));
//!
//! // A self-referential node clones without recursing forever.
//! let node = new_obj(Node { value: 5, next: None });
//! with_obj_mut(&node, |n: &mut Node| n.next = Some(node.clone()));
//!
//! let cloned = provider
//!     .clone_object(&node, &CloneProviderContext::default())
//!     .unwrap();
//! assert!(!same_obj(&node, &cloned));
//! with_obj(&cloned, |n: &Node| {
//!     assert_eq!(n.value, 5);
//!     assert!(same_obj(n.next.as_ref().unwrap(), &cloned));
//! })
//! .unwrap();
//! ```

pub mod behavior;
pub mod context;
pub mod descriptor;
pub mod error;
pub mod identity;
pub mod operation;
pub mod surrogate;
pub mod types;

#[cfg(test)]
mod test_graphs;

// Re-exports for convenience
pub use behavior::{resolve_behavior, CloneBehavior, CloneFieldFlags, FieldOverride};
pub use context::{CloneProviderContext, UnmappablePolicy};
pub use descriptor::{
    DescriptorSurrogate, TypeDescriptor, TypeDescriptorBuilder, TypeRegistry,
};
pub use error::{CloneError, Result};
pub use identity::IdentityMap;
pub use operation::{CloneProvider, CloneStats};
pub use surrogate::{CloneOperation, CloneSurrogate, CloneTargetSetup, SurrogateRegistry};
pub use types::{
    new_obj, obj_key, obj_type_id, same_obj, with_obj, with_obj_mut, ObjKey, ObjRef,
};

/// Version information for embedders that check compatibility
pub const CLONE_SYSTEM_VERSION: &str = env!("CARGO_PKG_VERSION");
