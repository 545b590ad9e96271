//! Per-operation configuration

use serde::{Deserialize, Serialize};

/// Policy applied when an instance has no matching surrogate and no
/// registered type descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UnmappablePolicy {
    /// Drop every field referencing the instance to a null reference and
    /// continue, logging a warning.
    #[default]
    SkipField,
    /// Abort the whole operation.
    Fail,
}

/// Read-only settings for exactly one root-level clone invocation.
///
/// The context holds no mutable clone state; all per-operation bookkeeping
/// lives in the operation itself. A context may be reused across operations,
/// but never shared between two operations running on the same graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloneProviderContext {
    /// Whether identity-relevant fields are transferred to the target.
    /// Disabled when the clone is meant to produce a new, distinct identity.
    pub preserve_identity: bool,
    /// Policy for instances the system cannot introspect.
    pub unmappable: UnmappablePolicy,
}

impl Default for CloneProviderContext {
    fn default() -> Self {
        Self {
            preserve_identity: true,
            unmappable: UnmappablePolicy::default(),
        }
    }
}

impl CloneProviderContext {
    /// Context for clones that should receive a fresh identity.
    pub fn new_identity() -> Self {
        Self {
            preserve_identity: false,
            ..Self::default()
        }
    }

    /// Set identity preservation.
    pub fn with_preserve_identity(mut self, preserve: bool) -> Self {
        self.preserve_identity = preserve;
        self
    }

    /// Set the unmappable-type policy.
    pub fn with_unmappable(mut self, policy: UnmappablePolicy) -> Self {
        self.unmappable = policy;
        self
    }
}
