//! Per-field and per-type cloning policy

use serde::{Deserialize, Serialize};

/// How an object reference is treated during cloning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CloneBehavior {
    /// Resolve automatically from the referenced instance's type registration.
    #[default]
    Default,
    /// Assign by reference; external ownership is assumed.
    Reference,
    /// Clone deeply; local ownership is assumed.
    ChildObject,
}

/// Adjustment flags attached to a single field.
///
/// Flags refine the resolved behavior without changing it: a skipped field is
/// never touched, a shallow field receives the source value verbatim, and an
/// identity-relevant field is only transferred when the operation's context
/// preserves identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CloneFieldFlags {
    /// Leave the target field untouched entirely.
    pub skip: bool,
    /// Assign the source value as-is, without identity mapping.
    pub shallow: bool,
    /// Field carries identity data (ids, unique names) and is only copied
    /// when the context requests identity preservation.
    pub identity_relevant: bool,
}

impl CloneFieldFlags {
    /// Flags that skip the field in every phase.
    pub fn skipped() -> Self {
        Self {
            skip: true,
            ..Self::default()
        }
    }

    /// Flags that copy the field as a verbatim reference.
    pub fn shallow() -> Self {
        Self {
            shallow: true,
            ..Self::default()
        }
    }

    /// Flags that tie the field to identity preservation.
    pub fn identity_relevant() -> Self {
        Self {
            identity_relevant: true,
            ..Self::default()
        }
    }
}

/// Optional per-field override of the type-level default behavior.
///
/// At most one override exists per field; a `Default` behavior means the
/// field inherits the referenced instance's type-level policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldOverride {
    pub behavior: CloneBehavior,
    pub flags: CloneFieldFlags,
}

impl FieldOverride {
    /// Override with an explicit behavior and no flags.
    pub fn with_behavior(behavior: CloneBehavior) -> Self {
        Self {
            behavior,
            flags: CloneFieldFlags::default(),
        }
    }

    /// Override with flags only, inheriting the default behavior.
    pub fn with_flags(flags: CloneFieldFlags) -> Self {
        Self {
            behavior: CloneBehavior::Default,
            flags,
        }
    }
}

/// Resolve the effective behavior of a field.
///
/// Resolution order is fixed: the explicit field override wins if present,
/// otherwise the referenced type's declared default applies. The result is
/// deterministic for a given (override, default) pair and never consults
/// operation state.
pub fn resolve_behavior(field: CloneBehavior, type_default: CloneBehavior) -> CloneBehavior {
    match field {
        CloneBehavior::Default => type_default,
        explicit => explicit,
    }
}
