//! Error types for the cloning system

/// Main error type for clone operations.
///
/// A clone operation is all-or-nothing: except for unmappable fields under
/// the skip policy, every error aborts the whole operation and leaves the
/// caller's target graph untouched semantically.
#[derive(Debug, thiserror::Error)]
pub enum CloneError {
    /// Two surrogates claim the same type with equal priority
    #[error("ambiguous surrogate selection for {type_name}: '{first}' and '{second}' both match at priority {priority}")]
    AmbiguousSurrogate {
        type_name: String,
        first: String,
        second: String,
        priority: i32,
    },

    /// A source instance was about to be mapped to a second, different target
    #[error("identity conflict: source 0x{source_key:x} is already mapped to a different target")]
    IdentityConflict { source_key: usize },

    /// A target instance was about to become the image of a second source
    #[error("identity conflict: target 0x{target_key:x} is already the image of another source")]
    TargetAliased { target_key: usize },

    /// A mapping that must exist at this point of the operation is missing
    #[error("missing identity mapping for source 0x{source_key:x}")]
    MappingMissing { source_key: usize },

    /// A surrogate raised an error during setup, late setup, or copy
    #[error("surrogate '{surrogate}' failed on {type_name} at '{field_path}': {message}")]
    SurrogateFailure {
        surrogate: String,
        type_name: String,
        field_path: String,
        message: String,
    },

    /// No surrogate matched and no type descriptor is registered
    #[error("no surrogate or type descriptor for {type_name} at '{field_path}'")]
    UnmappableType {
        type_name: String,
        field_path: String,
    },

    /// A supplied target instance has a different runtime type than its source
    #[error("target type mismatch: expected {expected}, found {found}")]
    TargetMismatch { expected: String, found: String },

    /// Surrogate-internal failure; wrapped with context by the engine
    #[error("{0}")]
    Custom(String),
}

/// Result type used throughout the cloning system.
pub type Result<T> = std::result::Result<T, CloneError>;
