//! Generation error types.

use thiserror::Error;

/// Reasons the generator refuses a machine.
///
/// Generation stops at the first problem found; no partial output is
/// returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("no initial state")]
    NoInitialState,

    #[error("{count} states are marked initial")]
    MultipleInitialStates { count: usize },

    #[error("state '{state}' is declared more than once")]
    DuplicateState { state: String },

    #[error("transition on '{event}' references undeclared state '{state}'")]
    UnresolvedState { state: String, event: String },

    #[error("state '{state}' has more than one unguarded transition on '{event}'")]
    DuplicateTransition { state: String, event: String },

    #[error("'{name}' generates '{generated}', which is not a Python identifier")]
    InvalidIdentifier { name: String, generated: String },

    #[error("states '{first}' and '{second}' both generate class '{class}'")]
    NameCollision {
        first: String,
        second: String,
        class: String,
    },
}

impl GenerationError {
    /// Returns an error code suitable for machine-readable output.
    pub fn code(&self) -> &'static str {
        match self {
            GenerationError::NoInitialState => "NO_INITIAL_STATE",
            GenerationError::MultipleInitialStates { .. } => "MULTIPLE_INITIAL_STATES",
            GenerationError::DuplicateState { .. } => "DUPLICATE_STATE",
            GenerationError::UnresolvedState { .. } => "UNRESOLVED_STATE",
            GenerationError::DuplicateTransition { .. } => "DUPLICATE_TRANSITION",
            GenerationError::InvalidIdentifier { .. } => "INVALID_IDENTIFIER",
            GenerationError::NameCollision { .. } => "NAME_COLLISION",
        }
    }
}
