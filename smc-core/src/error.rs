//! Core error types.

use crate::definition::Location;
use std::path::PathBuf;
use thiserror::Error;

/// Errors from loading a state machine.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("failed to read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}:{error}", path.display())]
    Syntax {
        path: PathBuf,
        #[source]
        error: SyntaxError,
    },
}

impl CoreError {
    /// Returns an error code suitable for machine-readable output.
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::Io { .. } => "IO_ERROR",
            CoreError::Syntax { error, .. } => error.code(),
        }
    }

    /// Returns the syntax error, if this is one.
    pub fn as_syntax(&self) -> Option<&SyntaxError> {
        match self {
            CoreError::Syntax { error, .. } => Some(error),
            CoreError::Io { .. } => None,
        }
    }
}

/// A fatal error raised while tokenizing or parsing `.sm` source.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{location}: {kind}")]
pub struct SyntaxError {
    pub location: Location,
    pub kind: SyntaxErrorKind,
}

impl SyntaxError {
    pub fn new(location: Location, kind: SyntaxErrorKind) -> Self {
        Self { location, kind }
    }

    /// Stable code for the error kind.
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }
}

/// What went wrong during parsing.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyntaxErrorKind {
    #[error("unexpected character '{0}'")]
    UnexpectedCharacter(char),

    #[error("unterminated guard, expected ']'")]
    UnterminatedGuard,

    #[error("expected {expected}, found {found}")]
    UnexpectedToken { expected: String, found: String },

    #[error("state '{state}' already has an {clause} action")]
    DuplicateClause { clause: &'static str, state: String },

    #[error("'machine' header must be the first declaration")]
    MisplacedHeader,

    #[error("invalid guard expression: {reason}")]
    InvalidGuard { reason: String },
}

impl SyntaxErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            SyntaxErrorKind::UnexpectedCharacter(_) => "UNEXPECTED_CHARACTER",
            SyntaxErrorKind::UnterminatedGuard => "UNTERMINATED_GUARD",
            SyntaxErrorKind::UnexpectedToken { .. } => "UNEXPECTED_TOKEN",
            SyntaxErrorKind::DuplicateClause { .. } => "DUPLICATE_CLAUSE",
            SyntaxErrorKind::MisplacedHeader => "MISPLACED_HEADER",
            SyntaxErrorKind::InvalidGuard { .. } => "INVALID_GUARD",
        }
    }
}

/// Errors from dry-running a machine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulationError {
    #[error("machine has no unique initial state")]
    NoInitialState,

    #[error("invalid transition: cannot apply '{event}' in state '{state}'")]
    InvalidTransition { state: String, event: String },

    #[error("guard failed: no guard for '{event}' holds in state '{state}'")]
    GuardFailed { state: String, event: String },

    #[error("transition target '{state}' is not declared")]
    UnknownState { state: String },
}

impl SimulationError {
    /// Returns an error code suitable for machine-readable output.
    pub fn error_code(&self) -> &'static str {
        match self {
            SimulationError::NoInitialState => "NO_INITIAL_STATE",
            SimulationError::InvalidTransition { .. } => "INVALID_TRANSITION",
            SimulationError::GuardFailed { .. } => "GUARD_FAILED",
            SimulationError::UnknownState { .. } => "UNKNOWN_STATE",
        }
    }
}
