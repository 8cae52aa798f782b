//! # smc-core
//!
//! State machine compiler core for smc.
//!
//! This crate provides:
//! - The state machine model
//! - `.sm` lexing and parsing
//! - Guard expression parsing and evaluation
//! - Semantic checks with stable diagnostic codes
//! - Canonical printing (`parse(dump(m)) == m`)
//! - A visitor over the model
//! - Dry-run simulation

pub mod checker;
pub mod definition;
pub mod error;
pub mod guard;
pub mod lexer;
pub mod parser;
pub mod printer;
pub mod simulate;
pub mod visit;

pub use checker::{
    check, check_with, has_errors, CheckOptions, Diagnostic, DiagnosticCode, Severity, Subject,
};
pub use definition::{Declaration, Location, State, StateMachine, Transition};
pub use error::{CoreError, SimulationError, SyntaxError, SyntaxErrorKind};
pub use guard::{GuardEvaluator, GuardExpr};
pub use parser::{parse_file, parse_str, Parser};
pub use printer::dump;
pub use simulate::{Simulator, Step};
pub use visit::{walk, ModelSummary, Node, Visitor};
