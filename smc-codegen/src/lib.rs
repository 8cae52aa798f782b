//! # smc-codegen
//!
//! Generates Python class skeletons from a [`smc_core::StateMachine`].
//!
//! Generation refuses machines the generated code could not run correctly
//! (see [`GenerationError`]) and never returns partial output. For a given
//! machine and options the output is byte-for-byte stable.

pub mod error;
pub mod python;
pub mod writer;

pub use error::GenerationError;
pub use python::{generate, pascal_case, Generator, GeneratorOptions};
pub use writer::CodeWriter;
