//! Shared error type and process-wide readiness state.

pub mod error;
pub mod status;

pub use error::{CompileError, CompileResult, ErrorContext};
