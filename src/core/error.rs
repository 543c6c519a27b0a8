//! Unified error handling for oker-web
//!
//! Errors here never reach a client directly. The orchestrator and the HTTP
//! handler render them into the `{success: false, error}` payload.

use std::fmt;

use thiserror::Error;

/// Internal error type shared by the compile pipeline and the transport layer.
#[derive(Debug, Error)]
pub enum CompileError {
    /// Filesystem or process I/O failures
    #[error("{0}")]
    Io(#[from] std::io::Error),

    /// The request body is not syntactically valid JSON
    #[error("Invalid JSON in request")]
    InvalidJson(#[source] serde_json::Error),

    /// The inbound HTTP request could not be read or decoded
    #[error("{0}")]
    Request(String),

    /// Internal system errors
    #[error("{0}")]
    Internal(String),
}

/// Result type alias for compile pipeline operations
pub type CompileResult<T> = std::result::Result<T, CompileError>;

/// Helper trait for adding context to errors
pub trait ErrorContext<T> {
    fn with_context(self, context: &str) -> CompileResult<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: fmt::Display,
{
    fn with_context(self, context: &str) -> CompileResult<T> {
        self.map_err(|e| CompileError::Internal(format!("{context}: {e}")))
    }
}

#[macro_export]
macro_rules! request_error {
    ($fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::core::error::CompileError::Request(format!($fmt $(, $arg)*))
    };
}
