//! Error types for the houm-insight engine.
//!
//! All fallible operations return [`EngineError`]. Callers that sit in front of
//! the engine (an HTTP layer, a CLI) branch on [`EngineError::kind`] to decide
//! between a client error and a server error; the engine never does that
//! mapping itself.

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// The main error type for the engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The caller supplied a payload the engine cannot interpret at all.
    ///
    /// Malformed values for individual filter keys never produce this error;
    /// they are dropped by the compiler.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A query against the dataset failed or the dataset could not be reached.
    #[error("Backend unavailable during {operation}: {message}")]
    BackendUnavailable {
        /// The executor operation that failed (e.g. "count", "histogram")
        operation: String,
        /// Detailed error message
        message: String,
        /// Optional underlying error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The estimation did not finish within the allotted time.
    #[error("Estimation timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The field catalog or engine configuration is unusable.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An identifier failed SQL safety validation.
    #[error("Security error: {0}")]
    SecurityError(String),
}

/// Coarse classification of [`EngineError`] for callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    BackendUnavailable,
    Timeout,
    Configuration,
}

impl ErrorKind {
    /// Returns the snake_case name used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::BackendUnavailable => "backend_unavailable",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Configuration => "configuration",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A type alias for `Result<T, EngineError>`.
pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    /// Returns the classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::InvalidInput(_) => ErrorKind::InvalidInput,
            EngineError::BackendUnavailable { .. } => ErrorKind::BackendUnavailable,
            EngineError::Timeout(_) => ErrorKind::Timeout,
            EngineError::Configuration(_) | EngineError::SecurityError(_) => {
                ErrorKind::Configuration
            }
        }
    }

    /// Creates a new invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Creates a new configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Creates a new backend error without an underlying source.
    pub fn backend(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            operation: operation.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new backend error wrapping the error that caused it.
    pub fn backend_with_source(
        operation: impl Into<String>,
        message: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::BackendUnavailable {
            operation: operation.into(),
            message: message.into(),
            source: Some(source),
        }
    }
}

impl From<datafusion::error::DataFusionError> for EngineError {
    fn from(err: datafusion::error::DataFusionError) -> Self {
        Self::backend_with_source("datafusion", err.to_string(), Box::new(err))
    }
}

impl From<arrow::error::ArrowError> for EngineError {
    fn from(err: arrow::error::ArrowError) -> Self {
        Self::backend_with_source("arrow", err.to_string(), Box::new(err))
    }
}

/// Extension trait for attaching the failing executor operation to an error.
pub trait ErrorContext<T> {
    /// Converts the error into [`EngineError::BackendUnavailable`] for `operation`.
    fn context(self, operation: &str) -> Result<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, operation: &str) -> Result<T> {
        self.map_err(|e| EngineError::backend_with_source(operation, e.to_string(), Box::new(e)))
    }
}
