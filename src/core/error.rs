//! Typed error handling for the graphex engine
//!
//! A single [`GraphexError`] travels through the whole pipeline. It is `Clone`
//! because one rejected [`DeferredResult`](crate::execution::DeferredResult)
//! can be observed by any number of dependent nodes, each of which rejects
//! with the very same error.
//!
//! # Error Categories
//!
//! - Build-time errors raised while the visitor walks the request
//!   ([`GraphexError::Build`]); these are programming errors in hook wiring.
//! - Executor errors ([`GraphexError::Executor`]) carry the back end's error
//!   untouched; `Display` is transparent.
//! - Double resolution ([`GraphexError::AlreadySettled`]) signals a bug in the
//!   dependency graph.
//! - Validation errors raised by hooks ([`GraphexError::Validation`]).
//!
//! # Example
//!
//! ```rust,ignore
//! match transaction.execute(&executor).await {
//!     Err(GraphexError::Executor { operation, cause }) => {
//!         eprintln!("{} failed: {}", operation, cause);
//!     }
//!     Err(e) => eprintln!("Other error: {}", e),
//!     Ok(()) => {}
//! }
//! ```

use std::sync::Arc;
use thiserror::Error;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, GraphexError>;

/// The main error type for the graphex engine
#[derive(Debug, Clone, Error)]
pub enum GraphexError {
    /// A hook found the stack in a shape it did not expect
    #[error("Build error at '{path}': {message}")]
    Build { path: String, message: String },

    /// The executor rejected a request
    #[error("{cause}")]
    Executor {
        operation: String,
        cause: Arc<anyhow::Error>,
    },

    /// A deferred result was resolved or rejected twice
    #[error("Deferred result already settled: {provenance}")]
    AlreadySettled { provenance: String },

    /// The resolver side of a deferred result went away before settling it
    #[error("Deferred result was never settled: {provenance}")]
    Unsettled { provenance: String },

    /// Input rejected by a hook
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Malformed embedded-array or selector predicate
    #[error("Invalid predicate: {message}")]
    InvalidPredicate { message: String },

    /// A value that should be a store reference is not one
    #[error("Invalid reference: {message}")]
    InvalidReference { message: String },

    /// The request document could not be parsed or has no usable operation
    #[error("Request error: {message}")]
    Parse { message: String },

    /// Model configuration is inconsistent
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl GraphexError {
    /// Build-time error with the stack breadcrumb attached
    pub fn build(path: impl Into<String>, message: impl Into<String>) -> Self {
        GraphexError::Build {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Wrap an executor failure for the named operation
    pub fn executor(operation: impl Into<String>, cause: anyhow::Error) -> Self {
        GraphexError::Executor {
            operation: operation.into(),
            cause: Arc::new(cause),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        GraphexError::Validation {
            message: message.into(),
        }
    }

    pub fn invalid_predicate(message: impl Into<String>) -> Self {
        GraphexError::InvalidPredicate {
            message: message.into(),
        }
    }

    /// The executor's own error, if this is an executor rejection
    pub fn executor_error(&self) -> Option<&anyhow::Error> {
        match self {
            GraphexError::Executor { cause, .. } => Some(cause.as_ref()),
            _ => None,
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            GraphexError::Build { .. } => "BUILD_ERROR",
            GraphexError::Executor { .. } => "EXECUTOR_ERROR",
            GraphexError::AlreadySettled { .. } => "ALREADY_SETTLED",
            GraphexError::Unsettled { .. } => "UNSETTLED",
            GraphexError::Validation { .. } => "VALIDATION_ERROR",
            GraphexError::InvalidPredicate { .. } => "INVALID_PREDICATE",
            GraphexError::InvalidReference { .. } => "INVALID_REFERENCE",
            GraphexError::Parse { .. } => "REQUEST_ERROR",
            GraphexError::Config { .. } => "CONFIG_ERROR",
        }
    }
}
