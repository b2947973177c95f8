//! Error types for backend and generation calls.
//!
//! None of these reach the end user; the orchestrator logs them, counts
//! them by [`FailureKind`] and routes around them.

use std::time::Duration;
use tablesage_core::FailureKind;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BackendError>;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Backend request timed out: {0}")]
    Timeout(String),

    #[error("Malformed backend response: {0}")]
    Malformed(String),

    #[error("Query execution failed: {0}")]
    QueryExecution(String),

    #[error("Backend not configured: {0}")]
    NotConfigured(String),

    #[error("Generation failed: {0}")]
    Generation(#[from] GenerationError),
}

impl BackendError {
    pub fn kind(&self) -> FailureKind {
        match self {
            BackendError::Unavailable(_) => FailureKind::Unavailable,
            BackendError::Timeout(_) => FailureKind::Timeout,
            BackendError::Malformed(_) => FailureKind::Malformed,
            BackendError::QueryExecution(_) => FailureKind::QueryExecution,
            BackendError::NotConfigured(_) => FailureKind::NotConfigured,
            BackendError::Generation(inner) => inner.kind(),
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BackendError::Timeout(err.to_string())
        } else if err.is_decode() {
            BackendError::Malformed(err.to_string())
        } else {
            BackendError::Unavailable(err.to_string())
        }
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        BackendError::Malformed(err.to_string())
    }
}

/// Errors from the text generation capability.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Response error: {0}")]
    Response(String),

    #[error("Generation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Generation request timed out: {0}")]
    RequestTimeout(String),

    #[error("Generation returned no usable text")]
    EmptyOutput,

    #[error("Malformed generation output: {0}")]
    Malformed(String),
}

impl GenerationError {
    pub fn kind(&self) -> FailureKind {
        match self {
            GenerationError::Http(_) | GenerationError::Response(_) => FailureKind::Generation,
            GenerationError::Timeout(_) | GenerationError::RequestTimeout(_) => {
                FailureKind::Timeout
            }
            GenerationError::EmptyOutput => FailureKind::EmptyOutput,
            GenerationError::Malformed(_) => FailureKind::Malformed,
        }
    }
}

impl From<reqwest::Error> for GenerationError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GenerationError::RequestTimeout(err.to_string())
        } else {
            GenerationError::Http(err.to_string())
        }
    }
}
