//! Error types for assembling an assistant.
//!
//! Answering a query never fails; these errors only come from wiring the
//! assistant together at startup.

use tablesage_backends::{BackendError, GenerationError};
use tablesage_core::TableSageError;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Core(#[from] TableSageError),

    #[error("Backend setup failed: {0}")]
    Backend(#[from] BackendError),

    #[error("Generator setup failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("Missing component: {0}")]
    Missing(String),
}
