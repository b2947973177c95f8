//! Error types for the TableSage core.

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, TableSageError>;

/// Main error type for configuration, datasets and plan validation.
#[derive(Debug, thiserror::Error)]
pub enum TableSageError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing errors
    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    /// Dataset loading errors
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Retrieval plan validation errors
    #[error("Invalid plan for {intent}: {reason}")]
    InvalidPlan { intent: String, reason: String },
}

impl TableSageError {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new dataset error
    pub fn dataset(msg: impl Into<String>) -> Self {
        Self::Dataset(msg.into())
    }

    /// Create a new plan validation error
    pub fn invalid_plan(intent: impl std::fmt::Display, reason: impl Into<String>) -> Self {
        Self::InvalidPlan {
            intent: intent.to_string(),
            reason: reason.into(),
        }
    }
}
