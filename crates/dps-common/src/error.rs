//! Error types for DPS

use thiserror::Error;

/// Result type alias for DPS operations
pub type Result<T> = std::result::Result<T, DpsError>;

/// Main error type for DPS
#[derive(Error, Debug)]
pub enum DpsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Malformed dataset url: {0}")]
    MalformedDatasetUrl(String),

    #[error("Invalid value '{value}' for task parameter {name}: {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Incomplete revision selector: {0}")]
    IncompleteRevision(String),

    #[error("Invalid task: {0}")]
    InvalidTask(String),

    #[error("Unknown task state: {0}")]
    UnknownState(String),
}

impl DpsError {
    pub fn invalid_parameter(
        name: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }
}
