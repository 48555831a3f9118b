//! Engine-wide error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed input: non-positive amount, missing field, wrong role.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The contribution would push a counter past its need.
    #[error("Overcommit: requested {requested}, remaining {remaining}")]
    Overcommit { requested: u64, remaining: u64 },

    /// Quest not active, or the stage has no requirement for the attempted action.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The persisted record would exceed the storage budget.
    #[error("Quota exceeded: record needs {required} bytes, quota is {quota} bytes")]
    QuotaExceeded { required: usize, quota: usize },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Short machine-readable tag for API bodies and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Overcommit { .. } => "overcommit",
            Self::InvalidState(_) => "invalid_state",
            Self::QuotaExceeded { .. } => "quota_exceeded",
            Self::NotFound(_) => "not_found",
            Self::Storage(_) | Self::Http(_) | Self::Json(_) | Self::Io(_) => "storage",
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
