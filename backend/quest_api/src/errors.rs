//! Application-wide error types.

use axum::{http::StatusCode, response::IntoResponse, Json};
use quest_engine::EngineError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ServiceError>;

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: &'static str,
}

/// Error returned by HTTP handlers.
#[derive(Debug)]
pub struct ApiError(pub ServiceError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            ServiceError::Engine(e) => match e {
                EngineError::Validation(_) => StatusCode::BAD_REQUEST,
                EngineError::NotFound(_) => StatusCode::NOT_FOUND,
                EngineError::Overcommit { .. } | EngineError::InvalidState(_) => {
                    StatusCode::CONFLICT
                }
                EngineError::QuotaExceeded { .. } => StatusCode::INSUFFICIENT_STORAGE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn kind(&self) -> &'static str {
        match &self.0 {
            ServiceError::Engine(e) => e.kind(),
            ServiceError::Database(_) | ServiceError::Migrate(_) => "database",
            _ => "internal",
        }
    }
}

impl<E: Into<ServiceError>> From<E> for ApiError {
    fn from(e: E) -> Self {
        Self(e.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let body = ErrorResponse {
            error: self.0.to_string(),
            kind: self.kind(),
        };
        (status, Json(body)).into_response()
    }
}
