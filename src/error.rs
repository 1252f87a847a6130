// Application error taxonomy and its mapping onto HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::db::StoreError;
use crate::oracle::OracleError;
use crate::rate_limit::RateLimitError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A required field is missing or malformed. Never reaches the oracle or the store.
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    RateLimited(#[from] RateLimitError),

    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error(transparent)]
    Store(StoreError),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Oracle(_) | AppError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::PlayerIdTaken => AppError::Conflict(e.to_string()),
            other => AppError::Store(other),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::Oracle(e) => {
                tracing::error!("Oracle error: {e}");
                "Failed to generate a response from the AI service".to_string()
            }
            AppError::Store(e) => {
                tracing::error!("Database error: {e}");
                "Internal server error".to_string()
            }
            AppError::RateLimited(e) => {
                tracing::warn!("{e}");
                e.to_string()
            }
            other => other.to_string(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
