use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use utoipa::ToSchema;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Search index error: {0}")]
    Index(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Order history error: {0}")]
    OrderHistory(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Timed out after {0} ms")]
    Timeout(u128),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

/// Run a backend call under a deadline; elapsing maps to [`CatalogError::Timeout`]
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> CatalogResult<T>
where
    F: Future<Output = CatalogResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(CatalogError::Timeout(limit.as_millis())),
    }
}

/// JSON error body returned by the search endpoints
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Integer error code for logging and monitoring
    pub code: i32,
    /// Machine-readable error identifier
    pub error: String,
    /// Human-readable error message
    pub message: String,
}

impl CatalogError {
    fn status_and_code(&self) -> (StatusCode, i32, &'static str) {
        match self {
            CatalogError::Validation(_) => (StatusCode::BAD_REQUEST, 1001, "BAD_REQUEST"),
            CatalogError::Index(_) | CatalogError::Timeout(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, 1503, "SERVICE_UNAVAILABLE")
            }
            CatalogError::Cache(_)
            | CatalogError::OrderHistory(_)
            | CatalogError::Catalog(_)
            | CatalogError::Serialization(_)
            | CatalogError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                1500,
                "INTERNAL_SERVER_ERROR",
            ),
        }
    }
}

impl IntoResponse for CatalogError {
    fn into_response(self) -> Response {
        let (status, code, error) = self.status_and_code();

        // Backend details stay in the logs, clients get a generic message
        let message = match &self {
            CatalogError::Validation(msg) => msg.clone(),
            CatalogError::Index(_) | CatalogError::Timeout(_) => {
                tracing::error!(error_code = code, "Search backend unavailable: {}", self);
                "Search is temporarily unavailable".to_string()
            }
            _ => {
                tracing::error!(error_code = code, "Internal error: {}", self);
                "An internal error occurred".to_string()
            }
        };

        let body = ErrorResponse {
            code,
            error: error.to_string(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

impl From<redis::RedisError> for CatalogError {
    fn from(err: redis::RedisError) -> Self {
        CatalogError::Cache(err.to_string())
    }
}

impl From<reqwest::Error> for CatalogError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return CatalogError::Index(format!("request timed out: {}", err));
        }
        CatalogError::Index(err.to_string())
    }
}

impl From<serde_json::Error> for CatalogError {
    fn from(err: serde_json::Error) -> Self {
        CatalogError::Serialization(err.to_string())
    }
}

impl From<sea_orm::DbErr> for CatalogError {
    fn from(err: sea_orm::DbErr) -> Self {
        CatalogError::OrderHistory(err.to_string())
    }
}

impl From<validator::ValidationErrors> for CatalogError {
    fn from(err: validator::ValidationErrors) -> Self {
        CatalogError::Validation(err.to_string())
    }
}
