//! Application error type.
//!
//! Every fallible operation in the workspace returns [`AppResult`]. Each
//! variant carries a stable error code and maps to an HTTP status so that
//! handlers can simply `?` and let [`IntoResponse`] build the envelope.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::response::ApiResponse;

/// Result alias used across all crates.
pub type AppResult<T> = Result<T, AppError>;

/// Unified application error.
#[derive(Debug, Error)]
pub enum AppError {
    /// Request or invocation failed validation.
    #[error("validation error: {0}")]
    Validation(String),

    /// Host, user or database name missing from the connection configuration.
    #[error("database is not configured")]
    DatabaseNotConfigured,

    /// Opening a database connection failed.
    #[error("database connection failed: {0}")]
    DatabaseConnection(String),

    /// All pooled connections are busy and the pool is set not to wait.
    #[error("connection pool exhausted")]
    PoolExhausted,

    /// The statement reached the database and failed there.
    #[error("database query failed: {0}")]
    DatabaseQuery(String),

    /// The fallback dataset could not be read or parsed.
    #[error("fallback dataset error: {0}")]
    FallbackLoad(String),

    /// Entity lookup returned nothing.
    #[error("{0} not found")]
    NotFound(String),

    /// Invalid configuration value.
    #[error("configuration error: {0}")]
    Config(String),

    /// JSON (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable error code for API clients.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::DatabaseNotConfigured => "DATABASE_NOT_CONFIGURED",
            AppError::DatabaseConnection(_) => "DATABASE_CONNECTION_ERROR",
            AppError::PoolExhausted => "POOL_EXHAUSTED",
            AppError::DatabaseQuery(_) => "DATABASE_QUERY_ERROR",
            AppError::FallbackLoad(_) => "FALLBACK_LOAD_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::DatabaseNotConfigured
            | AppError::DatabaseConnection(_)
            | AppError::PoolExhausted => StatusCode::SERVICE_UNAVAILABLE,
            AppError::DatabaseQuery(_) => StatusCode::BAD_GATEWAY,
            AppError::FallbackLoad(_)
            | AppError::Config(_)
            | AppError::Serialization(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "请求处理失败");
        } else {
            tracing::debug!(code = self.code(), error = %self, "请求被拒绝");
        }
        let body = ApiResponse::err(self.code(), self.to_string());
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AppError::Validation("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::NotFound("patient 1".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::DatabaseNotConfigured.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_not_found_message() {
        let err = AppError::NotFound("doctor 7".into());
        assert_eq!(err.to_string(), "doctor 7 not found");
        assert_eq!(err.code(), "NOT_FOUND");
    }
}
