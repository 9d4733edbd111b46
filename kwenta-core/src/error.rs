use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Error taxonomy for the finance engine.
///
/// Financial state changes are never silently dropped: collaborator
/// failures that happen after a committed write are reported as warnings
/// on the success payload by the services, not raised through this type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed input. Caller's fault, never retried.
    #[error("Validation error: {0}")]
    Validation(anyhow::Error),

    /// Missing entity, or an entity owned by a different user.
    #[error("Not found: {0}")]
    NotFound(anyhow::Error),

    /// Illegal state transition or business-rule violation.
    #[error("Invalid operation: {0}")]
    InvalidOperation(anyhow::Error),

    /// A transactional write lost a race. The caller should retry the
    /// whole operation, not just the failed step.
    #[error("Concurrency conflict: {0}")]
    ConcurrencyConflict(anyhow::Error),

    /// A downstream collaborator (PDF, email, exchange rates) failed.
    #[error("{service} error: {source}")]
    ExternalService {
        service: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Database error: {0}")]
    Database(anyhow::Error),

    #[error("Configuration error: {0}")]
    Config(anyhow::Error),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn external(service: impl Into<String>, source: anyhow::Error) -> Self {
        AppError::ExternalService {
            service: service.into(),
            source,
        }
    }

    /// Stable label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation",
            AppError::NotFound(_) => "not_found",
            AppError::InvalidOperation(_) => "invalid_operation",
            AppError::ConcurrencyConflict(_) => "concurrency_conflict",
            AppError::ExternalService { .. } => "external_service",
            AppError::Database(_) => "database",
            AppError::Config(_) => "config",
            AppError::Internal(_) => "internal",
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(anyhow::Error::new(err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(anyhow::Error::new(err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: String,
            #[serde(skip_serializing_if = "Option::is_none")]
            details: Option<String>,
            #[serde(skip_serializing_if = "std::ops::Not::not")]
            retryable: bool,
        }

        let (status, error_message, details, retryable) = match self {
            AppError::Validation(err) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                err.to_string(),
                None,
                false,
            ),
            AppError::NotFound(err) => (StatusCode::NOT_FOUND, err.to_string(), None, false),
            AppError::InvalidOperation(err) => {
                (StatusCode::CONFLICT, err.to_string(), None, false)
            }
            AppError::ConcurrencyConflict(err) => {
                (StatusCode::CONFLICT, err.to_string(), None, true)
            }
            AppError::ExternalService { service, source } => (
                StatusCode::BAD_GATEWAY,
                format!("{} unavailable", service),
                Some(source.to_string()),
                true,
            ),
            AppError::Database(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Database error".to_string(),
                Some(err.to_string()),
                false,
            ),
            AppError::Config(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Configuration error".to_string(),
                Some(err.to_string()),
                false,
            ),
            AppError::Internal(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
                Some(err.to_string()),
                false,
            ),
        };

        (
            status,
            Json(ErrorResponse {
                error: error_message,
                details,
                retryable,
            }),
        )
            .into_response()
    }
}
