//! API error types with HTTP response mapping.

use axum::Json;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use domain::DomainError;
use idempotency::IdempotencyError;
use store::StoreError;
use thiserror::Error;

use crate::response::ErrorResponse;

/// API-level error type that maps to HTTP responses.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Idempotency(#[from] IdempotencyError),

    /// Malformed body, path or query parameter.
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// Error code and HTTP status for this error.
    pub fn code_and_status(&self) -> (&'static str, StatusCode) {
        match self {
            ApiError::Domain(err) => match err {
                DomainError::InsufficientBalance { .. } => ("E002", StatusCode::BAD_REQUEST),
                DomainError::InvalidOrderStatus { .. } => ("E003", StatusCode::BAD_REQUEST),
                DomainError::PartnerNotFound(_) => ("E007", StatusCode::NOT_FOUND),
                DomainError::OrderNotFound(_) => ("E008", StatusCode::NOT_FOUND),
                DomainError::InvalidOrder(_) | DomainError::InvalidAmount(_) => {
                    ("E009", StatusCode::BAD_REQUEST)
                }
                DomainError::Store(StoreError::ConcurrencyConflict { .. }) => {
                    ("E011", StatusCode::CONFLICT)
                }
                DomainError::Store(StoreError::LockTimeout { .. }) => {
                    ("E012", StatusCode::SERVICE_UNAVAILABLE)
                }
                DomainError::Store(_) => ("E000", StatusCode::INTERNAL_SERVER_ERROR),
            },
            ApiError::Idempotency(err) => match err {
                IdempotencyError::KeyMissing | IdempotencyError::InvalidKey(_) => {
                    ("E001", StatusCode::BAD_REQUEST)
                }
                IdempotencyError::InProgress(_) => ("E011", StatusCode::CONFLICT),
                IdempotencyError::Serialization(_) | IdempotencyError::Database(_) => {
                    ("E000", StatusCode::INTERNAL_SERVER_ERROR)
                }
            },
            ApiError::BadRequest(_) => ("E009", StatusCode::BAD_REQUEST),
            ApiError::Internal(_) => ("E000", StatusCode::INTERNAL_SERVER_ERROR),
        }
    }

    fn is_retryable(&self) -> bool {
        match self {
            ApiError::Domain(err) => err.is_retryable(),
            ApiError::Idempotency(err) => err.is_retryable(),
            _ => false,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (code, status) = self.code_and_status();
        metrics::counter!("api_errors_total", "code" => code).increment(1);

        let message = if status.is_server_error() && !self.is_retryable() {
            tracing::error!(error = %self, code, "internal server error");
            "Unexpected error".to_string()
        } else {
            tracing::debug!(error = %self, code, "request rejected");
            self.to_string()
        };

        let body = Json(ErrorResponse::new(code, message));
        if self.is_retryable() {
            (status, [(header::RETRY_AFTER, "1")], body).into_response()
        } else {
            (status, body).into_response()
        }
    }
}
