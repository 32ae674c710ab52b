use common::IdempotencyKey;
use thiserror::Error;

/// Errors raised by idempotency stores and the request guard.
#[derive(Debug, Error)]
pub enum IdempotencyError {
    #[error("Idempotency key is required")]
    KeyMissing,

    #[error("Invalid idempotency key: {0}")]
    InvalidKey(String),

    /// Another caller holds the claim and did not finish within the wait.
    #[error("Request with idempotency key {0} is still in progress")]
    InProgress(IdempotencyKey),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl IdempotencyError {
    /// True when the caller may retry with the same key.
    pub fn is_retryable(&self) -> bool {
        matches!(self, IdempotencyError::InProgress(_))
    }
}

pub type Result<T> = std::result::Result<T, IdempotencyError>;
