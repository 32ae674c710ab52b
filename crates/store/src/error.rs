use std::time::Duration;

use common::{PartnerId, Version};
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur when interacting with the partner or order store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The record was modified since it was read.
    #[error("Concurrency conflict for {entity} {id}: expected version {expected}")]
    ConcurrencyConflict {
        entity: &'static str,
        id: Uuid,
        expected: Version,
    },

    /// The partner lock could not be acquired within the allowed wait.
    #[error("Timed out after {waited:?} waiting for the lock on partner {partner_id}")]
    LockTimeout {
        partner_id: PartnerId,
        waited: Duration,
    },

    /// A lock handle was used after it had already been released.
    #[error("Lock on partner {0} was already released")]
    LockReleased(PartnerId),

    /// A stored value could not be mapped back to a record.
    #[error("Corrupt {entity} record {id}: {reason}")]
    Corrupt {
        entity: &'static str,
        id: Uuid,
        reason: String,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    /// Returns true if the operation may succeed when retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::ConcurrencyConflict { .. } | StoreError::LockTimeout { .. }
        )
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
