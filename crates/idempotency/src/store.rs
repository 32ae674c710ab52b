use std::time::Duration;

use async_trait::async_trait;
use common::IdempotencyKey;

use crate::{IdempotencyRecord, Result};

/// Keyed storage for idempotency records with per-entry expiry.
///
/// Expired entries behave as absent for every operation.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    async fn get_if_present(&self, key: IdempotencyKey) -> Result<Option<IdempotencyRecord>>;

    /// Stores the record only if no live entry exists for the key.
    ///
    /// Returns `true` when this call wrote the record. Atomic with respect to
    /// concurrent callers on the same key.
    async fn put_if_absent(
        &self,
        key: IdempotencyKey,
        record: IdempotencyRecord,
        ttl: Duration,
    ) -> Result<bool>;

    /// Stores the record, replacing any existing entry.
    async fn put(&self, key: IdempotencyKey, record: IdempotencyRecord, ttl: Duration)
    -> Result<()>;

    async fn remove(&self, key: IdempotencyKey) -> Result<()>;
}
