use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::IdempotencyKey;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::{IdempotencyRecord, IdempotencyStore, Result};

#[derive(Debug, Clone)]
struct Entry {
    record: IdempotencyRecord,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// In-memory idempotency store with lazy expiry.
///
/// Expiry uses the tokio clock so paused-time tests can advance it.
#[derive(Clone, Default)]
pub struct InMemoryIdempotencyStore {
    entries: Arc<RwLock<HashMap<IdempotencyKey, Entry>>>,
}

impl InMemoryIdempotencyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|e| e.is_live(now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drops expired entries.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| e.is_live(now));
        before - entries.len()
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn get_if_present(&self, key: IdempotencyKey) -> Result<Option<IdempotencyRecord>> {
        let now = Instant::now();
        Ok(self
            .entries
            .read()
            .await
            .get(&key)
            .filter(|e| e.is_live(now))
            .map(|e| e.record.clone()))
    }

    async fn put_if_absent(
        &self,
        key: IdempotencyKey,
        record: IdempotencyRecord,
        ttl: Duration,
    ) -> Result<bool> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;

        if let Some(existing) = entries.get(&key)
            && existing.is_live(now)
        {
            return Ok(false);
        }

        entries.insert(
            key,
            Entry {
                record,
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn put(
        &self,
        key: IdempotencyKey,
        record: IdempotencyRecord,
        ttl: Duration,
    ) -> Result<()> {
        self.entries.write().await.insert(
            key,
            Entry {
                record,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn remove(&self, key: IdempotencyKey) -> Result<()> {
        self.entries.write().await.remove(&key);
        Ok(())
    }
}
