use std::time::Duration;

use async_trait::async_trait;
use common::IdempotencyKey;
use sqlx::PgPool;
use sqlx::types::Json;

use crate::{IdempotencyRecord, IdempotencyStore, Result};

/// PostgreSQL-backed idempotency store over the `idempotency_keys` table.
///
/// Expired rows stay in the table until they are replaced or purged, but are
/// never returned.
#[derive(Clone)]
pub struct PostgresIdempotencyStore {
    pool: PgPool,
}

impl PostgresIdempotencyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Deletes expired rows, returning how many were removed.
    pub async fn purge_expired(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM idempotency_keys WHERE expires_at <= NOW()")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl IdempotencyStore for PostgresIdempotencyStore {
    async fn get_if_present(&self, key: IdempotencyKey) -> Result<Option<IdempotencyRecord>> {
        let record: Option<Json<IdempotencyRecord>> = sqlx::query_scalar(
            r#"
            SELECT record FROM idempotency_keys
            WHERE idempotency_key = $1 AND expires_at > NOW()
            "#,
        )
        .bind(key.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(|Json(record)| record))
    }

    async fn put_if_absent(
        &self,
        key: IdempotencyKey,
        record: IdempotencyRecord,
        ttl: Duration,
    ) -> Result<bool> {
        // Only an expired row may be overwritten; a live one leaves zero rows affected.
        let result = sqlx::query(
            r#"
            INSERT INTO idempotency_keys (idempotency_key, record, expires_at)
            VALUES ($1, $2, NOW() + make_interval(secs => $3))
            ON CONFLICT (idempotency_key) DO UPDATE
            SET record = EXCLUDED.record, expires_at = EXCLUDED.expires_at
            WHERE idempotency_keys.expires_at <= NOW()
            "#,
        )
        .bind(key.as_uuid())
        .bind(Json(&record))
        .bind(ttl.as_secs_f64())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn put(
        &self,
        key: IdempotencyKey,
        record: IdempotencyRecord,
        ttl: Duration,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO idempotency_keys (idempotency_key, record, expires_at)
            VALUES ($1, $2, NOW() + make_interval(secs => $3))
            ON CONFLICT (idempotency_key) DO UPDATE
            SET record = EXCLUDED.record, expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(key.as_uuid())
        .bind(Json(&record))
        .bind(ttl.as_secs_f64())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn remove(&self, key: IdempotencyKey) -> Result<()> {
        sqlx::query("DELETE FROM idempotency_keys WHERE idempotency_key = $1")
            .bind(key.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
