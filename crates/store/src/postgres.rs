use std::collections::HashMap;
use std::str::FromStr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{
    Money, Order, OrderId, OrderItem, OrderItemId, OrderStatus, Partner, PartnerId, Version,
};
use sqlx::postgres::{PgExecutor, PgRow};
use sqlx::{PgPool, Postgres, QueryBuilder, Row, Transaction};
use uuid::Uuid;

use crate::query::{OrderSort, SortDirection};
use crate::{OrderQuery, OrderStore, Page, PartnerLock, PartnerStore, Result, StoreError};

const PARTNER_COLUMNS: &str = "id, code, name, email, credit_limit_cents, \
     available_credit_cents, active, created_at, updated_at, version";

const ORDER_COLUMNS: &str = "id, partner_id, status, created_at, updated_at, version";

/// SQLSTATE raised when `lock_timeout` expires.
const LOCK_NOT_AVAILABLE: &str = "55P03";

/// PostgreSQL-backed partner and order store.
///
/// Exclusive partner access is a `SELECT ... FOR UPDATE` inside a transaction
/// whose `lock_timeout` bounds the wait. The transaction is committed when the
/// lock handle saves and rolled back when it is dropped.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_partner(row: &PgRow) -> Result<Partner> {
        Ok(Partner {
            id: PartnerId::from_uuid(row.try_get::<Uuid, _>("id")?),
            code: row.try_get("code")?,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            credit_limit: Money::from_cents(row.try_get("credit_limit_cents")?),
            available_credit: Money::from_cents(row.try_get("available_credit_cents")?),
            active: row.try_get("active")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            version: Version::new(row.try_get("version")?),
        })
    }

    fn row_to_item(row: &PgRow) -> Result<OrderItem> {
        let id: Uuid = row.try_get("id")?;
        let quantity: i32 = row.try_get("quantity")?;
        let quantity = u32::try_from(quantity).map_err(|_| StoreError::Corrupt {
            entity: "order item",
            id,
            reason: format!("negative quantity {quantity}"),
        })?;

        Ok(OrderItem {
            id: OrderItemId::from_uuid(id),
            code: row.try_get("code")?,
            name: row.try_get("name")?,
            quantity,
            price: Money::from_cents(row.try_get("price_cents")?),
        })
    }

    fn row_to_order(row: &PgRow, items: Vec<OrderItem>) -> Result<Order> {
        let id: Uuid = row.try_get("id")?;
        let status: String = row.try_get("status")?;
        let status = OrderStatus::from_str(&status).map_err(|e| StoreError::Corrupt {
            entity: "order",
            id,
            reason: e.to_string(),
        })?;

        Order::restore(
            OrderId::from_uuid(id),
            PartnerId::from_uuid(row.try_get::<Uuid, _>("partner_id")?),
            items,
            status,
            row.try_get::<DateTime<Utc>, _>("created_at")?,
            row.try_get::<DateTime<Utc>, _>("updated_at")?,
            Version::new(row.try_get("version")?),
        )
        .map_err(|e| StoreError::Corrupt {
            entity: "order",
            id,
            reason: e.to_string(),
        })
    }

    async fn items_for(&self, order_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<OrderItem>>> {
        let rows = sqlx::query(
            r#"
            SELECT id, order_id, code, name, quantity, price_cents
            FROM order_items
            WHERE order_id = ANY($1)
            ORDER BY order_id, position
            "#,
        )
        .bind(order_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut items: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
        for row in &rows {
            let order_id: Uuid = row.try_get("order_id")?;
            items.entry(order_id).or_default().push(Self::row_to_item(row)?);
        }
        Ok(items)
    }
}

/// Inserts or version-checked-updates a partner on any executor.
async fn write_partner<'e, E>(executor: E, mut partner: Partner) -> Result<Partner>
where
    E: PgExecutor<'e>,
{
    let conflict = |partner: &Partner| StoreError::ConcurrencyConflict {
        entity: "partner",
        id: partner.id.as_uuid(),
        expected: partner.version,
    };

    let row = if partner.version.is_initial() {
        sqlx::query(
            r#"
            INSERT INTO partners (id, code, name, email, credit_limit_cents,
                                  available_credit_cents, active, created_at, updated_at, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW(), 1)
            ON CONFLICT (id) DO NOTHING
            RETURNING updated_at, version
            "#,
        )
        .bind(partner.id.as_uuid())
        .bind(&partner.code)
        .bind(&partner.name)
        .bind(&partner.email)
        .bind(partner.credit_limit.cents())
        .bind(partner.available_credit.cents())
        .bind(partner.active)
        .bind(partner.created_at)
        .fetch_optional(executor)
        .await?
    } else {
        sqlx::query(
            r#"
            UPDATE partners
            SET code = $2, name = $3, email = $4, credit_limit_cents = $5,
                available_credit_cents = $6, active = $7,
                updated_at = NOW(), version = version + 1
            WHERE id = $1 AND version = $8
            RETURNING updated_at, version
            "#,
        )
        .bind(partner.id.as_uuid())
        .bind(&partner.code)
        .bind(&partner.name)
        .bind(&partner.email)
        .bind(partner.credit_limit.cents())
        .bind(partner.available_credit.cents())
        .bind(partner.active)
        .bind(partner.version.as_i64())
        .fetch_optional(executor)
        .await?
    };

    let row = row.ok_or_else(|| conflict(&partner))?;
    partner.updated_at = row.try_get("updated_at")?;
    partner.version = Version::new(row.try_get("version")?);
    Ok(partner)
}

struct PgPartnerLock {
    partner: Partner,
    tx: Option<Transaction<'static, Postgres>>,
}

#[async_trait]
impl PartnerLock for PgPartnerLock {
    fn partner(&self) -> &Partner {
        &self.partner
    }

    async fn save(&mut self, partner: Partner) -> Result<Partner> {
        let mut tx = self
            .tx
            .take()
            .ok_or(StoreError::LockReleased(self.partner.id))?;

        let saved = write_partner(&mut *tx, partner).await?;
        tx.commit().await?;
        self.partner = saved.clone();
        Ok(saved)
    }
}

fn lock_error(err: sqlx::Error, partner_id: PartnerId, wait: Duration) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = err
        && db_err.code().as_deref() == Some(LOCK_NOT_AVAILABLE)
    {
        metrics::counter!("partner_lock_timeouts_total").increment(1);
        tracing::warn!(
            partner_id = %partner_id,
            wait_ms = wait.as_millis() as u64,
            "partner lock wait timed out"
        );
        return StoreError::LockTimeout {
            partner_id,
            waited: wait,
        };
    }
    StoreError::Database(err)
}

#[async_trait]
impl PartnerStore for PostgresStore {
    async fn find_by_id(&self, id: PartnerId) -> Result<Option<Partner>> {
        let sql = format!("SELECT {PARTNER_COLUMNS} FROM partners WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_partner).transpose()
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<Partner>> {
        let sql = format!("SELECT {PARTNER_COLUMNS} FROM partners WHERE code = $1");
        let row = sqlx::query(&sql)
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_partner).transpose()
    }

    async fn find_by_id_exclusive(
        &self,
        id: PartnerId,
        wait: Duration,
    ) -> Result<Option<Box<dyn PartnerLock>>> {
        let started = Instant::now();
        let mut tx = self.pool.begin().await?;

        // lock_timeout = 0 would mean "wait forever"
        let millis = wait.as_millis().max(1);
        let set_timeout = format!("SET LOCAL lock_timeout = '{millis}ms'");
        sqlx::query(&set_timeout).execute(&mut *tx).await?;

        let sql = format!("SELECT {PARTNER_COLUMNS} FROM partners WHERE id = $1 FOR UPDATE");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| lock_error(e, id, wait))?;
        metrics::histogram!("partner_lock_wait_seconds").record(started.elapsed().as_secs_f64());

        let Some(row) = row else {
            return Ok(None);
        };

        let lock: Box<dyn PartnerLock> = Box::new(PgPartnerLock {
            partner: Self::row_to_partner(&row)?,
            tx: Some(tx),
        });
        Ok(Some(lock))
    }

    async fn save(&self, partner: Partner) -> Result<Partner> {
        write_partner(&self.pool, partner).await
    }
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &OrderQuery) {
    if let Some(id) = query.order_id {
        builder.push(" AND id = ").push_bind(id.as_uuid());
    }
    if let Some(partner_id) = query.partner_id {
        builder.push(" AND partner_id = ").push_bind(partner_id.as_uuid());
    }
    if let Some(status) = query.status {
        builder.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(from) = query.created_from {
        builder.push(" AND created_at >= ").push_bind(from);
    }
    if let Some(to) = query.created_to {
        builder.push(" AND created_at <= ").push_bind(to);
    }
}

fn sort_column(sort: OrderSort) -> &'static str {
    match sort {
        OrderSort::CreatedAt => "created_at",
        OrderSort::UpdatedAt => "updated_at",
        OrderSort::TotalValue => "total_value_cents",
        OrderSort::Status => "status",
    }
}

#[async_trait]
impl OrderStore for PostgresStore {
    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
        let Some(row) = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };

        let mut items = self.items_for(&[id.as_uuid()]).await?;
        let items = items.remove(&id.as_uuid()).unwrap_or_default();
        Self::row_to_order(&row, items).map(Some)
    }

    async fn save(&self, mut order: Order) -> Result<Order> {
        let conflict = |order: &Order| StoreError::ConcurrencyConflict {
            entity: "order",
            id: order.id.as_uuid(),
            expected: order.version,
        };

        if !order.version.is_initial() {
            let row = sqlx::query(
                r#"
                UPDATE orders
                SET status = $2, updated_at = NOW(), version = version + 1
                WHERE id = $1 AND version = $3
                RETURNING updated_at, version
                "#,
            )
            .bind(order.id.as_uuid())
            .bind(order.status.as_str())
            .bind(order.version.as_i64())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| conflict(&order))?;

            order.updated_at = row.try_get("updated_at")?;
            order.version = Version::new(row.try_get("version")?);
            return Ok(order);
        }

        let mut tx = self.pool.begin().await?;
        let inserted = sqlx::query(
            r#"
            INSERT INTO orders (id, partner_id, total_value_cents, status, created_at, updated_at, version)
            VALUES ($1, $2, $3, $4, $5, NOW(), 1)
            ON CONFLICT (id) DO NOTHING
            RETURNING updated_at
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.partner_id.as_uuid())
        .bind(order.total_value().cents())
        .bind(order.status.as_str())
        .bind(order.created_at)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| conflict(&order))?;

        for (position, item) in order.items().iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_items (id, order_id, position, code, name, quantity, price_cents)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(item.id.as_uuid())
            .bind(order.id.as_uuid())
            .bind(position as i32)
            .bind(&item.code)
            .bind(&item.name)
            .bind(item.quantity as i32)
            .bind(item.price.cents())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        order.updated_at = inserted.try_get("updated_at")?;
        order.version = Version::first();
        Ok(order)
    }

    async fn search(&self, query: OrderQuery) -> Result<Page<Order>> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM orders WHERE 1=1");
        push_filters(&mut count, &query);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let direction = match query.direction {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        };
        let mut select =
            QueryBuilder::<Postgres>::new(format!("SELECT {ORDER_COLUMNS} FROM orders WHERE 1=1"));
        push_filters(&mut select, &query);
        select
            .push(format!(
                " ORDER BY {} {direction}, id {direction}",
                sort_column(query.sort_by)
            ))
            .push(" LIMIT ")
            .push_bind(query.size as i64)
            .push(" OFFSET ")
            .push_bind(i64::try_from(query.offset()).unwrap_or(i64::MAX));

        let rows = select.build().fetch_all(&self.pool).await?;
        let ids: Vec<Uuid> = rows
            .iter()
            .map(|row| row.try_get::<Uuid, _>("id"))
            .collect::<std::result::Result<_, _>>()?;
        let mut items = self.items_for(&ids).await?;

        let orders = rows
            .iter()
            .zip(&ids)
            .map(|(row, id)| Self::row_to_order(row, items.remove(id).unwrap_or_default()))
            .collect::<Result<Vec<_>>>()?;

        Ok(Page::new(orders, total.max(0) as u64, &query))
    }
}
