use async_trait::async_trait;
use common::{Order, OrderId};

use crate::{OrderQuery, Page, Result};

/// Storage for orders and their items.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>>;

    /// Inserts (version 0) or updates an order.
    ///
    /// Items are written only on insert. Fails with `ConcurrencyConflict` if the
    /// stored version differs from `order.version`.
    async fn save(&self, order: Order) -> Result<Order>;

    /// Returns one page of orders matching the query filters.
    async fn search(&self, query: OrderQuery) -> Result<Page<Order>>;
}
