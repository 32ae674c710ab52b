use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use common::{Order, OrderId, Partner, PartnerId, Version};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::query::{OrderSort, SortDirection};
use crate::{OrderQuery, OrderStore, Page, PartnerLock, PartnerStore, Result, StoreError};

/// In-memory partner store.
///
/// Each partner has its own async mutex, so exclusive access to one partner
/// never blocks another.
#[derive(Clone, Default)]
pub struct InMemoryPartnerStore {
    partners: Arc<RwLock<HashMap<PartnerId, Partner>>>,
    locks: Arc<Mutex<HashMap<PartnerId, Arc<Mutex<()>>>>>,
}

impl InMemoryPartnerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn partner_count(&self) -> usize {
        self.partners.read().await.len()
    }

    async fn lock_for(&self, id: PartnerId) -> Arc<Mutex<()>> {
        self.locks.lock().await.entry(id).or_default().clone()
    }
}

fn save_partner(partners: &mut HashMap<PartnerId, Partner>, mut partner: Partner) -> Result<Partner> {
    let current = partners
        .get(&partner.id)
        .map(|p| p.version)
        .unwrap_or(Version::initial());

    if current != partner.version {
        return Err(StoreError::ConcurrencyConflict {
            entity: "partner",
            id: partner.id.as_uuid(),
            expected: partner.version,
        });
    }

    partner.version = partner.version.next();
    partner.updated_at = Utc::now();
    partners.insert(partner.id, partner.clone());
    Ok(partner)
}

struct InMemoryPartnerLock {
    partner: Partner,
    partners: Arc<RwLock<HashMap<PartnerId, Partner>>>,
    guard: Option<OwnedMutexGuard<()>>,
}

#[async_trait]
impl PartnerLock for InMemoryPartnerLock {
    fn partner(&self) -> &Partner {
        &self.partner
    }

    async fn save(&mut self, partner: Partner) -> Result<Partner> {
        let guard = self
            .guard
            .take()
            .ok_or(StoreError::LockReleased(self.partner.id))?;

        let saved = save_partner(&mut *self.partners.write().await, partner)?;
        drop(guard);
        self.partner = saved.clone();
        Ok(saved)
    }
}

#[async_trait]
impl PartnerStore for InMemoryPartnerStore {
    async fn find_by_id(&self, id: PartnerId) -> Result<Option<Partner>> {
        Ok(self.partners.read().await.get(&id).cloned())
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<Partner>> {
        Ok(self
            .partners
            .read()
            .await
            .values()
            .find(|p| p.code == code)
            .cloned())
    }

    async fn find_by_id_exclusive(
        &self,
        id: PartnerId,
        wait: Duration,
    ) -> Result<Option<Box<dyn PartnerLock>>> {
        if !self.partners.read().await.contains_key(&id) {
            return Ok(None);
        }

        let lock = self.lock_for(id).await;
        let started = Instant::now();
        let guard = tokio::time::timeout(wait, lock.lock_owned())
            .await
            .map_err(|_| {
                metrics::counter!("partner_lock_timeouts_total").increment(1);
                tracing::warn!(
                    partner_id = %id,
                    wait_ms = wait.as_millis() as u64,
                    "partner lock wait timed out"
                );
                StoreError::LockTimeout {
                    partner_id: id,
                    waited: wait,
                }
            })?;
        metrics::histogram!("partner_lock_wait_seconds").record(started.elapsed().as_secs_f64());

        let Some(partner) = self.partners.read().await.get(&id).cloned() else {
            return Ok(None);
        };

        let lock: Box<dyn PartnerLock> = Box::new(InMemoryPartnerLock {
            partner,
            partners: self.partners.clone(),
            guard: Some(guard),
        });
        Ok(Some(lock))
    }

    async fn save(&self, partner: Partner) -> Result<Partner> {
        save_partner(&mut *self.partners.write().await, partner)
    }
}

/// In-memory order store.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    orders: Arc<RwLock<HashMap<OrderId, Order>>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn order_count(&self) -> usize {
        self.orders.read().await.len()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn save(&self, mut order: Order) -> Result<Order> {
        let mut orders = self.orders.write().await;
        let current = orders
            .get(&order.id)
            .map(|o| o.version)
            .unwrap_or(Version::initial());

        if current != order.version {
            return Err(StoreError::ConcurrencyConflict {
                entity: "order",
                id: order.id.as_uuid(),
                expected: order.version,
            });
        }

        order.version = order.version.next();
        order.updated_at = Utc::now();
        orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn search(&self, query: OrderQuery) -> Result<Page<Order>> {
        let orders = self.orders.read().await;
        let mut matching: Vec<_> = orders
            .values()
            .filter(|o| query.matches(o))
            .cloned()
            .collect();

        matching.sort_by(|a, b| {
            let ordering = match query.sort_by {
                OrderSort::CreatedAt => a.created_at.cmp(&b.created_at),
                OrderSort::UpdatedAt => a.updated_at.cmp(&b.updated_at),
                OrderSort::TotalValue => a.total_value().cmp(&b.total_value()),
                OrderSort::Status => a.status.as_str().cmp(b.status.as_str()),
            };
            let ordering = ordering.then(a.id.cmp(&b.id));
            match query.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        });

        let total = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(query.offset())
            .take(query.size)
            .collect();

        Ok(Page::new(items, total, &query))
    }
}
