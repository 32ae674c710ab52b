use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use common::{Money, Partner, PartnerId};
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Point-in-time view of a partner's credit line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreditSnapshot {
    pub partner_id: PartnerId,
    pub partner_code: String,
    pub credit_limit: Money,
    pub available_credit: Money,
}

impl CreditSnapshot {
    pub fn used_credit(&self) -> Money {
        self.credit_limit - self.available_credit
    }
}

impl From<&Partner> for CreditSnapshot {
    fn from(partner: &Partner) -> Self {
        Self {
            partner_id: partner.id,
            partner_code: partner.code.clone(),
            credit_limit: partner.credit_limit,
            available_credit: partner.available_credit,
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    snapshot: CreditSnapshot,
    expires_at: Instant,
}

/// Cache-aside store of credit snapshots.
///
/// Reads may be stale by up to `ttl`; the ledger invalidates an entry after
/// every write to that partner.
#[derive(Debug, Clone)]
pub struct CreditCache {
    entries: Arc<RwLock<HashMap<PartnerId, Entry>>>,
    ttl: Duration,
}

impl Default for CreditCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

impl CreditCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::default(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn get(&self, partner_id: PartnerId) -> Option<CreditSnapshot> {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .get(&partner_id)
            .filter(|e| e.expires_at > now)
            .map(|e| e.snapshot.clone())
    }

    pub async fn put(&self, snapshot: CreditSnapshot) {
        if self.ttl.is_zero() {
            return;
        }
        let entry = Entry {
            expires_at: Instant::now() + self.ttl,
            snapshot,
        };
        self.entries
            .write()
            .await
            .insert(entry.snapshot.partner_id, entry);
    }

    pub async fn invalidate(&self, partner_id: PartnerId) {
        self.entries.write().await.remove(&partner_id);
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}
