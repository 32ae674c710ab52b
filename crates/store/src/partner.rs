use std::time::Duration;

use async_trait::async_trait;
use common::{Partner, PartnerId};

use crate::Result;

/// Exclusive access to one partner record.
///
/// The lock is held until the handle is dropped. Saving through the handle
/// writes the partner and releases the lock; dropping it without saving
/// discards any change.
#[async_trait]
pub trait PartnerLock: Send {
    /// The partner as read under the lock.
    fn partner(&self) -> &Partner;

    /// Persists `partner` (version-checked) and releases the lock.
    async fn save(&mut self, partner: Partner) -> Result<Partner>;
}

/// Storage for partners.
#[async_trait]
pub trait PartnerStore: Send + Sync {
    /// Reads a partner without locking.
    async fn find_by_id(&self, id: PartnerId) -> Result<Option<Partner>>;

    async fn find_by_code(&self, code: &str) -> Result<Option<Partner>>;

    /// Locks a partner for update and reads it.
    ///
    /// Waits at most `wait` for a concurrent holder to release the lock and
    /// fails with `LockTimeout` after that. Returns `None` if the partner does
    /// not exist. Locks on different partners never contend.
    async fn find_by_id_exclusive(
        &self,
        id: PartnerId,
        wait: Duration,
    ) -> Result<Option<Box<dyn PartnerLock>>>;

    /// Inserts (version 0) or updates a partner.
    ///
    /// Fails with `ConcurrencyConflict` if the stored version differs from
    /// `partner.version`. Returns the partner at its new version.
    async fn save(&self, partner: Partner) -> Result<Partner>;
}
