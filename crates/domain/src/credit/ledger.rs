use std::time::Duration;

use common::{Money, Partner, PartnerId};
use store::{PartnerLock, PartnerStore};

use super::{CreditCache, CreditSnapshot};
use crate::{DomainError, Result};

/// Keeps each partner's available credit within `0..=credit_limit`.
///
/// Every mutation runs under the partner's exclusive lock, so operations on
/// one partner are serialized while different partners proceed in parallel.
/// Reads go through a [`CreditCache`] and are advisory only.
pub struct CreditLedger<P> {
    partners: P,
    cache: CreditCache,
    lock_timeout: Duration,
}

impl<P: PartnerStore> CreditLedger<P> {
    pub fn new(partners: P) -> Self {
        Self {
            partners,
            cache: CreditCache::default(),
            lock_timeout: Duration::from_secs(2),
        }
    }

    /// Sets the longest wait for a partner lock.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_cache(mut self, cache: CreditCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn partners(&self) -> &P {
        &self.partners
    }

    pub fn cache(&self) -> &CreditCache {
        &self.cache
    }

    /// Current credit of a partner, served from cache when fresh.
    #[tracing::instrument(skip(self))]
    pub async fn available_credit(&self, partner_id: PartnerId) -> Result<CreditSnapshot> {
        if let Some(snapshot) = self.cache.get(partner_id).await {
            return Ok(snapshot);
        }

        let partner = self
            .partners
            .find_by_id(partner_id)
            .await?
            .ok_or(DomainError::PartnerNotFound(partner_id))?;
        let snapshot = CreditSnapshot::from(&partner);
        self.cache.put(snapshot.clone()).await;
        Ok(snapshot)
    }

    /// Advisory pre-check that `amount` fits the partner's available credit.
    ///
    /// Takes no lock. The authoritative check is the one inside [`debit`](Self::debit).
    #[tracing::instrument(skip(self))]
    pub async fn check_available(&self, partner_id: PartnerId, amount: Money) -> Result<()> {
        ensure_non_negative(amount)?;
        let snapshot = self.available_credit(partner_id).await?;

        if snapshot.available_credit < amount {
            metrics::counter!("credit_rejections_total", "stage" => "check").increment(1);
            return Err(DomainError::InsufficientBalance {
                partner_code: snapshot.partner_code,
                requested: amount,
                available: snapshot.available_credit,
            });
        }
        Ok(())
    }

    /// Reserves `amount` of the partner's credit.
    #[tracing::instrument(skip(self))]
    pub async fn debit(&self, partner_id: PartnerId, amount: Money) -> Result<Partner> {
        ensure_non_negative(amount)?;
        let mut lock = self.lock(partner_id).await?;
        let partner = lock.partner().clone();

        if !partner.has_available_credit(amount) {
            metrics::counter!("credit_rejections_total", "stage" => "debit").increment(1);
            tracing::info!(
                partner_id = %partner_id,
                requested = %amount,
                available = %partner.available_credit,
                "debit rejected"
            );
            return Err(DomainError::InsufficientBalance {
                partner_code: partner.code,
                requested: amount,
                available: partner.available_credit,
            });
        }

        let available = partner.available_credit - amount;
        let saved = lock.save(partner.with_available_credit(available)).await?;
        self.cache.invalidate(partner_id).await;

        metrics::counter!("credit_debits_total").increment(1);
        tracing::info!(
            partner_id = %partner_id,
            amount = %amount,
            available = %saved.available_credit,
            "credit debited"
        );
        Ok(saved)
    }

    /// Returns `amount` to the partner, never past the credit limit.
    ///
    /// Any excess over the limit is dropped and logged.
    #[tracing::instrument(skip(self))]
    pub async fn credit(&self, partner_id: PartnerId, amount: Money) -> Result<Partner> {
        ensure_non_negative(amount)?;
        let mut lock = self.lock(partner_id).await?;
        let partner = lock.partner().clone();

        let restored = partner.available_credit + amount;
        if restored > partner.credit_limit {
            tracing::warn!(
                partner_id = %partner_id,
                amount = %amount,
                discarded = %(restored - partner.credit_limit),
                "refund exceeds credit limit; clamping"
            );
        }
        let available = restored.min(partner.credit_limit);

        let saved = lock.save(partner.with_available_credit(available)).await?;
        self.cache.invalidate(partner_id).await;

        metrics::counter!("credit_refunds_total").increment(1);
        tracing::info!(
            partner_id = %partner_id,
            amount = %amount,
            available = %saved.available_credit,
            "credit refunded"
        );
        Ok(saved)
    }

    /// Changes the credit limit while keeping the amount in use.
    ///
    /// Available credit becomes `max(new_limit - used, 0)`.
    #[tracing::instrument(skip(self))]
    pub async fn update_limit(&self, partner_id: PartnerId, new_limit: Money) -> Result<Partner> {
        ensure_non_negative(new_limit)?;
        let mut lock = self.lock(partner_id).await?;
        let mut partner = lock.partner().clone();

        let used = partner.used_credit();
        partner.credit_limit = new_limit;
        partner.available_credit = (new_limit - used).floor_zero();

        let saved = lock.save(partner).await?;
        self.cache.invalidate(partner_id).await;

        tracing::info!(
            partner_id = %partner_id,
            credit_limit = %saved.credit_limit,
            available = %saved.available_credit,
            "credit limit updated"
        );
        Ok(saved)
    }

    async fn lock(&self, partner_id: PartnerId) -> Result<Box<dyn PartnerLock>> {
        self.partners
            .find_by_id_exclusive(partner_id, self.lock_timeout)
            .await?
            .ok_or(DomainError::PartnerNotFound(partner_id))
    }
}

fn ensure_non_negative(amount: Money) -> Result<()> {
    if amount.is_negative() {
        return Err(DomainError::InvalidAmount(amount));
    }
    Ok(())
}
