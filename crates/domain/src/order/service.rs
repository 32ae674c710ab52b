//! Order service: creation, lookup, search and status changes.

use std::sync::Arc;

use common::{Money, Order, OrderId, OrderItem, OrderStatus, Partner, PartnerId};
use store::{OrderQuery, OrderStore, Page, PartnerStore};

use super::{LedgerEffect, transition_to};
use crate::credit::{CreditLedger, CreditSnapshot};
use crate::notification::{LoggingNotificationSender, NotificationSender};
use crate::{DomainError, Result};

/// Largest quantity accepted for a single order item.
pub const MAX_ITEM_QUANTITY: u32 = 9999;

/// Orchestrates orders against the credit ledger.
///
/// Orders start PENDING without touching credit. Approval debits the order
/// total and cancelling an approved order refunds it; every other
/// transition only changes the status.
pub struct OrderService<P, O, N = LoggingNotificationSender> {
    ledger: CreditLedger<P>,
    orders: O,
    notifier: Arc<N>,
}

impl<P: PartnerStore, O: OrderStore> OrderService<P, O> {
    pub fn new(ledger: CreditLedger<P>, orders: O) -> Self {
        Self {
            ledger,
            orders,
            notifier: Arc::new(LoggingNotificationSender),
        }
    }
}

impl<P, O, N> OrderService<P, O, N>
where
    P: PartnerStore,
    O: OrderStore,
    N: NotificationSender,
{
    /// Replaces the notification sender.
    pub fn with_notifier<M: NotificationSender>(self, notifier: M) -> OrderService<P, O, M> {
        OrderService {
            ledger: self.ledger,
            orders: self.orders,
            notifier: Arc::new(notifier),
        }
    }

    pub fn ledger(&self) -> &CreditLedger<P> {
        &self.ledger
    }

    pub fn orders(&self) -> &O {
        &self.orders
    }

    /// Creates a PENDING order after an advisory credit check.
    ///
    /// No credit is reserved until the order is approved.
    #[tracing::instrument(skip(self, items), fields(item_count = items.len()))]
    pub async fn create_order(&self, partner_id: PartnerId, items: Vec<OrderItem>) -> Result<Order> {
        validate_items(&items)?;
        let order = Order::new(partner_id, items).map_err(|e| {
            DomainError::InvalidOrder(format!("order total is out of range: {e}"))
        })?;

        let partner = self
            .ledger
            .partners()
            .find_by_id(partner_id)
            .await?
            .ok_or(DomainError::PartnerNotFound(partner_id))?;

        self.ledger
            .check_available(partner.id, order.total_value())
            .await?;

        let saved = self.orders.save(order).await?;

        metrics::counter!("orders_created_total").increment(1);
        tracing::info!(
            order_id = %saved.id,
            partner_id = %partner_id,
            total = %saved.total_value(),
            "order created"
        );
        Ok(saved)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, order_id: OrderId) -> Result<Order> {
        self.orders
            .find_by_id(order_id)
            .await?
            .ok_or(DomainError::OrderNotFound(order_id))
    }

    #[tracing::instrument(skip(self))]
    pub async fn search_orders(&self, query: OrderQuery) -> Result<Page<Order>> {
        Ok(self.orders.search(query).await?)
    }

    /// Moves an order to `new_status`, applying the implied credit movement.
    ///
    /// If the order cannot be saved after credit moved, the movement is
    /// reversed before the error is returned.
    #[tracing::instrument(skip(self))]
    pub async fn update_status(&self, order_id: OrderId, new_status: OrderStatus) -> Result<Order> {
        let mut order = self.get_order(order_id).await?;
        let old_status = transition_to(&mut order, new_status)?;

        let partner_id = order.partner_id;
        let amount = order.total_value();
        let effect = LedgerEffect::for_transition(old_status, new_status);

        if let Some(effect) = effect {
            self.apply(effect, partner_id, amount).await?;
        }

        let saved = match self.orders.save(order).await {
            Ok(saved) => saved,
            Err(err) => {
                if let Some(effect) = effect {
                    self.compensate(effect, order_id, partner_id, amount).await;
                }
                return Err(err.into());
            }
        };

        metrics::counter!(
            "order_status_transitions_total",
            "from" => old_status.as_str(),
            "to" => new_status.as_str()
        )
        .increment(1);
        tracing::info!(
            order_id = %order_id,
            from = %old_status,
            to = %new_status,
            "order status updated"
        );

        self.notify(order_id, old_status, new_status);
        Ok(saved)
    }

    /// Same as `update_status(order_id, CANCELED)`.
    pub async fn cancel_order(&self, order_id: OrderId) -> Result<Order> {
        self.update_status(order_id, OrderStatus::Canceled).await
    }

    pub async fn available_credit(&self, partner_id: PartnerId) -> Result<CreditSnapshot> {
        self.ledger.available_credit(partner_id).await
    }

    pub async fn update_credit_limit(&self, partner_id: PartnerId, limit: Money) -> Result<Partner> {
        self.ledger.update_limit(partner_id, limit).await
    }

    async fn apply(&self, effect: LedgerEffect, partner_id: PartnerId, amount: Money) -> Result<Partner> {
        match effect {
            LedgerEffect::Debit => self.ledger.debit(partner_id, amount).await,
            LedgerEffect::Refund => self.ledger.credit(partner_id, amount).await,
        }
    }

    async fn compensate(
        &self,
        effect: LedgerEffect,
        order_id: OrderId,
        partner_id: PartnerId,
        amount: Money,
    ) {
        let reverse = effect.reverse();
        match self.apply(reverse, partner_id, amount).await {
            Ok(_) => {
                tracing::warn!(
                    order_id = %order_id,
                    partner_id = %partner_id,
                    ?reverse,
                    amount = %amount,
                    "order save failed; credit movement reversed"
                );
            }
            Err(e) => {
                metrics::counter!("credit_compensation_failures_total").increment(1);
                tracing::error!(
                    order_id = %order_id,
                    partner_id = %partner_id,
                    ?reverse,
                    amount = %amount,
                    error = %e,
                    "failed to reverse credit movement"
                );
            }
        }
    }

    fn notify(&self, order_id: OrderId, old_status: OrderStatus, new_status: OrderStatus) {
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            if let Err(e) = notifier.notify(order_id, old_status, new_status).await {
                tracing::warn!(order_id = %order_id, error = %e, "status notification failed");
            }
        });
    }
}

fn validate_items(items: &[OrderItem]) -> Result<()> {
    if items.is_empty() {
        return Err(DomainError::InvalidOrder(
            "order must contain at least one item".to_string(),
        ));
    }

    for item in items {
        if !(1..=MAX_ITEM_QUANTITY).contains(&item.quantity) {
            return Err(DomainError::InvalidOrder(format!(
                "item {} quantity must be between 1 and {MAX_ITEM_QUANTITY}, got {}",
                item.code, item.quantity
            )));
        }
        if !item.price.is_positive() {
            return Err(DomainError::InvalidOrder(format!(
                "item {} price must be positive, got {}",
                item.code, item.price
            )));
        }
    }
    Ok(())
}
