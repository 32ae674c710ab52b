use common::{Order, OrderStatus};

use crate::{DomainError, Result};

/// Whether `from -> to` is a legal status change.
pub fn is_valid_transition(from: OrderStatus, to: OrderStatus) -> bool {
    from.can_transition_to(to)
}

/// Moves `order` to `next`, returning the status it left.
///
/// Only the status field changes. Ledger side effects are the caller's job;
/// see [`LedgerEffect::for_transition`].
pub fn transition_to(order: &mut Order, next: OrderStatus) -> Result<OrderStatus> {
    let from = order.status;
    if !is_valid_transition(from, next) {
        return Err(DomainError::InvalidOrderStatus { from, to: next });
    }
    order.status = next;
    Ok(from)
}

/// Credit movement implied by a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerEffect {
    /// Reserve the order total (approval).
    Debit,
    /// Give the order total back (cancelling an approved order).
    Refund,
}

impl LedgerEffect {
    pub fn for_transition(from: OrderStatus, to: OrderStatus) -> Option<LedgerEffect> {
        match (from, to) {
            (OrderStatus::Pending, OrderStatus::Approved) => Some(LedgerEffect::Debit),
            (OrderStatus::Approved, OrderStatus::Canceled) => Some(LedgerEffect::Refund),
            _ => None,
        }
    }

    /// The effect that undoes this one.
    pub fn reverse(self) -> LedgerEffect {
        match self {
            LedgerEffect::Debit => LedgerEffect::Refund,
            LedgerEffect::Refund => LedgerEffect::Debit,
        }
    }
}
