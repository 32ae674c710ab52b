//! Domain error types.

use common::{Money, OrderId, OrderStatus, PartnerId};
use store::StoreError;
use thiserror::Error;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Partner not found: {0}")]
    PartnerNotFound(PartnerId),

    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The requested amount exceeds the partner's available credit.
    #[error(
        "Insufficient balance for partner {partner_code}: requested {requested}, available {available}"
    )]
    InsufficientBalance {
        partner_code: String,
        requested: Money,
        available: Money,
    },

    #[error("Invalid order status transition from {from} to {to}")]
    InvalidOrderStatus { from: OrderStatus, to: OrderStatus },

    /// Negative amounts are never accepted by the ledger.
    #[error("Invalid amount: {0}")]
    InvalidAmount(Money),

    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl DomainError {
    /// Returns true if the caller may retry the same operation.
    pub fn is_retryable(&self) -> bool {
        match self {
            DomainError::Store(e) => e.is_retryable(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, DomainError>;
