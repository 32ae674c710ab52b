//! Domain layer for partner purchase orders.
//!
//! This crate provides:
//! - `CreditLedger`, which keeps a partner's available credit within its limit
//!   under concurrent debits and refunds
//! - `OrderService`, which creates orders and drives their status transitions
//!   along with the ledger effects each transition implies
//! - the `NotificationSender` seam for status-change notifications

pub mod credit;
pub mod error;
pub mod notification;
pub mod order;

pub use credit::{CreditCache, CreditLedger, CreditSnapshot};
pub use error::{DomainError, Result};
pub use notification::{
    InMemoryNotificationSender, LoggingNotificationSender, Notification, NotificationError,
    NotificationSender,
};
pub use order::{LedgerEffect, MAX_ITEM_QUANTITY, OrderService, is_valid_transition, transition_to};
