//! Order lifecycle: status transitions and the order service.

mod service;
mod transition;

pub use service::{MAX_ITEM_QUANTITY, OrderService};
pub use transition::{LedgerEffect, is_valid_transition, transition_to};
