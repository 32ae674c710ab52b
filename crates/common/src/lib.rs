//! Shared types for the partner order system.
//!
//! Identifiers, fixed-point money, optimistic-concurrency versions, the
//! persisted `Partner` and `Order` records, and the order status table.

mod ids;
mod money;
mod order;
mod partner;
mod status;
mod version;

pub use ids::{IdempotencyKey, OrderId, OrderItemId, PartnerId};
pub use money::{AmountOverflow, Money, ParseMoneyError};
pub use order::{Order, OrderItem};
pub use partner::Partner;
pub use status::{OrderStatus, ParseStatusError};
pub use version::Version;
