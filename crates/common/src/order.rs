use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AmountOverflow, Money, OrderId, OrderItemId, OrderStatus, PartnerId, Version};

/// One line of an order. Immutable once the order is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub code: String,
    pub name: String,
    pub quantity: u32,
    /// Unit price.
    pub price: Money,
}

impl OrderItem {
    pub fn new(code: impl Into<String>, name: impl Into<String>, quantity: u32, price: Money) -> Self {
        Self {
            id: OrderItemId::new(),
            code: code.into(),
            name: name.into(),
            quantity,
            price,
        }
    }

    /// Returns `price * quantity`, or `AmountOverflow` if it does not fit.
    pub fn checked_subtotal(&self) -> Result<Money, AmountOverflow> {
        self.price.checked_times(self.quantity)
    }

    /// Returns `price * quantity`, saturating. Items of a constructed `Order`
    /// never saturate.
    pub fn subtotal(&self) -> Money {
        self.checked_subtotal().unwrap_or(Money::from_cents(i64::MAX))
    }
}

/// A partner purchase order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub partner_id: PartnerId,
    items: Vec<OrderItem>,
    total_value: Money,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: Version,
}

impl Order {
    /// Creates an unsaved `PENDING` order with its total computed from `items`.
    ///
    /// Fails if any subtotal or the total overflows.
    pub fn new(partner_id: PartnerId, items: Vec<OrderItem>) -> Result<Self, AmountOverflow> {
        let now = Utc::now();
        let total_value = total_of(&items)?;
        Ok(Self {
            id: OrderId::new(),
            partner_id,
            items,
            total_value,
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
            version: Version::initial(),
        })
    }

    /// Rebuilds a persisted order. The total is recomputed from the items.
    pub fn restore(
        id: OrderId,
        partner_id: PartnerId,
        items: Vec<OrderItem>,
        status: OrderStatus,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
        version: Version,
    ) -> Result<Self, AmountOverflow> {
        let total_value = total_of(&items)?;
        Ok(Self {
            id,
            partner_id,
            items,
            total_value,
            status,
            created_at,
            updated_at,
            version,
        })
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn total_value(&self) -> Money {
        self.total_value
    }
}

fn total_of(items: &[OrderItem]) -> Result<Money, AmountOverflow> {
    items
        .iter()
        .try_fold(Money::zero(), |total, item| total.checked_add(item.checked_subtotal()?))
}
