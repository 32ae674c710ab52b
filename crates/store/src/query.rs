use chrono::{DateTime, Utc};
use common::{Order, OrderId, OrderStatus, PartnerId};
use serde::{Deserialize, Serialize};

/// Largest page size a query may request.
pub const MAX_PAGE_SIZE: usize = 100;

/// Default page size.
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Largest zero-based page index. Keeps `offset()` within `i64` at any page size.
pub const MAX_PAGE: usize = (i64::MAX as u64 / MAX_PAGE_SIZE as u64) as usize;

/// Column an order search is sorted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OrderSort {
    #[default]
    CreatedAt,
    UpdatedAt,
    TotalValue,
    Status,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

/// Builder for order searches.
///
/// Every filter is optional; unset filters match all orders.
#[derive(Debug, Clone)]
pub struct OrderQuery {
    pub order_id: Option<OrderId>,
    pub partner_id: Option<PartnerId>,
    pub status: Option<OrderStatus>,

    /// Orders created at or after this instant.
    pub created_from: Option<DateTime<Utc>>,

    /// Orders created at or before this instant.
    pub created_to: Option<DateTime<Utc>>,

    /// Zero-based page index.
    pub page: usize,
    pub size: usize,
    pub sort_by: OrderSort,
    pub direction: SortDirection,
}

impl Default for OrderQuery {
    fn default() -> Self {
        Self {
            order_id: None,
            partner_id: None,
            status: None,
            created_from: None,
            created_to: None,
            page: 0,
            size: DEFAULT_PAGE_SIZE,
            sort_by: OrderSort::default(),
            direction: SortDirection::default(),
        }
    }
}

impl OrderQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_partner(partner_id: PartnerId) -> Self {
        Self::new().partner_id(partner_id)
    }

    pub fn order_id(mut self, id: OrderId) -> Self {
        self.order_id = Some(id);
        self
    }

    pub fn partner_id(mut self, id: PartnerId) -> Self {
        self.partner_id = Some(id);
        self
    }

    pub fn status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn created_from(mut self, from: DateTime<Utc>) -> Self {
        self.created_from = Some(from);
        self
    }

    pub fn created_to(mut self, to: DateTime<Utc>) -> Self {
        self.created_to = Some(to);
        self
    }

    /// Sets the zero-based page index, clamped to `MAX_PAGE`.
    pub fn page(mut self, page: usize) -> Self {
        self.page = page.min(MAX_PAGE);
        self
    }

    /// Sets the page size, clamped to `1..=MAX_PAGE_SIZE`.
    pub fn size(mut self, size: usize) -> Self {
        self.size = size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    pub fn sort(mut self, sort_by: OrderSort, direction: SortDirection) -> Self {
        self.sort_by = sort_by;
        self.direction = direction;
        self
    }

    /// Number of rows to skip for the requested page.
    pub fn offset(&self) -> usize {
        self.page.saturating_mul(self.size)
    }

    /// Returns true if `order` passes every filter.
    pub fn matches(&self, order: &Order) -> bool {
        if let Some(id) = self.order_id
            && order.id != id
        {
            return false;
        }
        if let Some(partner_id) = self.partner_id
            && order.partner_id != partner_id
        {
            return false;
        }
        if let Some(status) = self.status
            && order.status != status
        {
            return false;
        }
        if let Some(from) = self.created_from
            && order.created_at < from
        {
            return false;
        }
        if let Some(to) = self.created_to
            && order.created_at > to
        {
            return false;
        }
        true
    }
}

/// One page of search results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_items: u64,
    pub total_pages: u64,
    /// One-based index of this page.
    pub current_page: u64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total_items: u64, query: &OrderQuery) -> Self {
        let size = query.size.max(1) as u64;
        Self {
            items,
            total_items,
            total_pages: total_items.div_ceil(size),
            current_page: (query.page as u64).saturating_add(1),
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total_items: self.total_items,
            total_pages: self.total_pages,
            current_page: self.current_page,
        }
    }
}
