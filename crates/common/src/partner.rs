use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Money, PartnerId, Version};

/// A partner and the state of its revolving credit line.
///
/// `available_credit` stays within `0..=credit_limit`. Only the credit ledger
/// mutates the two credit fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partner {
    pub id: PartnerId,
    pub code: String,
    pub name: String,
    pub email: String,
    pub credit_limit: Money,
    pub available_credit: Money,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: Version,
}

impl Partner {
    /// Creates an unsaved partner whose whole limit is available.
    pub fn new(
        code: impl Into<String>,
        name: impl Into<String>,
        email: impl Into<String>,
        credit_limit: Money,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: PartnerId::new(),
            code: code.into(),
            name: name.into(),
            email: email.into(),
            credit_limit,
            available_credit: credit_limit,
            active: true,
            created_at: now,
            updated_at: now,
            version: Version::initial(),
        }
    }

    /// Overrides the identifier, for seeding well-known partners.
    pub fn with_id(mut self, id: PartnerId) -> Self {
        self.id = id;
        self
    }

    /// Overrides the available credit, for partners onboarded with credit in use.
    pub fn with_available_credit(mut self, available: Money) -> Self {
        self.available_credit = available;
        self
    }

    pub fn has_available_credit(&self, amount: Money) -> bool {
        self.available_credit >= amount
    }

    /// Credit currently reserved by approved orders.
    pub fn used_credit(&self) -> Money {
        self.credit_limit - self.available_credit
    }
}
