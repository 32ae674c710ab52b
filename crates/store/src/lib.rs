//! Persistence contracts for partners and orders.
//!
//! Partners are mutated under an exclusive per-partner lock obtained with
//! [`PartnerStore::find_by_id_exclusive`]. Orders and partners are both saved
//! with an optimistic version check.

pub mod error;
pub mod memory;
pub mod order;
pub mod partner;
pub mod postgres;
pub mod query;

pub use error::{Result, StoreError};
pub use memory::{InMemoryOrderStore, InMemoryPartnerStore};
pub use order::OrderStore;
pub use partner::{PartnerLock, PartnerStore};
pub use postgres::PostgresStore;
pub use query::{MAX_PAGE, OrderQuery, OrderSort, Page, SortDirection};
