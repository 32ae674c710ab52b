//! Partner credit: the ledger and its read cache.

mod cache;
mod ledger;

pub use cache::{CreditCache, CreditSnapshot};
pub use ledger::CreditLedger;
