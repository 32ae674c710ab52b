//! Idempotency keys for mutating requests.
//!
//! An [`IdempotencyStore`] keeps one record per key: either an in-flight claim
//! or the completed response. [`IdempotencyGuard`] runs an operation at most
//! once per key and replays the stored response to every later caller.

pub mod error;
pub mod guard;
pub mod memory;
pub mod postgres;
pub mod record;
pub mod store;

pub use error::{IdempotencyError, Result};
pub use guard::{GuardConfig, GuardOutcome, IdempotencyGuard};
pub use memory::InMemoryIdempotencyStore;
pub use postgres::PostgresIdempotencyStore;
pub use record::{IdempotencyRecord, StoredResponse};
pub use store::IdempotencyStore;
