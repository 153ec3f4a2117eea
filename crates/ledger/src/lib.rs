//! Durable attempt ledger implementing the idempotent claim protocol.
//!
//! Every "create checkout" request is recorded as an [`Attempt`] row keyed by
//! its idempotency key. All coordination between concurrent executions goes
//! through one atomic conditional update ([`AttemptLedger::claim_attempt`]),
//! which behaves as a compare-and-swap against durable storage rather than an
//! in-process lock, so the protocol holds across independent server instances.

pub mod attempt;
pub mod error;
pub mod fingerprint;
pub mod memory;
pub mod postgres;
pub mod store;

pub use attempt::{
    Attempt, AttemptStatus, AttemptUpdate, CLAIM_STALENESS_SECS, ClaimOutcome, FlowType, NewAttempt,
};
pub use common::{AttemptId, Currency, IdempotencyKey, Money, OwnerId};
pub use error::{LedgerError, Result};
pub use fingerprint::{Fingerprint, FingerprintInput};
pub use memory::InMemoryAttemptLedger;
pub use postgres::PostgresAttemptLedger;
pub use store::{AttemptLedger, AttemptLedgerExt};
