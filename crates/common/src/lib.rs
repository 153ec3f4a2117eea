//! Shared types for the checkout platform.

pub mod types;

pub use types::{AttemptId, Currency, IdempotencyKey, Money, OwnerId};
