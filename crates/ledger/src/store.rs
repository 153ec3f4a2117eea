use std::time::Duration;

use async_trait::async_trait;

use common::{AttemptId, IdempotencyKey};

use crate::attempt::{Attempt, AttemptStatus, AttemptUpdate, ClaimOutcome, NewAttempt};
use crate::Result;

/// Core trait for attempt ledger implementations.
///
/// The ledger is the only shared mutable state between concurrent
/// executions of the same logical request. All implementations must be
/// thread-safe (Send + Sync) and must give `claim_attempt` genuine
/// compare-and-swap semantics against durable storage.
#[async_trait]
pub trait AttemptLedger: Send + Sync {
    /// Atomic get-or-create for the attempt row keyed by `idempotency_key`.
    ///
    /// If a row already exists for the key and its stored fingerprint
    /// differs from the supplied one, fails with
    /// [`LedgerError::FingerprintConflict`](crate::LedgerError::FingerprintConflict):
    /// the same key must never describe two different logical requests.
    /// Otherwise returns the existing or newly created row.
    async fn ensure_attempt(&self, new: NewAttempt) -> Result<Attempt>;

    /// The single atomic conditional update all concurrent executions
    /// contend on: set status to `Processing` where the row is currently
    /// `Pending`, `Failed`, or `Processing` with a claim older than the
    /// staleness ceiling (an abandoned claim).
    ///
    /// Returns the updated row with `claimed = true` if the transition
    /// matched, or the current row with `claimed = false` if another
    /// execution already holds the claim or the attempt is `Completed`.
    async fn claim_attempt(&self, id: AttemptId) -> Result<ClaimOutcome>;

    /// Terminal write performed only by the current claim holder.
    ///
    /// Once the external-resource fields are set they are never
    /// overwritten with a different value.
    async fn update_attempt(&self, id: AttemptId, update: AttemptUpdate) -> Result<Attempt>;

    /// Loads an attempt by ID. Returns None if it doesn't exist.
    async fn get_attempt(&self, id: AttemptId) -> Result<Option<Attempt>>;

    /// Loads an attempt by idempotency key. Returns None if no attempt
    /// has been recorded for the key.
    async fn find_by_key(&self, key: &IdempotencyKey) -> Result<Option<Attempt>>;
}

/// Extension trait providing convenience methods for ledgers.
#[async_trait]
pub trait AttemptLedgerExt: AttemptLedger {
    /// Bounded poll loop used only by an execution that lost the claim
    /// race, to avoid surfacing an error for a request that is moments
    /// from succeeding.
    ///
    /// Polls with capped backoff until the attempt holds its external
    /// resource or `budget` elapses. Returns `None` on timeout and also
    /// gives up early if the claim holder recorded a failure, since the
    /// caller should retry rather than keep waiting.
    async fn wait_for_resource(&self, id: AttemptId, budget: Duration) -> Result<Option<Attempt>> {
        let deadline = tokio::time::Instant::now() + budget;
        let mut delay = Duration::from_millis(100);

        loop {
            if let Some(attempt) = self.get_attempt(id).await? {
                if attempt.has_resource() {
                    return Ok(Some(attempt));
                }
                if attempt.status == AttemptStatus::Failed {
                    return Ok(None);
                }
            }

            if tokio::time::Instant::now() + delay > deadline {
                return Ok(None);
            }
            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(Duration::from_millis(500));
        }
    }
}

// Blanket implementation for all AttemptLedger implementations
impl<T: AttemptLedger + ?Sized> AttemptLedgerExt for T {}
