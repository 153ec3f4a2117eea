use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use common::{AttemptId, IdempotencyKey};

use crate::attempt::{Attempt, AttemptStatus, AttemptUpdate, ClaimOutcome, NewAttempt};
use crate::store::AttemptLedger;
use crate::{LedgerError, Result};

/// In-memory attempt ledger for tests and local runs.
///
/// Mirrors the PostgreSQL implementation's semantics exactly: get-or-create
/// under a single write lock, and a claim transition that only matches rows
/// in a claimable status.
#[derive(Clone, Default)]
pub struct InMemoryAttemptLedger {
    attempts: Arc<RwLock<HashMap<AttemptId, Attempt>>>,
}

impl InMemoryAttemptLedger {
    /// Creates a new empty in-memory ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of attempt rows.
    pub async fn attempt_count(&self) -> usize {
        self.attempts.read().await.len()
    }
}

#[async_trait]
impl AttemptLedger for InMemoryAttemptLedger {
    async fn ensure_attempt(&self, new: NewAttempt) -> Result<Attempt> {
        let mut attempts = self.attempts.write().await;

        if let Some(existing) = attempts
            .values()
            .find(|a| a.idempotency_key == new.idempotency_key)
        {
            if existing.request_fingerprint != new.request_fingerprint {
                return Err(LedgerError::FingerprintConflict {
                    idempotency_key: existing.idempotency_key.clone(),
                    attempt_id: existing.id,
                });
            }
            return Ok(existing.clone());
        }

        let attempt = new.into_attempt();
        attempts.insert(attempt.id, attempt.clone());
        Ok(attempt)
    }

    async fn claim_attempt(&self, id: AttemptId) -> Result<ClaimOutcome> {
        let mut attempts = self.attempts.write().await;
        let attempt = attempts
            .get_mut(&id)
            .ok_or(LedgerError::AttemptNotFound(id))?;

        if attempt.status.is_claimable() || attempt.claim_is_stale(Utc::now()) {
            attempt.status = AttemptStatus::Processing;
            attempt.updated_at = Utc::now();
            Ok(ClaimOutcome {
                attempt: attempt.clone(),
                claimed: true,
            })
        } else {
            Ok(ClaimOutcome {
                attempt: attempt.clone(),
                claimed: false,
            })
        }
    }

    async fn update_attempt(&self, id: AttemptId, update: AttemptUpdate) -> Result<Attempt> {
        let mut attempts = self.attempts.write().await;
        let attempt = attempts
            .get_mut(&id)
            .ok_or(LedgerError::AttemptNotFound(id))?;

        if let Some(ref url) = update.external_resource_url {
            if matches!(attempt.external_resource_url, Some(ref existing) if existing != url) {
                return Err(LedgerError::ResourceAlreadySet(id));
            }
        }

        if let Some(status) = update.status {
            attempt.status = status;
        }
        if update.external_resource_id.is_some() {
            attempt.external_resource_id = update.external_resource_id;
        }
        if update.external_resource_url.is_some() {
            attempt.external_resource_url = update.external_resource_url;
        }
        if update.last_error.is_some() {
            attempt.last_error = update.last_error;
        }
        attempt.updated_at = Utc::now();

        Ok(attempt.clone())
    }

    async fn get_attempt(&self, id: AttemptId) -> Result<Option<Attempt>> {
        let attempts = self.attempts.read().await;
        Ok(attempts.get(&id).cloned())
    }

    async fn find_by_key(&self, key: &IdempotencyKey) -> Result<Option<Attempt>> {
        let attempts = self.attempts.read().await;
        Ok(attempts
            .values()
            .find(|a| &a.idempotency_key == key)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use super::*;
    use crate::attempt::FlowType;
    use crate::fingerprint::{Fingerprint, FingerprintInput};
    use crate::store::AttemptLedgerExt;
    use common::{Currency, Money, OwnerId};

    fn new_attempt(key: &str, amount: i64) -> NewAttempt {
        let owner_id = OwnerId::from_uuid(uuid::Uuid::nil());
        let fingerprint = Fingerprint::compute(&FingerprintInput {
            flow_type: FlowType::PaidCheckout,
            amount: Money::from_cents(amount),
            currency: Currency::usd(),
            owner_id,
            organization_name: "Acme".to_string(),
        });
        NewAttempt {
            idempotency_key: IdempotencyKey::new(key),
            flow_type: FlowType::PaidCheckout,
            amount: Money::from_cents(amount),
            currency: Currency::usd(),
            owner_id,
            request_fingerprint: fingerprint,
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn ensure_creates_then_returns_existing() {
        let ledger = InMemoryAttemptLedger::new();

        let first = ledger.ensure_attempt(new_attempt("abc123", 1500)).await.unwrap();
        let second = ledger.ensure_attempt(new_attempt("abc123", 1500)).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(ledger.attempt_count().await, 1);
    }

    #[tokio::test]
    async fn ensure_rejects_fingerprint_mismatch() {
        let ledger = InMemoryAttemptLedger::new();

        let first = ledger.ensure_attempt(new_attempt("abc123", 1500)).await.unwrap();
        let result = ledger.ensure_attempt(new_attempt("abc123", 2000)).await;

        match result {
            Err(LedgerError::FingerprintConflict {
                idempotency_key,
                attempt_id,
            }) => {
                assert_eq!(idempotency_key.as_str(), "abc123");
                assert_eq!(attempt_id, first.id);
            }
            other => panic!("expected fingerprint conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn claim_succeeds_once_then_loses() {
        let ledger = InMemoryAttemptLedger::new();
        let attempt = ledger.ensure_attempt(new_attempt("k", 1500)).await.unwrap();

        let first = ledger.claim_attempt(attempt.id).await.unwrap();
        assert!(first.claimed);
        assert_eq!(first.attempt.status, AttemptStatus::Processing);

        let second = ledger.claim_attempt(attempt.id).await.unwrap();
        assert!(!second.claimed);
        assert_eq!(second.attempt.status, AttemptStatus::Processing);
    }

    #[tokio::test]
    async fn failed_attempt_is_reclaimable() {
        let ledger = InMemoryAttemptLedger::new();
        let attempt = ledger.ensure_attempt(new_attempt("k", 1500)).await.unwrap();

        ledger.claim_attempt(attempt.id).await.unwrap();
        ledger
            .update_attempt(attempt.id, AttemptUpdate::failed("provider unavailable"))
            .await
            .unwrap();

        let reclaim = ledger.claim_attempt(attempt.id).await.unwrap();
        assert!(reclaim.claimed);
    }

    #[tokio::test]
    async fn stale_processing_claim_is_reclaimable() {
        let ledger = InMemoryAttemptLedger::new();
        let attempt = ledger.ensure_attempt(new_attempt("k", 1500)).await.unwrap();
        ledger.claim_attempt(attempt.id).await.unwrap();

        // Backdate the claim past the staleness ceiling, as if the holder
        // crashed without a terminal update.
        {
            let mut attempts = ledger.attempts.write().await;
            let row = attempts.get_mut(&attempt.id).unwrap();
            row.updated_at -=
                chrono::Duration::seconds(crate::attempt::CLAIM_STALENESS_SECS + 60);
        }

        let reclaim = ledger.claim_attempt(attempt.id).await.unwrap();
        assert!(reclaim.claimed);
        assert_eq!(reclaim.attempt.status, AttemptStatus::Processing);
    }

    #[tokio::test]
    async fn completed_attempt_is_not_claimable() {
        let ledger = InMemoryAttemptLedger::new();
        let attempt = ledger.ensure_attempt(new_attempt("k", 1500)).await.unwrap();

        ledger.claim_attempt(attempt.id).await.unwrap();
        ledger
            .update_attempt(
                attempt.id,
                AttemptUpdate::completed("cs_123", "https://pay.example/abc"),
            )
            .await
            .unwrap();

        let outcome = ledger.claim_attempt(attempt.id).await.unwrap();
        assert!(!outcome.claimed);
        assert!(outcome.attempt.has_resource());
    }

    #[tokio::test]
    async fn resource_url_is_write_once() {
        let ledger = InMemoryAttemptLedger::new();
        let attempt = ledger.ensure_attempt(new_attempt("k", 1500)).await.unwrap();

        ledger.claim_attempt(attempt.id).await.unwrap();
        ledger
            .update_attempt(
                attempt.id,
                AttemptUpdate::completed("cs_123", "https://pay.example/abc"),
            )
            .await
            .unwrap();

        let result = ledger
            .update_attempt(
                attempt.id,
                AttemptUpdate::completed("cs_456", "https://pay.example/other"),
            )
            .await;
        assert!(matches!(result, Err(LedgerError::ResourceAlreadySet(_))));

        // Re-writing the same value is a no-op, not a violation.
        let same = ledger
            .update_attempt(
                attempt.id,
                AttemptUpdate::completed("cs_123", "https://pay.example/abc"),
            )
            .await;
        assert!(same.is_ok());
    }

    #[tokio::test]
    async fn wait_for_resource_resolves_when_completed() {
        let ledger = InMemoryAttemptLedger::new();
        let attempt = ledger.ensure_attempt(new_attempt("k", 1500)).await.unwrap();
        ledger.claim_attempt(attempt.id).await.unwrap();

        let waiter = {
            let ledger = ledger.clone();
            let id = attempt.id;
            tokio::spawn(async move { ledger.wait_for_resource(id, Duration::from_secs(3)).await })
        };

        tokio::time::sleep(Duration::from_millis(150)).await;
        ledger
            .update_attempt(
                attempt.id,
                AttemptUpdate::completed("cs_123", "https://pay.example/abc"),
            )
            .await
            .unwrap();

        let resolved = waiter.await.unwrap().unwrap();
        assert!(resolved.is_some());
        assert_eq!(
            resolved.unwrap().external_resource_url.as_deref(),
            Some("https://pay.example/abc")
        );
    }

    #[tokio::test]
    async fn wait_for_resource_times_out_on_stalled_claim() {
        let ledger = InMemoryAttemptLedger::new();
        let attempt = ledger.ensure_attempt(new_attempt("k", 1500)).await.unwrap();
        ledger.claim_attempt(attempt.id).await.unwrap();

        // Claim holder never records a terminal update.
        let result = ledger
            .wait_for_resource(attempt.id, Duration::from_millis(300))
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn wait_for_resource_gives_up_on_failed_attempt() {
        let ledger = InMemoryAttemptLedger::new();
        let attempt = ledger.ensure_attempt(new_attempt("k", 1500)).await.unwrap();
        ledger.claim_attempt(attempt.id).await.unwrap();
        ledger
            .update_attempt(attempt.id, AttemptUpdate::failed("declined"))
            .await
            .unwrap();

        let started = std::time::Instant::now();
        let result = ledger
            .wait_for_resource(attempt.id, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(result.is_none());
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn find_by_key() {
        let ledger = InMemoryAttemptLedger::new();
        ledger.ensure_attempt(new_attempt("abc123", 1500)).await.unwrap();

        let found = ledger
            .find_by_key(&IdempotencyKey::new("abc123"))
            .await
            .unwrap();
        assert!(found.is_some());

        let missing = ledger
            .find_by_key(&IdempotencyKey::new("missing"))
            .await
            .unwrap();
        assert!(missing.is_none());
    }
}
