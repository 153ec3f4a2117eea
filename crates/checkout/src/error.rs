//! Checkout error taxonomy.

use common::{AttemptId, IdempotencyKey};
use ledger::LedgerError;
use saga::SagaError;
use thiserror::Error;

/// Errors surfaced by the checkout coordinator.
///
/// Transient provider errors are also recorded on the ledger row as
/// `last_error`, so a subsequent retry with the same key has full
/// diagnostic context. It is always safe to resend the same idempotency
/// key; a resource that already exists is returned verbatim rather than
/// recreated.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// Malformed input; surfaced immediately, never auto-retried.
    #[error("invalid checkout request: {0}")]
    Validation(String),

    /// The idempotency key was reused with a mismatched fingerprint.
    /// A caller bug; never auto-retried.
    #[error("idempotency key {idempotency_key} was reused for a different request")]
    Conflict {
        idempotency_key: IdempotencyKey,
        attempt_id: AttemptId,
    },

    /// The external provider call failed. The attempt row returned to a
    /// reclaimable state, so a future retry with the same key can proceed.
    #[error("checkout provider error: {message}")]
    Provider {
        message: String,
        idempotency_key: IdempotencyKey,
        attempt_id: AttemptId,
    },

    /// The bounded wait for an in-flight claim expired. Not evidence of
    /// failure: the winning execution may still complete. The caller
    /// should retry shortly with the same key.
    #[error("checkout for {idempotency_key} is still processing, retry shortly")]
    RaceTimeout {
        idempotency_key: IdempotencyKey,
        attempt_id: AttemptId,
    },

    /// Sales-led provisioning failed (and was compensated).
    #[error(transparent)]
    Saga(#[from] SagaError),

    /// Ledger storage error.
    #[error("ledger error: {0}")]
    Ledger(LedgerError),
}

impl From<LedgerError> for CheckoutError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::FingerprintConflict {
                idempotency_key,
                attempt_id,
            } => CheckoutError::Conflict {
                idempotency_key,
                attempt_id,
            },
            other => CheckoutError::Ledger(other),
        }
    }
}

impl CheckoutError {
    /// The idempotency key to echo back to the caller, when one is tied
    /// to the failure.
    pub fn idempotency_key(&self) -> Option<&IdempotencyKey> {
        match self {
            CheckoutError::Conflict {
                idempotency_key, ..
            }
            | CheckoutError::Provider {
                idempotency_key, ..
            }
            | CheckoutError::RaceTimeout {
                idempotency_key, ..
            } => Some(idempotency_key),
            _ => None,
        }
    }

    /// The attempt ID to echo back to the caller, when one exists.
    pub fn attempt_id(&self) -> Option<AttemptId> {
        match self {
            CheckoutError::Conflict { attempt_id, .. }
            | CheckoutError::Provider { attempt_id, .. }
            | CheckoutError::RaceTimeout { attempt_id, .. } => Some(*attempt_id),
            _ => None,
        }
    }
}
