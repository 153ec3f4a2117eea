use common::{AttemptId, IdempotencyKey};
use thiserror::Error;

/// Errors that can occur when interacting with the attempt ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// An idempotency key was reused with a different request fingerprint.
    /// The same key must never describe two different logical requests.
    #[error("idempotency key {idempotency_key} reused with a different request fingerprint")]
    FingerprintConflict {
        idempotency_key: IdempotencyKey,
        attempt_id: AttemptId,
    },

    /// The attempt was not found in the ledger.
    #[error("attempt not found: {0}")]
    AttemptNotFound(AttemptId),

    /// An attempt's external resource fields are write-once; a terminal
    /// update tried to replace them with a different value.
    #[error("attempt {0} already holds an external resource")]
    ResourceAlreadySet(AttemptId),

    /// A database error occurred.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A serialization/deserialization error occurred.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
