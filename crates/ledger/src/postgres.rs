use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use common::{AttemptId, Currency, IdempotencyKey, Money, OwnerId};

use crate::attempt::{
    Attempt, AttemptStatus, AttemptUpdate, CLAIM_STALENESS_SECS, ClaimOutcome, FlowType, NewAttempt,
};
use crate::fingerprint::Fingerprint;
use crate::store::AttemptLedger;
use crate::{LedgerError, Result};

const ATTEMPT_COLUMNS: &str = "id, idempotency_key, flow_type, request_fingerprint, status, \
     amount_cents, currency, owner_id, external_resource_id, external_resource_url, \
     metadata, last_error, created_at, updated_at";

/// PostgreSQL-backed attempt ledger.
///
/// The claim transition is a single `UPDATE ... WHERE status IN (...)`
/// with a `RETURNING` clause; the rows-affected semantics of that statement
/// are what make the claim a durable compare-and-swap across server
/// instances.
#[derive(Clone)]
pub struct PostgresAttemptLedger {
    pool: PgPool,
}

impl PostgresAttemptLedger {
    /// Creates a new PostgreSQL attempt ledger.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_attempt(row: PgRow) -> Result<Attempt> {
        let metadata_json: serde_json::Value = row.try_get("metadata")?;
        let metadata: HashMap<String, serde_json::Value> = serde_json::from_value(metadata_json)?;

        let status_str: String = row.try_get("status")?;
        let status = AttemptStatus::parse(&status_str)
            .ok_or_else(|| invalid_column("status", &status_str))?;

        let flow_str: String = row.try_get("flow_type")?;
        let flow_type =
            FlowType::parse(&flow_str).ok_or_else(|| invalid_column("flow_type", &flow_str))?;

        Ok(Attempt {
            id: AttemptId::from_uuid(row.try_get::<Uuid, _>("id")?),
            idempotency_key: IdempotencyKey::new(row.try_get::<String, _>("idempotency_key")?),
            flow_type,
            request_fingerprint: Fingerprint::from_hex(
                row.try_get::<String, _>("request_fingerprint")?,
            ),
            status,
            amount: Money::from_cents(row.try_get("amount_cents")?),
            currency: Currency::new(row.try_get::<String, _>("currency")?),
            owner_id: OwnerId::from_uuid(row.try_get::<Uuid, _>("owner_id")?),
            external_resource_id: row.try_get("external_resource_id")?,
            external_resource_url: row.try_get("external_resource_url")?,
            metadata,
            last_error: row.try_get("last_error")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

fn invalid_column(column: &str, value: &str) -> LedgerError {
    LedgerError::Serialization(serde_json::Error::io(std::io::Error::other(format!(
        "invalid {column} value in attempts row: {value}"
    ))))
}

#[async_trait]
impl AttemptLedger for PostgresAttemptLedger {
    async fn ensure_attempt(&self, new: NewAttempt) -> Result<Attempt> {
        let attempt = new.into_attempt();
        let metadata_json = serde_json::to_value(&attempt.metadata)?;

        // ON CONFLICT DO NOTHING makes the get-or-create race-safe: exactly
        // one of N concurrent inserts for a key wins, the rest fall through
        // to the re-select below.
        let inserted = sqlx::query(&format!(
            r#"
            INSERT INTO attempts
                (id, idempotency_key, flow_type, request_fingerprint, status,
                 amount_cents, currency, owner_id, metadata, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (idempotency_key) DO NOTHING
            RETURNING {ATTEMPT_COLUMNS}
            "#
        ))
        .bind(attempt.id.as_uuid())
        .bind(attempt.idempotency_key.as_str())
        .bind(attempt.flow_type.as_str())
        .bind(attempt.request_fingerprint.as_str())
        .bind(attempt.status.as_str())
        .bind(attempt.amount.cents())
        .bind(attempt.currency.as_str())
        .bind(attempt.owner_id.as_uuid())
        .bind(metadata_json)
        .bind(attempt.created_at)
        .bind(attempt.updated_at)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = inserted {
            return Self::row_to_attempt(row);
        }

        let row = sqlx::query(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM attempts WHERE idempotency_key = $1"
        ))
        .bind(attempt.idempotency_key.as_str())
        .fetch_one(&self.pool)
        .await?;

        let existing = Self::row_to_attempt(row)?;
        if existing.request_fingerprint != attempt.request_fingerprint {
            return Err(LedgerError::FingerprintConflict {
                idempotency_key: existing.idempotency_key.clone(),
                attempt_id: existing.id,
            });
        }
        Ok(existing)
    }

    #[tracing::instrument(skip(self))]
    async fn claim_attempt(&self, id: AttemptId) -> Result<ClaimOutcome> {
        // A `processing` row whose claim holder has gone silent past the
        // staleness ceiling is treated as abandoned and reclaimable.
        let claimed = sqlx::query(&format!(
            r#"
            UPDATE attempts
            SET status = 'processing', updated_at = now()
            WHERE id = $1
              AND (status IN ('pending', 'failed')
                   OR (status = 'processing'
                       AND updated_at < now() - make_interval(secs => $2)))
            RETURNING {ATTEMPT_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(CLAIM_STALENESS_SECS as f64)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = claimed {
            metrics::counter!("attempt_claims_won_total").increment(1);
            tracing::debug!(attempt_id = %id, "claim acquired");
            return Ok(ClaimOutcome {
                attempt: Self::row_to_attempt(row)?,
                claimed: true,
            });
        }

        // Another execution holds the claim, or the attempt is completed.
        let row = sqlx::query(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM attempts WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(LedgerError::AttemptNotFound(id))?;

        Ok(ClaimOutcome {
            attempt: Self::row_to_attempt(row)?,
            claimed: false,
        })
    }

    async fn update_attempt(&self, id: AttemptId, update: AttemptUpdate) -> Result<Attempt> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM attempts WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(LedgerError::AttemptNotFound(id))?;

        let current = Self::row_to_attempt(row)?;
        if let Some(ref url) = update.external_resource_url {
            if matches!(current.external_resource_url, Some(ref existing) if existing != url) {
                return Err(LedgerError::ResourceAlreadySet(id));
            }
        }

        let row = sqlx::query(&format!(
            r#"
            UPDATE attempts
            SET status = COALESCE($2, status),
                external_resource_id = COALESCE($3, external_resource_id),
                external_resource_url = COALESCE($4, external_resource_url),
                last_error = COALESCE($5, last_error),
                updated_at = now()
            WHERE id = $1
            RETURNING {ATTEMPT_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(update.status.map(|s| s.as_str()))
        .bind(update.external_resource_id)
        .bind(update.external_resource_url)
        .bind(update.last_error)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Self::row_to_attempt(row)
    }

    async fn get_attempt(&self, id: AttemptId) -> Result<Option<Attempt>> {
        let row = sqlx::query(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM attempts WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_attempt).transpose()
    }

    async fn find_by_key(&self, key: &IdempotencyKey) -> Result<Option<Attempt>> {
        let row = sqlx::query(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM attempts WHERE idempotency_key = $1"
        ))
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_attempt).transpose()
    }
}
