//! The claim coordinator: ensure → claim → (execute | wait-and-replay).

use std::collections::HashMap;
use std::time::Duration;

use uuid::Uuid;

use common::{AttemptId, Currency, IdempotencyKey, Money};
use ledger::{
    Attempt, AttemptLedger, AttemptLedgerExt, AttemptUpdate, Fingerprint, FingerprintInput,
    FlowType, NewAttempt,
};
use saga::SalesLedService;

use crate::error::CheckoutError;
use crate::gateway::{CheckoutGateway, CreateSessionRequest};
use crate::request::{CheckoutFlow, CheckoutRequest};

/// Default budget for the losing side's bounded wait.
const DEFAULT_WAIT_BUDGET: Duration = Duration::from_secs(3);

/// Metadata key carrying the provisional organization ID, so the
/// provider's webhook can locate the same logical attempt later.
pub const METADATA_PENDING_ORGANIZATION_ID: &str = "pending_organization_id";

/// The result of a create-checkout operation.
#[derive(Debug, Clone)]
pub enum CheckoutOutcome {
    /// A hosted checkout session exists for this attempt.
    Session {
        attempt_id: AttemptId,
        idempotency_key: IdempotencyKey,
        url: String,
        /// True if the session already existed and was echoed back
        /// rather than created by this execution.
        replayed: bool,
    },
    /// Sales-led rows were provisioned; no provider call was made.
    SalesLed {
        organization_id: Uuid,
        subscription_id: Uuid,
    },
}

/// Orchestrates exactly-once checkout creation.
///
/// For paid checkouts, all coordination between concurrent executions of
/// the same key goes through the ledger's atomic claim transition: the
/// winner performs the one provider call, every loser either echoes the
/// winner's resource or waits briefly for it. Sales-led requests are
/// dispatched to the compensating saga instead, outside the ledger.
pub struct CheckoutCoordinator<L, G>
where
    L: AttemptLedger,
    G: CheckoutGateway,
{
    ledger: L,
    gateway: G,
    sales_led: SalesLedService,
    wait_budget: Duration,
}

impl<L, G> CheckoutCoordinator<L, G>
where
    L: AttemptLedger,
    G: CheckoutGateway,
{
    /// Creates a new coordinator.
    pub fn new(ledger: L, gateway: G, sales_led: SalesLedService) -> Self {
        Self {
            ledger,
            gateway,
            sales_led,
            wait_budget: DEFAULT_WAIT_BUDGET,
        }
    }

    /// Overrides the losing side's wait budget.
    pub fn with_wait_budget(mut self, budget: Duration) -> Self {
        self.wait_budget = budget;
        self
    }

    /// Creates a checkout for the request, exactly once per idempotency
    /// key no matter how often the request is duplicated.
    #[tracing::instrument(skip(self, request), fields(tier = %request.tier))]
    pub async fn create_checkout(
        &self,
        request: CheckoutRequest,
    ) -> Result<CheckoutOutcome, CheckoutError> {
        metrics::counter!("checkout_attempts_total").increment(1);
        let started = std::time::Instant::now();

        // The flow is decided once, here; nothing downstream re-inspects
        // the raw request.
        let result = match request.classify()? {
            CheckoutFlow::Paid { amount, currency } => {
                self.paid_checkout(&request, amount, currency).await
            }
            CheckoutFlow::SalesLed => self.sales_led_checkout(&request).await,
        };

        metrics::histogram!("checkout_duration_seconds").record(started.elapsed().as_secs_f64());
        result
    }

    /// Read-only status lookup for callers polling after a race timeout.
    #[tracing::instrument(skip(self))]
    pub async fn get_status(&self, key: &IdempotencyKey) -> Result<Option<Attempt>, CheckoutError> {
        Ok(self.ledger.find_by_key(key).await?)
    }

    async fn paid_checkout(
        &self,
        request: &CheckoutRequest,
        amount: Money,
        currency: Currency,
    ) -> Result<CheckoutOutcome, CheckoutError> {
        let key = request
            .idempotency_key
            .clone()
            .unwrap_or_else(IdempotencyKey::generate);

        let fingerprint = Fingerprint::compute(&FingerprintInput {
            flow_type: FlowType::PaidCheckout,
            amount,
            currency: currency.clone(),
            owner_id: request.owner_id,
            organization_name: request.organization_name.clone(),
        });

        let mut metadata = HashMap::new();
        metadata.insert(
            METADATA_PENDING_ORGANIZATION_ID.to_string(),
            serde_json::json!(Uuid::new_v4().to_string()),
        );
        metadata.insert(
            "organization_name".to_string(),
            serde_json::json!(request.organization_name),
        );

        // Get-or-create. A fingerprint mismatch against an existing row is
        // a caller bug, surfaced immediately and never retried.
        let attempt = self
            .ledger
            .ensure_attempt(NewAttempt {
                idempotency_key: key.clone(),
                flow_type: FlowType::PaidCheckout,
                amount,
                currency: currency.clone(),
                owner_id: request.owner_id,
                request_fingerprint: fingerprint,
                metadata,
            })
            .await
            .map_err(|e| {
                if matches!(e, ledger::LedgerError::FingerprintConflict { .. }) {
                    metrics::counter!("checkout_conflicts_total").increment(1);
                    tracing::warn!(%key, "idempotency key reused with different parameters");
                }
                CheckoutError::from(e)
            })?;

        let claim = self.ledger.claim_attempt(attempt.id).await?;
        if claim.claimed {
            return self.execute_provider_call(claim.attempt, key).await;
        }

        // Lost the race. If the winner already finished, echo its resource
        // verbatim: replay never recreates.
        if let Some(outcome) = replay_outcome(&claim.attempt, &key) {
            metrics::counter!("checkout_replays_total").increment(1);
            return Ok(outcome);
        }

        tracing::debug!(%key, attempt_id = %claim.attempt.id, "claim lost, waiting for winner");
        match self
            .ledger
            .wait_for_resource(claim.attempt.id, self.wait_budget)
            .await?
        {
            Some(completed) => {
                metrics::counter!("checkout_replays_total").increment(1);
                replay_outcome(&completed, &key).ok_or(CheckoutError::RaceTimeout {
                    idempotency_key: key,
                    attempt_id: completed.id,
                })
            }
            None => Err(CheckoutError::RaceTimeout {
                idempotency_key: key,
                attempt_id: claim.attempt.id,
            }),
        }
    }

    async fn execute_provider_call(
        &self,
        attempt: Attempt,
        key: IdempotencyKey,
    ) -> Result<CheckoutOutcome, CheckoutError> {
        // The ledger's key doubles as the provider's dedup token: a second,
        // independent idempotency layer.
        let session_request = CreateSessionRequest {
            idempotency_key: key.clone(),
            amount: attempt.amount,
            currency: attempt.currency.clone(),
            metadata: attempt.metadata.clone(),
        };

        match self.gateway.create_session(session_request).await {
            Ok(session) => {
                let updated = self
                    .ledger
                    .update_attempt(
                        attempt.id,
                        AttemptUpdate::completed(&session.resource_id, &session.url),
                    )
                    .await?;
                tracing::info!(attempt_id = %updated.id, %key, "checkout session created");
                Ok(CheckoutOutcome::Session {
                    attempt_id: updated.id,
                    idempotency_key: key,
                    url: session.url,
                    replayed: false,
                })
            }
            Err(e) => {
                // Record the failure on the row so the next retry with the
                // same key has the diagnostic context, and leave the row
                // reclaimable.
                let message = e.to_string();
                self.ledger
                    .update_attempt(attempt.id, AttemptUpdate::failed(&message))
                    .await?;
                tracing::warn!(attempt_id = %attempt.id, %key, error = %message, "provider call failed");
                Err(CheckoutError::Provider {
                    message,
                    idempotency_key: key,
                    attempt_id: attempt.id,
                })
            }
        }
    }

    async fn sales_led_checkout(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutOutcome, CheckoutError> {
        let provisioned = self
            .sales_led
            .provision(&request.organization_name, request.owner_id)
            .await?;

        Ok(CheckoutOutcome::SalesLed {
            organization_id: provisioned.organization_id,
            subscription_id: provisioned.subscription_id,
        })
    }
}

/// Builds a replay outcome when the attempt already holds its resource.
fn replay_outcome(attempt: &Attempt, key: &IdempotencyKey) -> Option<CheckoutOutcome> {
    match (&attempt.external_resource_id, &attempt.external_resource_url) {
        (Some(_), Some(url)) => Some(CheckoutOutcome::Session {
            attempt_id: attempt.id,
            idempotency_key: key.clone(),
            url: url.clone(),
            replayed: true,
        }),
        _ => None,
    }
}
