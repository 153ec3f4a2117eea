//! Checkout creation and status endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use checkout::{
    CheckoutCoordinator, CheckoutGateway, CheckoutOutcome, CheckoutRequest,
};
use common::{IdempotencyKey, OwnerId};
use ledger::AttemptLedger;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<L, G>
where
    L: AttemptLedger,
    G: CheckoutGateway,
{
    pub coordinator: CheckoutCoordinator<L, G>,
}

// -- Request types --

#[derive(Deserialize)]
pub struct CreateCheckoutRequest {
    pub idempotency_key: Option<String>,
    pub owner_id: Option<String>,
    pub organization_name: String,
    pub tier: String,
    pub amount_cents: Option<i64>,
    pub currency: Option<String>,
}

// -- Response types --

#[derive(Serialize)]
pub struct CheckoutCreatedResponse {
    pub flow: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replayed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,
}

#[derive(Serialize)]
pub struct CheckoutStatusResponse {
    pub attempt_id: String,
    pub idempotency_key: String,
    pub status: String,
    pub flow: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

// -- Handlers --

/// POST /checkouts — create (or replay) a checkout.
///
/// Returns 201 when this call created the resource and 200 when an
/// existing resource was replayed.
#[tracing::instrument(skip(state, req))]
pub async fn create<L, G>(
    State(state): State<Arc<AppState<L, G>>>,
    Json(req): Json<CreateCheckoutRequest>,
) -> Result<(StatusCode, Json<CheckoutCreatedResponse>), ApiError>
where
    L: AttemptLedger,
    G: CheckoutGateway,
{
    let owner_id = if let Some(ref id_str) = req.owner_id {
        let uuid = uuid::Uuid::parse_str(id_str)
            .map_err(|e| ApiError::BadRequest(format!("Invalid owner_id: {e}")))?;
        OwnerId::from_uuid(uuid)
    } else {
        OwnerId::new()
    };

    let request = CheckoutRequest {
        idempotency_key: req.idempotency_key.map(IdempotencyKey::new),
        owner_id,
        organization_name: req.organization_name,
        tier: req.tier,
        amount_cents: req.amount_cents,
        currency: req.currency,
    };

    let outcome = state.coordinator.create_checkout(request).await?;
    Ok(match outcome {
        CheckoutOutcome::Session {
            attempt_id,
            idempotency_key,
            url,
            replayed,
        } => {
            let status = if replayed {
                StatusCode::OK
            } else {
                StatusCode::CREATED
            };
            (
                status,
                Json(CheckoutCreatedResponse {
                    flow: "paid_checkout",
                    attempt_id: Some(attempt_id.to_string()),
                    idempotency_key: Some(idempotency_key.as_str().to_string()),
                    checkout_url: Some(url),
                    replayed: Some(replayed),
                    organization_id: None,
                    subscription_id: None,
                }),
            )
        }
        CheckoutOutcome::SalesLed {
            organization_id,
            subscription_id,
        } => (
            StatusCode::CREATED,
            Json(CheckoutCreatedResponse {
                flow: "sales_led",
                attempt_id: None,
                idempotency_key: None,
                checkout_url: None,
                replayed: None,
                organization_id: Some(organization_id.to_string()),
                subscription_id: Some(subscription_id.to_string()),
            }),
        ),
    })
}

/// GET /checkouts/{key} — look up the attempt recorded for a key.
#[tracing::instrument(skip(state))]
pub async fn status<L, G>(
    State(state): State<Arc<AppState<L, G>>>,
    Path(key): Path<String>,
) -> Result<Json<CheckoutStatusResponse>, ApiError>
where
    L: AttemptLedger,
    G: CheckoutGateway,
{
    let key = IdempotencyKey::new(key);
    let attempt = state
        .coordinator
        .get_status(&key)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("no attempt for key {key}")))?;

    Ok(Json(CheckoutStatusResponse {
        attempt_id: attempt.id.to_string(),
        idempotency_key: attempt.idempotency_key.as_str().to_string(),
        status: attempt.status.to_string(),
        flow: attempt.flow_type.to_string(),
        checkout_url: attempt.external_resource_url,
        last_error: attempt.last_error,
    }))
}
