//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use checkout::CheckoutError;
use saga::SagaError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Checkout coordinator error.
    Checkout(CheckoutError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::NotFound(msg) => simple_response(StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => simple_response(StatusCode::BAD_REQUEST, msg),
            ApiError::Checkout(err) => checkout_error_to_response(err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                simple_response(StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        }
    }
}

fn simple_response(status: StatusCode, message: String) -> Response {
    let body = serde_json::json!({ "error": message });
    (status, axum::Json(body)).into_response()
}

fn checkout_error_to_response(err: CheckoutError) -> Response {
    let status = match &err {
        CheckoutError::Validation(_) => StatusCode::BAD_REQUEST,
        // Mismatched reuse of a key is a caller bug.
        CheckoutError::Conflict { .. } => StatusCode::CONFLICT,
        CheckoutError::Provider { .. } => StatusCode::BAD_REQUEST,
        // Still processing: the caller should retry with the same key.
        CheckoutError::RaceTimeout { .. } => StatusCode::CONFLICT,
        CheckoutError::Saga(saga_err) => saga_status(saga_err),
        CheckoutError::Ledger(ledger_err) => {
            tracing::error!(error = %ledger_err, "ledger failure");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    // Echo the idempotency key and attempt id back where one is tied to
    // the failure, so callers can correlate retries.
    let mut body = serde_json::json!({ "error": err.to_string() });
    if let Some(key) = err.idempotency_key() {
        body["idempotency_key"] = serde_json::json!(key.as_str());
    }
    if let Some(attempt_id) = err.attempt_id() {
        body["attempt_id"] = serde_json::json!(attempt_id.to_string());
    }

    (status, axum::Json(body)).into_response()
}

fn saga_status(err: &SagaError) -> StatusCode {
    if err.is_slug_taken() {
        StatusCode::CONFLICT
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        ApiError::Checkout(err)
    }
}
