//! External provider gateway trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Notify;

use common::{Currency, IdempotencyKey, Money};

/// Parameters for creating a hosted checkout session.
#[derive(Debug, Clone)]
pub struct CreateSessionRequest {
    /// Forwarded as the provider's own dedup token: a second, independent
    /// idempotency layer on top of the attempt ledger.
    pub idempotency_key: IdempotencyKey,
    pub amount: Money,
    pub currency: Currency,
    /// Provisional cross-system identifiers the provider echoes back on
    /// its webhook, so the confirmation step can locate the same attempt.
    pub metadata: HashMap<String, serde_json::Value>,
}

/// A hosted checkout session created by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    /// The provider-assigned session ID.
    pub resource_id: String,
    /// The hosted payment page URL the caller is redirected to.
    pub url: String,
}

/// Errors returned by the provider gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The provider rejected the session parameters.
    #[error("checkout session rejected: {0}")]
    Rejected(String),

    /// The provider could not be reached or returned a transient error.
    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

/// Trait for external checkout-session creation.
///
/// Contract: given the same idempotency token, repeated calls converge to
/// the same session even if the ledger's own atomicity were somehow
/// violated.
#[async_trait]
pub trait CheckoutGateway: Send + Sync {
    /// Creates (or returns the previously created) checkout session for
    /// the request's idempotency token.
    async fn create_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<CheckoutSession, GatewayError>;
}

#[derive(Debug, Default)]
struct InMemoryGatewayState {
    sessions: HashMap<IdempotencyKey, CheckoutSession>,
    invocations: HashMap<IdempotencyKey, u32>,
    next_id: u32,
    fail_on_create: bool,
}

/// In-memory checkout gateway for testing.
///
/// Honors the provider-level idempotency contract: a replayed token
/// returns the stored session. Can be configured to fail or to stall
/// (park the call until released) to simulate a stuck claim holder.
#[derive(Clone, Default)]
pub struct InMemoryCheckoutGateway {
    state: Arc<RwLock<InMemoryGatewayState>>,
    stalled: Arc<AtomicBool>,
    release: Arc<Notify>,
}

impl InMemoryCheckoutGateway {
    /// Creates a new in-memory gateway.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the gateway to fail on the next create call.
    pub fn set_fail_on_create(&self, fail: bool) {
        self.state.write().unwrap().fail_on_create = fail;
    }

    /// Parks subsequent create calls until [`release`](Self::release).
    pub fn stall(&self) {
        self.stalled.store(true, Ordering::SeqCst);
    }

    /// Releases calls parked by [`stall`](Self::stall).
    pub fn release(&self) {
        self.stalled.store(false, Ordering::SeqCst);
        self.release.notify_waiters();
    }

    /// Returns how many times `create_session` ran for the given token.
    pub fn invocation_count(&self, key: &IdempotencyKey) -> u32 {
        self.state
            .read()
            .unwrap()
            .invocations
            .get(key)
            .copied()
            .unwrap_or(0)
    }

    /// Returns the total number of create invocations across all tokens.
    pub fn total_invocations(&self) -> u32 {
        self.state.read().unwrap().invocations.values().sum()
    }

    /// Returns the number of distinct sessions created.
    pub fn session_count(&self) -> usize {
        self.state.read().unwrap().sessions.len()
    }
}

#[async_trait]
impl CheckoutGateway for InMemoryCheckoutGateway {
    async fn create_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        loop {
            if !self.stalled.load(Ordering::SeqCst) {
                break;
            }
            let released = self.release.notified();
            // Re-check after registering so a release between the check and
            // the await is not missed.
            if !self.stalled.load(Ordering::SeqCst) {
                break;
            }
            released.await;
        }

        let mut state = self.state.write().unwrap();
        *state
            .invocations
            .entry(request.idempotency_key.clone())
            .or_insert(0) += 1;

        if state.fail_on_create {
            return Err(GatewayError::Unavailable(
                "provider unavailable".to_string(),
            ));
        }

        if let Some(existing) = state.sessions.get(&request.idempotency_key) {
            return Ok(existing.clone());
        }

        state.next_id += 1;
        let session = CheckoutSession {
            resource_id: format!("cs_{:04}", state.next_id),
            url: format!("https://pay.example/cs_{:04}", state.next_id),
        };
        state
            .sessions
            .insert(request.idempotency_key, session.clone());
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::OwnerId;

    fn request(key: &str) -> CreateSessionRequest {
        let mut metadata = HashMap::new();
        metadata.insert(
            "owner_id".to_string(),
            serde_json::json!(OwnerId::new().to_string()),
        );
        CreateSessionRequest {
            idempotency_key: IdempotencyKey::new(key),
            amount: Money::from_cents(1500),
            currency: Currency::usd(),
            metadata,
        }
    }

    #[tokio::test]
    async fn creates_distinct_sessions_per_token() {
        let gateway = InMemoryCheckoutGateway::new();

        let a = gateway.create_session(request("a")).await.unwrap();
        let b = gateway.create_session(request("b")).await.unwrap();

        assert_ne!(a.resource_id, b.resource_id);
        assert_eq!(gateway.session_count(), 2);
    }

    #[tokio::test]
    async fn replayed_token_returns_same_session() {
        let gateway = InMemoryCheckoutGateway::new();

        let first = gateway.create_session(request("abc123")).await.unwrap();
        let second = gateway.create_session(request("abc123")).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(gateway.session_count(), 1);
        assert_eq!(gateway.invocation_count(&IdempotencyKey::new("abc123")), 2);
    }

    #[tokio::test]
    async fn fail_on_create_surfaces_unavailable() {
        let gateway = InMemoryCheckoutGateway::new();
        gateway.set_fail_on_create(true);

        let result = gateway.create_session(request("k")).await;
        assert!(matches!(result, Err(GatewayError::Unavailable(_))));
        assert_eq!(gateway.session_count(), 0);
    }

    #[tokio::test]
    async fn stalled_call_parks_until_release() {
        let gateway = InMemoryCheckoutGateway::new();
        gateway.stall();

        let parked = {
            let gateway = gateway.clone();
            tokio::spawn(async move { gateway.create_session(request("k")).await })
        };

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert!(!parked.is_finished());

        gateway.release();
        let session = parked.await.unwrap().unwrap();
        assert!(session.url.starts_with("https://pay.example/"));
    }
}
