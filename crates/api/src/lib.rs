//! HTTP API server with observability for the checkout platform.
//!
//! Exposes the create-checkout and status endpoints over REST, with
//! structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use checkout::{CheckoutCoordinator, CheckoutGateway, InMemoryCheckoutGateway};
use ledger::{AttemptLedger, InMemoryAttemptLedger, PostgresAttemptLedger};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{InMemorySalesLedStore, PostgresSalesLedStore, SalesLedService};
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::checkouts::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<L, G>(state: Arc<AppState<L, G>>, metrics_handle: PrometheusHandle) -> Router
where
    L: AttemptLedger + 'static,
    G: CheckoutGateway + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/checkouts", post(routes::checkouts::create::<L, G>))
        .route("/checkouts/{key}", get(routes::checkouts::status::<L, G>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates application state backed entirely by in-memory stores, with a
/// mock provider gateway. Used for local runs and tests.
pub fn create_in_memory_state() -> Arc<AppState<InMemoryAttemptLedger, InMemoryCheckoutGateway>> {
    let sales_led = SalesLedService::new(Arc::new(InMemorySalesLedStore::new()));
    let coordinator = CheckoutCoordinator::new(
        InMemoryAttemptLedger::new(),
        InMemoryCheckoutGateway::new(),
        sales_led,
    );
    Arc::new(AppState { coordinator })
}

/// Creates application state backed by PostgreSQL, with a mock provider
/// gateway in place of the real payment provider.
pub fn create_postgres_state(
    pool: PgPool,
) -> Arc<AppState<PostgresAttemptLedger, InMemoryCheckoutGateway>> {
    let sales_led = SalesLedService::new(Arc::new(PostgresSalesLedStore::new(pool.clone())));
    let coordinator = CheckoutCoordinator::new(
        PostgresAttemptLedger::new(pool),
        InMemoryCheckoutGateway::new(),
        sales_led,
    );
    Arc::new(AppState { coordinator })
}
