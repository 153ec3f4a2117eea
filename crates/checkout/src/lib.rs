//! Claim coordinator for exactly-once checkout creation.
//!
//! The coordinator drives the idempotent attempt claim protocol
//! (ensure → claim → execute | wait-and-replay) for paid checkouts, and
//! dispatches sales-led requests to the compensating saga. Concurrent
//! duplicate submissions of the same idempotency key result in exactly one
//! external provider call; every other caller observes the winner's
//! resource or is told to retry shortly.

pub mod coordinator;
pub mod error;
pub mod gateway;
pub mod request;

pub use coordinator::{CheckoutCoordinator, CheckoutOutcome};
pub use error::CheckoutError;
pub use gateway::{
    CheckoutGateway, CheckoutSession, CreateSessionRequest, GatewayError, InMemoryCheckoutGateway,
};
pub use request::{CheckoutFlow, CheckoutRequest, PlanTier};
