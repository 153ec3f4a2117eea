//! Compensating saga for sales-led account provisioning.
//!
//! The sales-led flow never touches the external payment provider. It
//! creates a short, fixed sequence of dependent rows (organization,
//! owner-role assignment, subscription placeholder) and, on failure of any
//! step, deletes all previously created rows in reverse order before
//! returning an error. No orphan rows survive a partial failure.
//!
//! This is a minimal saga pattern, not a durable saga log: the step list
//! is an explicit ordered list of (run, compensate) pairs executed forward,
//! with reverse-order compensation triggered by the first failure.

pub mod error;
pub mod executor;
pub mod postgres;
pub mod sales_led;
pub mod store;

pub use error::{SagaError, SagaStepError};
pub use executor::{SagaExecutor, SagaStep};
pub use postgres::PostgresSalesLedStore;
pub use sales_led::{SalesLedProvisioned, SalesLedService, slugify};
pub use store::{InMemorySalesLedStore, SalesLedStore};
