//! PostgreSQL integration tests for the sales-led store and saga.
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p saga --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

use common::OwnerId;
use saga::{PostgresSalesLedStore, SagaStepError, SalesLedService, SalesLedStore};

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            // Create a temporary pool just for migrations
            let temp_pool = PgPool::connect(&connection_string).await.unwrap();

            // Run migrations using raw_sql to execute multiple statements
            sqlx::raw_sql(include_str!(
                "../../../migrations/002_create_sales_led_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();

            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> (PostgresSalesLedStore, PgPool) {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    // Clear tables for test isolation
    sqlx::query("TRUNCATE TABLE organizations, organization_members, subscriptions")
        .execute(&pool)
        .await
        .unwrap();

    (PostgresSalesLedStore::new(pool.clone()), pool)
}

async fn count(pool: &PgPool, table: &str) -> i64 {
    sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn create_organization_enforces_unique_slug() {
    let (store, _pool) = get_test_store().await;

    store.create_organization("Acme Inc", "acme-inc").await.unwrap();
    let result = store.create_organization("Acme Inc.", "acme-inc").await;

    match result {
        Err(SagaStepError::SlugTaken(slug)) => assert_eq!(slug, "acme-inc"),
        other => panic!("expected slug taken, got {other:?}"),
    }
}

#[tokio::test]
async fn provision_creates_all_three_rows() {
    let (store, pool) = get_test_store().await;
    let service = SalesLedService::new(Arc::new(store));

    let provisioned = service.provision("Globex", OwnerId::new()).await.unwrap();

    assert_eq!(count(&pool, "organizations").await, 1);
    assert_eq!(count(&pool, "organization_members").await, 1);
    assert_eq!(count(&pool, "subscriptions").await, 1);

    let status: String =
        sqlx::query_scalar("SELECT status FROM subscriptions WHERE id = $1")
            .bind(provisioned.subscription_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(status, "pending_sales");
}

#[tokio::test]
async fn duplicate_provision_compensates_and_keeps_the_original() {
    let (store, pool) = get_test_store().await;
    let service = SalesLedService::new(Arc::new(store));
    let owner = OwnerId::new();

    service.provision("Globex", owner).await.unwrap();
    let err = service.provision("Globex", owner).await.unwrap_err();
    assert!(err.is_slug_taken());

    // The first provision's rows survive untouched; the failed one left
    // nothing behind.
    assert_eq!(count(&pool, "organizations").await, 1);
    assert_eq!(count(&pool, "organization_members").await, 1);
    assert_eq!(count(&pool, "subscriptions").await, 1);
}

#[tokio::test]
async fn compensation_deletes_created_rows() {
    let (store, pool) = get_test_store().await;

    let org_id = store.create_organization("Initech", "initech").await.unwrap();
    let membership_id = store.assign_owner_role(org_id, OwnerId::new()).await.unwrap();
    let subscription_id = store.create_subscription_placeholder(org_id).await.unwrap();
    assert_eq!(count(&pool, "organizations").await, 1);

    store.delete_subscription_placeholder(subscription_id).await.unwrap();
    store.remove_owner_role(membership_id).await.unwrap();
    store.delete_organization(org_id).await.unwrap();

    assert_eq!(count(&pool, "organizations").await, 0);
    assert_eq!(count(&pool, "organization_members").await, 0);
    assert_eq!(count(&pool, "subscriptions").await, 0);
}
