use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use common::OwnerId;

use crate::error::SagaStepError;
use crate::store::SalesLedStore;

/// PostgreSQL-backed sales-led store.
#[derive(Clone)]
pub struct PostgresSalesLedStore {
    pool: PgPool,
}

impl PostgresSalesLedStore {
    /// Creates a new PostgreSQL sales-led store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SalesLedStore for PostgresSalesLedStore {
    async fn create_organization(&self, name: &str, slug: &str) -> Result<Uuid, SagaStepError> {
        let id = Uuid::new_v4();

        sqlx::query("INSERT INTO organizations (id, name, slug) VALUES ($1, $2, $3)")
            .bind(id)
            .bind(name)
            .bind(slug)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                // Unique constraint violation on the slug is the dedupe gate
                // for duplicate sales-led submissions.
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.constraint() == Some("unique_organization_slug")
                {
                    return SagaStepError::SlugTaken(slug.to_string());
                }
                SagaStepError::Database(e)
            })?;

        Ok(id)
    }

    async fn delete_organization(&self, id: Uuid) -> Result<(), SagaStepError> {
        sqlx::query("DELETE FROM organizations WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn assign_owner_role(
        &self,
        organization_id: Uuid,
        owner_id: OwnerId,
    ) -> Result<Uuid, SagaStepError> {
        let id = Uuid::new_v4();

        sqlx::query(
            "INSERT INTO organization_members (id, organization_id, owner_id, role) \
             VALUES ($1, $2, $3, 'owner')",
        )
        .bind(id)
        .bind(organization_id)
        .bind(owner_id.as_uuid())
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    async fn remove_owner_role(&self, membership_id: Uuid) -> Result<(), SagaStepError> {
        sqlx::query("DELETE FROM organization_members WHERE id = $1")
            .bind(membership_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn create_subscription_placeholder(
        &self,
        organization_id: Uuid,
    ) -> Result<Uuid, SagaStepError> {
        let id = Uuid::new_v4();

        sqlx::query(
            "INSERT INTO subscriptions (id, organization_id, status) \
             VALUES ($1, $2, 'pending_sales')",
        )
        .bind(id)
        .bind(organization_id)
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    async fn delete_subscription_placeholder(&self, id: Uuid) -> Result<(), SagaStepError> {
        sqlx::query("DELETE FROM subscriptions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
