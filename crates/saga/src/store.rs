//! Storage operations backing the sales-led saga steps.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use uuid::Uuid;

use common::OwnerId;

use crate::error::SagaStepError;

/// Row-level operations for sales-led provisioning.
///
/// Each create has a matching delete so the saga can compensate a partial
/// failure. Duplicate submissions on this path are gated only by the
/// unique organization slug.
#[async_trait]
pub trait SalesLedStore: Send + Sync {
    /// Creates an organization row. Fails with
    /// [`SagaStepError::SlugTaken`] if the slug is already in use.
    async fn create_organization(&self, name: &str, slug: &str) -> Result<Uuid, SagaStepError>;

    /// Deletes an organization row (compensation).
    async fn delete_organization(&self, id: Uuid) -> Result<(), SagaStepError>;

    /// Assigns the owner role for the organization, returning the
    /// membership row ID.
    async fn assign_owner_role(
        &self,
        organization_id: Uuid,
        owner_id: OwnerId,
    ) -> Result<Uuid, SagaStepError>;

    /// Removes an owner-role assignment (compensation).
    async fn remove_owner_role(&self, membership_id: Uuid) -> Result<(), SagaStepError>;

    /// Creates a subscription placeholder in `pending_sales` status,
    /// to be picked up by the offline sales process.
    async fn create_subscription_placeholder(
        &self,
        organization_id: Uuid,
    ) -> Result<Uuid, SagaStepError>;

    /// Deletes a subscription placeholder (compensation).
    async fn delete_subscription_placeholder(&self, id: Uuid) -> Result<(), SagaStepError>;
}

#[derive(Debug, Default)]
struct InMemorySalesLedState {
    organizations: HashMap<Uuid, (String, String)>,
    memberships: HashMap<Uuid, (Uuid, OwnerId)>,
    subscriptions: HashMap<Uuid, Uuid>,
    fail_on_create_organization: bool,
    fail_on_assign_role: bool,
    fail_on_create_subscription: bool,
}

/// In-memory sales-led store for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemorySalesLedStore {
    state: Arc<RwLock<InMemorySalesLedState>>,
}

impl InMemorySalesLedStore {
    /// Creates a new in-memory sales-led store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the store to fail on the next organization creation.
    pub fn set_fail_on_create_organization(&self, fail: bool) {
        self.state.write().unwrap().fail_on_create_organization = fail;
    }

    /// Configures the store to fail on the next owner-role assignment.
    pub fn set_fail_on_assign_role(&self, fail: bool) {
        self.state.write().unwrap().fail_on_assign_role = fail;
    }

    /// Configures the store to fail on the next subscription creation.
    pub fn set_fail_on_create_subscription(&self, fail: bool) {
        self.state.write().unwrap().fail_on_create_subscription = fail;
    }

    /// Returns the number of organization rows.
    pub fn organization_count(&self) -> usize {
        self.state.read().unwrap().organizations.len()
    }

    /// Returns the number of membership rows.
    pub fn membership_count(&self) -> usize {
        self.state.read().unwrap().memberships.len()
    }

    /// Returns the number of subscription rows.
    pub fn subscription_count(&self) -> usize {
        self.state.read().unwrap().subscriptions.len()
    }

    /// Returns true if any residual rows exist.
    pub fn has_rows(&self) -> bool {
        let state = self.state.read().unwrap();
        !state.organizations.is_empty()
            || !state.memberships.is_empty()
            || !state.subscriptions.is_empty()
    }
}

#[async_trait]
impl SalesLedStore for InMemorySalesLedStore {
    async fn create_organization(&self, name: &str, slug: &str) -> Result<Uuid, SagaStepError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_create_organization {
            return Err(SagaStepError::NotFound(
                "organization storage unavailable".to_string(),
            ));
        }
        if state.organizations.values().any(|(_, s)| s == slug) {
            return Err(SagaStepError::SlugTaken(slug.to_string()));
        }

        let id = Uuid::new_v4();
        state
            .organizations
            .insert(id, (name.to_string(), slug.to_string()));
        Ok(id)
    }

    async fn delete_organization(&self, id: Uuid) -> Result<(), SagaStepError> {
        self.state.write().unwrap().organizations.remove(&id);
        Ok(())
    }

    async fn assign_owner_role(
        &self,
        organization_id: Uuid,
        owner_id: OwnerId,
    ) -> Result<Uuid, SagaStepError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_assign_role {
            return Err(SagaStepError::NotFound(
                "membership storage unavailable".to_string(),
            ));
        }

        let id = Uuid::new_v4();
        state.memberships.insert(id, (organization_id, owner_id));
        Ok(id)
    }

    async fn remove_owner_role(&self, membership_id: Uuid) -> Result<(), SagaStepError> {
        self.state.write().unwrap().memberships.remove(&membership_id);
        Ok(())
    }

    async fn create_subscription_placeholder(
        &self,
        organization_id: Uuid,
    ) -> Result<Uuid, SagaStepError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_create_subscription {
            return Err(SagaStepError::NotFound(
                "subscription storage unavailable".to_string(),
            ));
        }

        let id = Uuid::new_v4();
        state.subscriptions.insert(id, organization_id);
        Ok(id)
    }

    async fn delete_subscription_placeholder(&self, id: Uuid) -> Result<(), SagaStepError> {
        self.state.write().unwrap().subscriptions.remove(&id);
        Ok(())
    }
}
