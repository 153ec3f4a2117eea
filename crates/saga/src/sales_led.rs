//! The sales-led provisioning saga: organization, owner role,
//! subscription placeholder.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use common::OwnerId;

use crate::error::{SagaError, SagaStepError};
use crate::executor::{SagaExecutor, SagaStep};
use crate::store::SalesLedStore;

/// Step names, in execution order.
pub const STEP_CREATE_ORGANIZATION: &str = "create_organization";
pub const STEP_ASSIGN_OWNER_ROLE: &str = "assign_owner_role";
pub const STEP_CREATE_SUBSCRIPTION: &str = "create_subscription_placeholder";

/// Rows created by a completed sales-led saga.
#[derive(Debug, Clone)]
pub struct SalesLedProvisioned {
    pub organization_id: Uuid,
    pub membership_id: Uuid,
    pub subscription_id: Uuid,
}

/// Shared context the steps read from and write their created row IDs into.
struct SalesLedContext {
    store: Arc<dyn SalesLedStore>,
    organization_name: String,
    slug: String,
    owner_id: OwnerId,
    organization_id: Option<Uuid>,
    membership_id: Option<Uuid>,
    subscription_id: Option<Uuid>,
}

struct CreateOrganization;

#[async_trait]
impl SagaStep<SalesLedContext> for CreateOrganization {
    fn name(&self) -> &'static str {
        STEP_CREATE_ORGANIZATION
    }

    async fn run(&self, ctx: &mut SalesLedContext) -> Result<(), SagaStepError> {
        let id = ctx
            .store
            .create_organization(&ctx.organization_name, &ctx.slug)
            .await?;
        ctx.organization_id = Some(id);
        Ok(())
    }

    async fn compensate(&self, ctx: &mut SalesLedContext) -> Result<(), SagaStepError> {
        if let Some(id) = ctx.organization_id.take() {
            ctx.store.delete_organization(id).await?;
        }
        Ok(())
    }
}

struct AssignOwnerRole;

#[async_trait]
impl SagaStep<SalesLedContext> for AssignOwnerRole {
    fn name(&self) -> &'static str {
        STEP_ASSIGN_OWNER_ROLE
    }

    async fn run(&self, ctx: &mut SalesLedContext) -> Result<(), SagaStepError> {
        let org_id = ctx
            .organization_id
            .ok_or_else(|| SagaStepError::NotFound("organization not created yet".to_string()))?;
        let id = ctx.store.assign_owner_role(org_id, ctx.owner_id).await?;
        ctx.membership_id = Some(id);
        Ok(())
    }

    async fn compensate(&self, ctx: &mut SalesLedContext) -> Result<(), SagaStepError> {
        if let Some(id) = ctx.membership_id.take() {
            ctx.store.remove_owner_role(id).await?;
        }
        Ok(())
    }
}

struct CreateSubscriptionPlaceholder;

#[async_trait]
impl SagaStep<SalesLedContext> for CreateSubscriptionPlaceholder {
    fn name(&self) -> &'static str {
        STEP_CREATE_SUBSCRIPTION
    }

    async fn run(&self, ctx: &mut SalesLedContext) -> Result<(), SagaStepError> {
        let org_id = ctx
            .organization_id
            .ok_or_else(|| SagaStepError::NotFound("organization not created yet".to_string()))?;
        let id = ctx.store.create_subscription_placeholder(org_id).await?;
        ctx.subscription_id = Some(id);
        Ok(())
    }

    async fn compensate(&self, ctx: &mut SalesLedContext) -> Result<(), SagaStepError> {
        if let Some(id) = ctx.subscription_id.take() {
            ctx.store.delete_subscription_placeholder(id).await?;
        }
        Ok(())
    }
}

/// Derives a URL-safe slug from an organization name.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_was_dash = true;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_was_dash = false;
        } else if !last_was_dash {
            slug.push('-');
            last_was_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// Runs the sales-led provisioning saga.
pub struct SalesLedService {
    store: Arc<dyn SalesLedStore>,
}

impl SalesLedService {
    /// Creates a new sales-led service over the given store.
    pub fn new(store: Arc<dyn SalesLedStore>) -> Self {
        Self { store }
    }

    /// Provisions an organization, its owner-role assignment, and a
    /// subscription placeholder for offline sales handling.
    ///
    /// On failure of any step, previously created rows are deleted in
    /// reverse order before the error is returned.
    #[tracing::instrument(skip(self), fields(saga_type = "SalesLedProvisioning"))]
    pub async fn provision(
        &self,
        organization_name: &str,
        owner_id: OwnerId,
    ) -> Result<SalesLedProvisioned, SagaError> {
        metrics::counter!("sales_led_provisions_total").increment(1);

        let steps: Vec<Box<dyn SagaStep<SalesLedContext>>> = vec![
            Box::new(CreateOrganization),
            Box::new(AssignOwnerRole),
            Box::new(CreateSubscriptionPlaceholder),
        ];

        let mut ctx = SalesLedContext {
            store: self.store.clone(),
            organization_name: organization_name.to_string(),
            slug: slugify(organization_name),
            owner_id,
            organization_id: None,
            membership_id: None,
            subscription_id: None,
        };

        SagaExecutor::execute(&steps, &mut ctx).await?;

        // All three steps completed, so every ID is present.
        let provisioned = SalesLedProvisioned {
            organization_id: ctx.organization_id.ok_or(missing(STEP_CREATE_ORGANIZATION))?,
            membership_id: ctx.membership_id.ok_or(missing(STEP_ASSIGN_OWNER_ROLE))?,
            subscription_id: ctx.subscription_id.ok_or(missing(STEP_CREATE_SUBSCRIPTION))?,
        };

        tracing::info!(
            organization_id = %provisioned.organization_id,
            "sales-led provisioning completed"
        );
        Ok(provisioned)
    }
}

fn missing(step: &'static str) -> SagaError {
    SagaError::StepFailed {
        step,
        source: SagaStepError::NotFound("step completed without recording its row ID".to_string()),
    }
}
