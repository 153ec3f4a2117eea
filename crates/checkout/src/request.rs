//! Checkout request model and flow classification.

use common::{Currency, IdempotencyKey, Money, OwnerId};

use crate::error::CheckoutError;

/// Plan tier requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanTier {
    /// Self-serve paid plan; goes through the hosted checkout session.
    Standard,
    /// Sales-led plan handled offline; never touches the provider.
    Enterprise,
}

impl PlanTier {
    /// Parses a tier from its wire representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "standard" => Some(PlanTier::Standard),
            "enterprise" => Some(PlanTier::Enterprise),
            _ => None,
        }
    }
}

/// An inbound "create checkout" request, as received from the HTTP layer.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    /// Caller-assigned dedup token; one is generated if absent.
    pub idempotency_key: Option<IdempotencyKey>,
    pub owner_id: OwnerId,
    pub organization_name: String,
    pub tier: String,
    pub amount_cents: Option<i64>,
    pub currency: Option<String>,
}

/// The flow a request belongs to, decided once, up front.
///
/// All dispatch downstream branches on this tag; the coordinator never
/// re-inspects the raw request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutFlow {
    /// Paid subscription: the claim protocol guards one provider call.
    Paid { amount: Money, currency: Currency },
    /// Sales-led creation: the compensating saga, no provider call.
    SalesLed,
}

impl CheckoutRequest {
    /// Validates the request and classifies it into its flow.
    pub fn classify(&self) -> Result<CheckoutFlow, CheckoutError> {
        if self.organization_name.trim().is_empty() {
            return Err(CheckoutError::Validation(
                "organization_name must not be empty".to_string(),
            ));
        }

        let tier = PlanTier::parse(&self.tier)
            .ok_or_else(|| CheckoutError::Validation(format!("unknown tier '{}'", self.tier)))?;

        match tier {
            PlanTier::Standard => {
                let cents = self.amount_cents.ok_or_else(|| {
                    CheckoutError::Validation("amount_cents is required for paid plans".to_string())
                })?;
                let amount = Money::from_cents(cents);
                if !amount.is_positive() {
                    return Err(CheckoutError::Validation(
                        "amount_cents must be positive".to_string(),
                    ));
                }

                let currency = Currency::new(self.currency.as_deref().ok_or_else(|| {
                    CheckoutError::Validation("currency is required for paid plans".to_string())
                })?);
                if !currency.is_valid() {
                    return Err(CheckoutError::Validation(format!(
                        "invalid currency code '{currency}'"
                    )));
                }

                Ok(CheckoutFlow::Paid { amount, currency })
            }
            PlanTier::Enterprise => Ok(CheckoutFlow::SalesLed),
        }
    }
}
