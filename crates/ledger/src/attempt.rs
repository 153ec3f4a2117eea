//! The attempt ledger row and its lifecycle.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use common::{AttemptId, Currency, IdempotencyKey, Money, OwnerId};

use crate::fingerprint::Fingerprint;

/// How long a `Processing` claim may go without a terminal update before
/// it is considered abandoned and the row becomes reclaimable.
pub const CLAIM_STALENESS_SECS: i64 = 300;

/// Tag distinguishing the checkout flows covered by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowType {
    /// Paid subscription via a hosted checkout session.
    PaidCheckout,
    /// Sales-led (unpriced) account creation handled offline.
    SalesLed,
}

impl FlowType {
    /// Returns the flow tag as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowType::PaidCheckout => "paid_checkout",
            FlowType::SalesLed => "sales_led",
        }
    }

    /// Parses a stored flow tag.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "paid_checkout" => Some(FlowType::PaidCheckout),
            "sales_led" => Some(FlowType::SalesLed),
            _ => None,
        }
    }
}

impl std::fmt::Display for FlowType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The status of an attempt in its lifecycle.
///
/// Transitions:
/// ```text
/// Pending ──► Processing ──► Completed
///    ▲             │
///    └── Failed ◄──┘   (Failed is reclaimable)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    /// Created, no execution has claimed it yet.
    #[default]
    Pending,

    /// Exactly one execution holds the claim and is performing the
    /// external call.
    Processing,

    /// The external resource exists; terminal state.
    Completed,

    /// The external call failed; the row can be reclaimed by a retry
    /// carrying the same key.
    Failed,
}

impl AttemptStatus {
    /// Returns true if a claim transition is allowed from this status.
    pub fn is_claimable(&self) -> bool {
        matches!(self, AttemptStatus::Pending | AttemptStatus::Failed)
    }

    /// Returns true if no further external call will be made.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AttemptStatus::Completed)
    }

    /// Returns the status as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::Pending => "pending",
            AttemptStatus::Processing => "processing",
            AttemptStatus::Completed => "completed",
            AttemptStatus::Failed => "failed",
        }
    }

    /// Parses a stored status value.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(AttemptStatus::Pending),
            "processing" => Some(AttemptStatus::Processing),
            "completed" => Some(AttemptStatus::Completed),
            "failed" => Some(AttemptStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A ledger row recording one logical checkout creation.
///
/// Rows are never deleted; completed and failed attempts remain as an
/// audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    pub id: AttemptId,
    pub idempotency_key: IdempotencyKey,
    pub flow_type: FlowType,
    /// Hash of the normalized significant request parameters.
    /// Set once on first write, immutable thereafter.
    pub request_fingerprint: Fingerprint,
    pub status: AttemptStatus,
    pub amount: Money,
    pub currency: Currency,
    pub owner_id: OwnerId,
    /// Set together with `external_resource_url` when the external call
    /// succeeds; write-once.
    pub external_resource_id: Option<String>,
    pub external_resource_url: Option<String>,
    /// Opaque bag carrying provisional cross-system identifiers (e.g. a
    /// pending organization id) so a later confirmation step can locate
    /// the same logical record.
    pub metadata: HashMap<String, serde_json::Value>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Attempt {
    /// Returns true iff both external-resource fields are set.
    pub fn has_resource(&self) -> bool {
        self.external_resource_id.is_some() && self.external_resource_url.is_some()
    }

    /// Returns true if the row is `Processing` but its claim holder has
    /// gone silent past the staleness ceiling. A claimant that crashed
    /// between claim and terminal update would otherwise wedge the key
    /// forever.
    pub fn claim_is_stale(&self, now: DateTime<Utc>) -> bool {
        self.status == AttemptStatus::Processing
            && now - self.updated_at > chrono::Duration::seconds(CLAIM_STALENESS_SECS)
    }
}

/// Parameters for creating (or fetching) an attempt row.
#[derive(Debug, Clone)]
pub struct NewAttempt {
    pub idempotency_key: IdempotencyKey,
    pub flow_type: FlowType,
    pub amount: Money,
    pub currency: Currency,
    pub owner_id: OwnerId,
    pub request_fingerprint: Fingerprint,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl NewAttempt {
    /// Materializes a fresh attempt row in `Pending` status.
    pub fn into_attempt(self) -> Attempt {
        let now = Utc::now();
        Attempt {
            id: AttemptId::new(),
            idempotency_key: self.idempotency_key,
            flow_type: self.flow_type,
            request_fingerprint: self.request_fingerprint,
            status: AttemptStatus::Pending,
            amount: self.amount,
            currency: self.currency,
            owner_id: self.owner_id,
            external_resource_id: None,
            external_resource_url: None,
            metadata: self.metadata,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Terminal write performed only by the current claim holder.
#[derive(Debug, Clone, Default)]
pub struct AttemptUpdate {
    pub status: Option<AttemptStatus>,
    pub external_resource_id: Option<String>,
    pub external_resource_url: Option<String>,
    pub last_error: Option<String>,
}

impl AttemptUpdate {
    /// Marks the attempt completed with the external resource identifiers.
    pub fn completed(resource_id: impl Into<String>, resource_url: impl Into<String>) -> Self {
        Self {
            status: Some(AttemptStatus::Completed),
            external_resource_id: Some(resource_id.into()),
            external_resource_url: Some(resource_url.into()),
            last_error: None,
        }
    }

    /// Marks the attempt failed, recording the provider error for the
    /// next retry's diagnostic context.
    pub fn failed(last_error: impl Into<String>) -> Self {
        Self {
            status: Some(AttemptStatus::Failed),
            external_resource_id: None,
            external_resource_url: None,
            last_error: Some(last_error.into()),
        }
    }
}

/// Result of a claim transition.
#[derive(Debug, Clone)]
pub struct ClaimOutcome {
    /// The row after the transition (or the current row if it did not match).
    pub attempt: Attempt,
    /// True iff this execution now holds the claim.
    pub claimed: bool,
}
