//! Deterministic hash of the semantically significant request parameters.
//!
//! Used purely to detect idempotency-key misuse (same key, different
//! logical request), not as a security boundary.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use common::{Currency, Money, OwnerId};

use crate::attempt::FlowType;

/// A SHA-256 digest of the canonicalized request parameters, hex-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Computes the fingerprint of a normalized request.
    ///
    /// Parameters are canonicalized into a sorted map before hashing, so
    /// logically identical inputs hash identically regardless of the
    /// order fields arrived in.
    pub fn compute(input: &FingerprintInput) -> Self {
        let canonical = input.canonicalize();
        // BTreeMap serializes with sorted keys, making the JSON encoding
        // deterministic.
        let bytes = serde_json::to_vec(&canonical).expect("canonical map serializes");
        let digest = Sha256::digest(&bytes);
        Self(hex::encode(digest))
    }

    /// Wraps an already-computed hex digest (e.g. read back from storage).
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// Returns the digest as a hex string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The semantically significant parameters of a checkout request.
#[derive(Debug, Clone)]
pub struct FingerprintInput {
    pub flow_type: FlowType,
    pub amount: Money,
    pub currency: Currency,
    pub owner_id: OwnerId,
    pub organization_name: String,
}

impl FingerprintInput {
    fn canonicalize(&self) -> BTreeMap<&'static str, serde_json::Value> {
        let mut map = BTreeMap::new();
        map.insert("flow_type", serde_json::json!(self.flow_type.as_str()));
        map.insert("amount", serde_json::json!(self.amount.cents()));
        map.insert("currency", serde_json::json!(self.currency.as_str()));
        map.insert("owner_id", serde_json::json!(self.owner_id.to_string()));
        map.insert(
            "organization_name",
            serde_json::json!(self.organization_name),
        );
        map
    }
}
