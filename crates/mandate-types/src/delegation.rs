// Path: crates/mandate-types/src/delegation.rs
//! The `DelegationToken` entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constraints::Constraints;
use crate::error::{FatalError, Result};
use crate::ids::{Did, TokenId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevocationMeta {
    pub reason: String,
    pub at: DateTime<Utc>,
}

/// The signed payload carried by a delegation token (mirrors the
/// three-part `header.payload.signature` wire encoding used by mandate
/// tokens; see `mandate-issuer`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegationPayload {
    pub token_type: &'static str, // always "DELEGATION"
    pub version: u16,
    pub organization_id: Option<String>,
    pub token_id: TokenId,
    pub issuer: Did,
    pub recipient: Did,
    pub parent_token_id: Option<TokenId>,
    pub depth: u32,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub constraints: Constraints,
    /// Hash of the parent's signed bytes, or zeros for a root token; links
    /// the chain independently of the `parent_token_id` lookup.
    pub chain_hash: [u8; 32],
}

impl DelegationPayload {
    /// Canonical bytes this payload's signature covers. Struct-field order
    /// is fixed at compile time and every set-valued field is a `BTreeSet`,
    /// so `serde_json`'s output is deterministic across processes.
    pub fn to_signing_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| FatalError::SerializationFailure(e.to_string()).into())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegationToken {
    pub payload: DelegationPayload,
    /// Detached Ed25519 signature over the canonical payload bytes.
    pub signature: Vec<u8>,
    /// SHA-256 of the full signed token bytes; used as the token's content
    /// address in storage and in `chain_hash` of any child.
    pub token_hash: [u8; 32],
    pub revoked: Option<RevocationMeta>,
}

impl DelegationToken {
    pub fn token_id(&self) -> TokenId {
        self.payload.token_id
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked.is_some()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.payload.expires_at
    }

    pub fn is_not_yet_valid(&self, now: DateTime<Utc>) -> bool {
        now < self.payload.issued_at
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.is_revoked() && !self.is_expired(now) && !self.is_not_yet_valid(now)
    }
}

/// Machine-readable violation produced by constraint evaluation against a
/// request (§4.3 "Constraint evaluation against a request").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintViolation {
    pub code: String,
    pub detail: String,
}

impl ConstraintViolation {
    pub fn new(code: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            detail: detail.into(),
        }
    }
}

/// Result of walking and verifying a delegation chain.
#[derive(Debug, Clone)]
pub struct ChainVerification {
    pub root_issuer: Did,
    pub effective_constraints: Constraints,
    pub chain_token_ids: Vec<TokenId>,
}
