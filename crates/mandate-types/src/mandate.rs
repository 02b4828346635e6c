// Path: crates/mandate-types/src/mandate.rs
//! The `MandateToken` value object carried to downstream executors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constraints::Constraints;
use crate::ids::{Did, TokenId};

pub const MANDATE_SCHEMA_V1: u16 = 1;
pub const MANDATE_SCHEMA_V2: u16 = 2;
pub const CURRENT_MANDATE_SCHEMA: u16 = MANDATE_SCHEMA_V2;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MandateHeader {
    pub alg: &'static str, // "EdDSA"
    pub typ: &'static str, // "JWT"
    pub kid: String,
}

impl MandateHeader {
    pub fn new(kid: impl Into<String>) -> Self {
        Self {
            alg: "EdDSA",
            typ: "JWT",
            kid: kid.into(),
        }
    }
}

/// The JSON payload of a mandate token (second JWS segment).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MandateToken {
    pub version: u16,
    pub token_id: TokenId,
    pub issuer: Did,
    pub subject: Did,
    pub audience: String,
    pub organization_id: String,
    pub issued_at: DateTime<Utc>,
    pub not_before: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    /// >= 128 bits of entropy, base64url-encoded by the issuer before being
    /// placed here; stored raw (bytes) for nonce-store lookups.
    pub nonce: String,
    pub delegation_chain_ids: Vec<TokenId>,
    pub permissions: Vec<String>,
    pub constraints: Constraints,
    #[serde(default)]
    pub custom_claims: serde_json::Map<String, Value>,
    /// Present only on tokens migrated from schema v1; downstream verifiers
    /// may choose to reject these via `MandateVerifyConfig::accept_legacy`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org: Option<String>,
}

impl MandateToken {
    pub fn lifetime_seconds(&self) -> i64 {
        (self.expires_at - self.issued_at).num_seconds()
    }

    pub fn is_legacy(&self) -> bool {
        self.org.as_deref() == Some("legacy")
    }
}

/// The full three-part signed token as it travels over the wire:
/// `base64url(header) "." base64url(payload) "." base64url(signature)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedMandate {
    pub header: MandateHeader,
    pub payload: MandateToken,
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MandateVerifyError {
    MalformedStructure,
    InvalidSignature,
    Expired,
    NotYetValid,
    NonceReplay,
    Revoked,
    UnsupportedVersion(u16),
    LegacyRejected,
}

impl std::fmt::Display for MandateVerifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedStructure => write!(f, "malformed mandate structure"),
            Self::InvalidSignature => write!(f, "invalid mandate signature"),
            Self::Expired => write!(f, "mandate expired"),
            Self::NotYetValid => write!(f, "mandate not yet valid"),
            Self::NonceReplay => write!(f, "mandate nonce replay"),
            Self::Revoked => write!(f, "mandate revoked"),
            Self::UnsupportedVersion(v) => write!(f, "unsupported mandate schema version {v}"),
            Self::LegacyRejected => write!(f, "legacy (v1-migrated) mandate rejected by policy"),
        }
    }
}

impl std::error::Error for MandateVerifyError {}
