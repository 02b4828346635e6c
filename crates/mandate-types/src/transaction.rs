// Path: crates/mandate-types/src/transaction.rs
//! The transient `TransactionRequest` and its persisted `TransactionRecord`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::delegation::DelegationToken;
use crate::ids::{Did, TokenId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub agent_did: Did,
    pub amount: f64,
    pub currency: String,
    pub merchant_id: String,
    pub merchant_name: Option<String>,
    pub category: Option<String>,
    pub reasoning: String,
    #[serde(default)]
    pub delegation_chain: Vec<DelegationToken>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, Value>,
}

impl TransactionRequest {
    pub fn validate(&self) -> Result<(), crate::error::ValidationError> {
        if !(self.amount.is_finite() && self.amount > 0.0) {
            return Err(crate::error::ValidationError::InvalidAmount(format!(
                "amount must be positive and finite, got {}",
                self.amount
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Approved,
    Denied,
    Executed,
    Failed,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Allow,
    Deny,
    RequiresReview,
    Frozen,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: uuid::Uuid,
    pub agent_did: Did,
    pub amount: f64,
    pub currency: String,
    pub merchant_id: String,
    pub status: TransactionStatus,
    pub decision: Decision,
    pub reason: String,
    pub violated_codes: Vec<String>,
    pub risk_score: u8,
    pub mandate_token_id: Option<TokenId>,
    pub created_at: DateTime<Utc>,
}

/// The response returned by `Authorize`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationResponse {
    pub decision: Decision,
    pub reason: String,
    pub violated_codes: Vec<String>,
    pub risk_score: u8,
    pub mandate: Option<crate::mandate::MandateToken>,
    pub transaction_id: uuid::Uuid,
}
