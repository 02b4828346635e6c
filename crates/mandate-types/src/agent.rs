// Path: crates/mandate-types/src/agent.rs
//! The `Agent` entity and its lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AgentId, Did};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentType {
    Primary,
    Delegated,
    Service,
    Ephemeral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentStatus {
    Active,
    Frozen,
    Revoked,
    PendingApproval,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FreezeMeta {
    pub reason: String,
    pub actor: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub did: Did,
    /// Tenant the agent belongs to; `SetGlobalFreeze` sweeps by this field.
    pub organization_id: String,
    pub display_name: String,
    /// Raw Ed25519 public key bytes.
    pub public_key: Vec<u8>,
    /// Opaque reference to the sealed private key held by the `KeyStore`;
    /// the key material itself never lives in this struct.
    pub sealed_key_ref: String,
    pub owner_did: Option<Did>,
    pub agent_type: AgentType,
    pub status: AgentStatus,
    /// 0..=100, derived from running success/failure counts.
    pub reputation: u8,
    pub successful_transactions: u64,
    pub failed_transactions: u64,
    pub created_at: DateTime<Utc>,
    pub freeze: Option<FreezeMeta>,
}

impl Agent {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: AgentId,
        did: Did,
        organization_id: impl Into<String>,
        display_name: impl Into<String>,
        public_key: Vec<u8>,
        sealed_key_ref: impl Into<String>,
        owner_did: Option<Did>,
        agent_type: AgentType,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            did,
            organization_id: organization_id.into(),
            display_name: display_name.into(),
            public_key,
            sealed_key_ref: sealed_key_ref.into(),
            owner_did,
            agent_type,
            status: AgentStatus::Active,
            reputation: 100,
            successful_transactions: 0,
            failed_transactions: 0,
            created_at,
            freeze: None,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status, AgentStatus::Active)
    }

    /// `100 * successful / (successful + failed)`, clamped to `[0, 100]`
    /// and defined as `100` when no transactions have been recorded yet.
    pub fn recompute_reputation(&mut self) {
        let total = self.successful_transactions + self.failed_transactions;
        self.reputation = if total == 0 {
            100
        } else {
            ((self.successful_transactions as f64 / total as f64) * 100.0).round() as u8
        };
    }

    pub fn record_outcome(&mut self, success: bool) {
        if success {
            self.successful_transactions += 1;
        } else {
            self.failed_transactions += 1;
        }
        self.recompute_reputation();
    }
}
