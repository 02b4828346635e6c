// Path: crates/mandate-types/src/audit.rs
//! The `AuditEntry` and `MerkleRoot` entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warn,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorDescriptor {
    pub did: Option<String>,
    pub kind: String, // "agent" | "system" | "operator"
    pub label: String,
}

/// A single append-only entry in an organization's hash-chained ledger.
///
/// The fields `{id, action, payload, previous_hash, sequence_number}` are
/// exactly the ones canonicalized and hashed to produce `entry_hash`; see
/// `mandate-audit::ledger` for the canonical-JSON + SHA-256 pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: uuid::Uuid,
    pub organization_id: String,
    pub sequence_number: u64,
    pub actor: ActorDescriptor,
    pub action: String,
    pub payload: Value,
    pub previous_hash: [u8; 32],
    pub entry_hash: [u8; 32],
    pub signature: Vec<u8>,
    pub severity: Severity,
    pub retain_until: DateTime<Utc>,
    pub recorded_at: DateTime<Utc>,
}

/// The subset of fields that feed the hash, in the exact shape that gets
/// canonicalized. Kept as a separate type so hashing code can't
/// accidentally include a field (like `signature`) that must not be
/// covered by its own digest.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntryHashInput<'a> {
    pub id: uuid::Uuid,
    pub action: &'a str,
    pub payload: &'a Value,
    pub previous_hash: [u8; 32],
    pub sequence_number: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditVerificationError {
    pub sequence_number: u64,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditVerificationReport {
    pub entries_checked: u64,
    pub valid: bool,
    pub errors: Vec<AuditVerificationError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerkleRoot {
    pub organization_id: String,
    pub root_hash: [u8; 32],
    pub start_sequence: u64,
    pub end_sequence: u64,
    pub entry_count: u64,
    pub signature: Vec<u8>,
    pub anchored_to: Option<String>,
    pub anchored_at: Option<DateTime<Utc>>,
    pub anchor_tx_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}
