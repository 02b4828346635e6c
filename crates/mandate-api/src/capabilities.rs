// Path: crates/mandate-api/src/capabilities.rs

//! External-capability contracts (§6): the core depends on these traits,
//! and never on the wire format or backend behind them. Everything in the
//! orchestrator, delegation, policy, rate-limit, audit, and issuer crates
//! is written against these interfaces, not against a concrete database,
//! cache, or HSM client.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mandate_types::audit::{AuditEntry, MerkleRoot};
use mandate_types::agent::Agent;
use mandate_types::delegation::DelegationToken;
use mandate_types::error::Result;
use mandate_types::ids::{AgentId, Did, PolicyId, TokenId};
use mandate_types::policy::{Policy, PolicyScope};
use mandate_types::ratelimit::{NonceRecord, RateLimitWindow};
use mandate_types::transaction::{TransactionRecord, TransactionStatus};

/// Strongly-consistent persistence for every entity the kernel owns.
///
/// Implementations must provide read-after-write consistency. Writes that
/// document an expected prior version (rate-limit windows, audit sequence
/// numbers) use a compare-and-swap so concurrent writers detect conflicts
/// instead of silently clobbering each other; callers translate a losing
/// CAS into [`mandate_types::error::StateError::VersionConflict`].
#[async_trait]
pub trait Storage: Send + Sync {
    async fn get_agent_by_id(&self, id: &AgentId) -> Result<Option<Agent>>;
    async fn get_agent_by_did(&self, did: &Did) -> Result<Option<Agent>>;
    async fn put_agent(&self, agent: &Agent) -> Result<()>;
    async fn list_agents_for_org(&self, organization_id: &str) -> Result<Vec<Agent>>;

    async fn get_policy(&self, id: &PolicyId) -> Result<Option<Policy>>;
    async fn put_policy(&self, policy: &Policy) -> Result<()>;
    async fn list_policies_for_scope(&self, scope: &PolicyScope) -> Result<Vec<Policy>>;

    async fn get_delegation_token(&self, id: &TokenId) -> Result<Option<DelegationToken>>;
    async fn put_delegation_token(&self, token: &DelegationToken) -> Result<()>;
    /// Direct children of `parent_id`, used to walk the revocation cascade.
    async fn list_child_tokens(&self, parent_id: &TokenId) -> Result<Vec<DelegationToken>>;
    /// Active tokens this agent currently holds as recipient; feeds the
    /// rate limiter's per-agent usage accounting.
    async fn list_active_tokens_for_agent(&self, agent_did: &Did) -> Result<Vec<DelegationToken>>;
    /// Tokens this agent minted as issuer (active or not), used by
    /// cascade-by-issuer revocation and by the identity-freeze cascade.
    async fn list_tokens_issued_by(&self, issuer_did: &Did) -> Result<Vec<DelegationToken>>;

    async fn put_transaction(&self, record: &TransactionRecord) -> Result<()>;
    async fn get_transaction(&self, id: &uuid::Uuid) -> Result<Option<TransactionRecord>>;
    async fn update_transaction_status(
        &self,
        id: &uuid::Uuid,
        status: TransactionStatus,
    ) -> Result<()>;
    /// Transactions by `agent_did` at or after `since`, oldest first; feeds
    /// the rate limiter's and anomaly detector's recent-history views.
    async fn list_recent_transactions(
        &self,
        agent_did: &Did,
        since: DateTime<Utc>,
    ) -> Result<Vec<TransactionRecord>>;

    /// Appends `entry` only if `entry.sequence_number == expected_next_sequence`.
    /// Returns `StateError::VersionConflict` if another writer already
    /// claimed that sequence number.
    async fn append_audit_entry(&self, entry: &AuditEntry, expected_next_sequence: u64)
        -> Result<()>;
    async fn latest_audit_sequence(&self, organization_id: &str) -> Result<u64>;
    async fn get_audit_entries_range(
        &self,
        organization_id: &str,
        start_sequence: u64,
        end_sequence: u64,
    ) -> Result<Vec<AuditEntry>>;
    async fn put_merkle_root(&self, root: &MerkleRoot) -> Result<()>;
    async fn list_merkle_roots(&self, organization_id: &str) -> Result<Vec<MerkleRoot>>;
    /// Deletes entries older than `retain_until` that are already covered
    /// by an anchored Merkle root; the audit retention sweep (§4.7).
    async fn purge_audit_entries_before(
        &self,
        organization_id: &str,
        retain_until: DateTime<Utc>,
    ) -> Result<u64>;

    async fn get_rate_limit_window(&self, agent_did: &Did) -> Result<Option<RateLimitWindow>>;
    /// Compare-and-swap on the whole window; `expected` is `None` on first
    /// insert. A mismatch against the stored value is a `VersionConflict`.
    async fn put_rate_limit_window(
        &self,
        agent_did: &Did,
        expected: Option<RateLimitWindow>,
        next: RateLimitWindow,
    ) -> Result<()>;

    async fn get_nonce(&self, nonce: &str) -> Result<Option<NonceRecord>>;
    async fn put_nonce_if_absent(&self, record: &NonceRecord) -> Result<bool>;
    async fn purge_expired_nonces(&self, now: DateTime<Utc>) -> Result<u64>;
}

/// TTL key/value cache plus the handful of primitives the kernel layers on
/// top of a plain cache: a sliding-window counter and a distributed lock.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn set(&self, key: &str, value: Vec<u8>, ttl: std::time::Duration) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
    async fn delete_pattern(&self, pattern: &str) -> Result<u64>;

    /// Acquires a lock named `key` for at most `ttl`, returning a token that
    /// must be passed to [`Cache::unlock`] to release it early. Returns
    /// `None` if the lock is already held.
    async fn lock(&self, key: &str, ttl: std::time::Duration) -> Result<Option<String>>;
    async fn unlock(&self, key: &str, token: &str) -> Result<()>;
}

/// At-least-once publish to a named channel. Known channels: `agent.events`,
/// `transaction.events`, `global.events`.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, channel: &str, payload: serde_json::Value) -> Result<()>;
}

/// Everything a caller must supply to append one audit entry, short of the
/// hash-chain bookkeeping ([`AuditEntry::previous_hash`],
/// `entry_hash`, `sequence_number`), which only `mandate-audit`'s ledger
/// knows how to assign.
#[derive(Debug, Clone)]
pub struct AuditDraft {
    pub organization_id: String,
    pub actor: mandate_types::audit::ActorDescriptor,
    pub action: String,
    pub payload: serde_json::Value,
    pub severity: mandate_types::audit::Severity,
}

/// The write side of the audit ledger (§4.7), exposed as a trait so that
/// every other component (identity, delegation, rate limiter) can append
/// entries without depending on `mandate-audit`'s hash-chaining internals —
/// only the orchestrator wires a concrete ledger into this trait.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, draft: AuditDraft) -> Result<AuditEntry>;
}

/// Key lifecycle state; operations on anything but `Enabled` are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyState {
    Enabled,
    Disabled,
    PendingDestruction,
    Destroyed,
}

/// Algorithm tag attached to a key so callers and audit entries can record
/// which suite produced a signature without the kernel hard-coding it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyAlgorithm {
    Ed25519,
}

/// Key generation, signing, verification, and symmetric sealing (§4.1).
///
/// A local implementation holds keys in memory with the sealed form on
/// disk; production implementations front an HSM/KMS. Either way, callers
/// only ever see this trait.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Generates a new Ed25519 keypair, returning an opaque key id and the
    /// raw public key bytes. The private key never leaves the store.
    async fn generate_keypair(&self) -> Result<(String, Vec<u8>)>;
    async fn public_key(&self, key_id: &str) -> Result<Vec<u8>>;
    async fn key_state(&self, key_id: &str) -> Result<KeyState>;
    async fn set_key_state(&self, key_id: &str, state: KeyState) -> Result<()>;
    async fn sign(&self, key_id: &str, message: &[u8]) -> Result<Vec<u8>>;
    async fn verify(&self, key_id: &str, message: &[u8], signature: &[u8]) -> Result<()>;
    /// Verifies against a raw public key rather than a stored key id; used
    /// to check signatures from a remote-issued token without registering
    /// the signer's key locally.
    async fn verify_with_key(
        &self,
        public_key: &[u8],
        message: &[u8],
        signature: &[u8],
    ) -> Result<()>;
    async fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>>;
    async fn unseal(&self, sealed: &[u8]) -> Result<Vec<u8>>;
}

/// The verdict of a semantic (LLM-backed) policy clause evaluation.
#[derive(Debug, Clone)]
pub struct SemanticEvaluation {
    pub compliant: bool,
    pub confidence: f64,
    pub reasoning: String,
    pub latency_ms: u64,
    pub cost: f64,
}

/// Natural-language policy clause evaluation against a transaction context.
/// May fail or time out; the policy engine's `fail_closed` setting decides
/// how that is treated (§4.4).
#[async_trait]
pub trait SemanticEvaluator: Send + Sync {
    async fn evaluate(
        &self,
        clauses: &[String],
        reasoning: Option<&str>,
        context: &serde_json::Value,
    ) -> Result<SemanticEvaluation>;
}

/// Injectable wall-clock and monotonic clock, so tests can control time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
    fn monotonic_now(&self) -> std::time::Instant;
}

/// Injectable cryptographic randomness source.
pub trait Rng: Send + Sync {
    fn fill_bytes(&self, buf: &mut [u8]);
}

/// An acquired (and not yet released) distributed lock handle.
pub struct DistributedLock {
    pub key: String,
    pub token: String,
}

/// Optional settlement rail a `PAYMENT` transaction may be routed through
/// once authorized. The core never calls this directly; an integration
/// layer does, after receiving an `ALLOW` decision.
#[async_trait]
pub trait PaymentRail: Send + Sync {
    async fn execute(
        &self,
        transaction_id: &uuid::Uuid,
        amount: f64,
        currency: &str,
        merchant: &str,
    ) -> Result<String>;
}
