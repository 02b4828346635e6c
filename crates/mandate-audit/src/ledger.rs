// Path: crates/mandate-audit/src/ledger.rs

//! The append-and-verify half of the ledger. Every entry's `entry_hash`
//! covers `{id, action, payload, previous_hash, sequence_number}` via
//! canonical JSON (fixed field order, no ambiguous map ordering) and SHA-256;
//! the signature covers `entry_hash`, not the raw canonical bytes, so
//! verification never needs to re-derive the hash input shape from a
//! signature alone.

use std::sync::Arc;

use async_trait::async_trait;
use mandate_api::capabilities::{AuditDraft, AuditSink, Clock, KeyStore, Storage};
use mandate_crypto::algorithms::hash::sha256;
use mandate_types::audit::{AuditEntry, AuditEntryHashInput, AuditVerificationError, AuditVerificationReport};
use mandate_types::config::AuditConfig;
use mandate_types::error::{FatalError, MandateError, Result, StateError};

const MAX_CAS_RETRIES: u32 = 8;

pub struct Ledger {
    storage: Arc<dyn Storage>,
    key_store: Arc<dyn KeyStore>,
    clock: Arc<dyn Clock>,
    config: AuditConfig,
    signing_key_id: String,
}

impl Ledger {
    pub fn new(
        storage: Arc<dyn Storage>,
        key_store: Arc<dyn KeyStore>,
        clock: Arc<dyn Clock>,
        config: AuditConfig,
        signing_key_id: String,
    ) -> Self {
        Self { storage, key_store, clock, config, signing_key_id }
    }

    fn hash_bytes(input: &AuditEntryHashInput<'_>) -> Result<Vec<u8>> {
        serde_json::to_vec(input).map_err(|e| FatalError::SerializationFailure(e.to_string()).into())
    }

    async fn build_entry(&self, draft: &AuditDraft, sequence_number: u64, previous_hash: [u8; 32]) -> Result<AuditEntry> {
        let id = uuid::Uuid::new_v4();
        let hash_input = AuditEntryHashInput {
            id,
            action: &draft.action,
            payload: &draft.payload,
            previous_hash,
            sequence_number,
        };
        let entry_hash = sha256(Self::hash_bytes(&hash_input)?)?;
        let signature = self.key_store.sign(&self.signing_key_id, &entry_hash).await?;
        let now = self.clock.now();
        Ok(AuditEntry {
            id,
            organization_id: draft.organization_id.clone(),
            sequence_number,
            actor: draft.actor.clone(),
            action: draft.action.clone(),
            payload: draft.payload.clone(),
            previous_hash,
            entry_hash,
            signature,
            severity: draft.severity,
            retain_until: now + chrono::Duration::days(365 * i64::from(self.config.retention_years)),
            recorded_at: now,
        })
    }

    async fn previous_hash(&self, organization_id: &str, last_sequence: u64) -> Result<[u8; 32]> {
        if last_sequence == 0 {
            return Ok([0u8; 32]);
        }
        let tail = self
            .storage
            .get_audit_entries_range(organization_id, last_sequence, last_sequence)
            .await?;
        Ok(tail.first().map(|e| e.entry_hash).unwrap_or([0u8; 32]))
    }

    /// Verifies every entry in `organization_id`'s chain: hash-chain
    /// continuity, recomputed `entry_hash`, and signature validity.
    /// Continues past the first broken entry so a single corruption doesn't
    /// hide later ones.
    pub async fn verify_integrity(&self, organization_id: &str) -> Result<AuditVerificationReport> {
        let latest = self.storage.latest_audit_sequence(organization_id).await?;
        if latest == 0 {
            return Ok(AuditVerificationReport { entries_checked: 0, valid: true, errors: vec![] });
        }
        let entries = self.storage.get_audit_entries_range(organization_id, 1, latest).await?;
        let mut errors = Vec::new();
        let mut expected_previous = [0u8; 32];
        for entry in &entries {
            if entry.previous_hash != expected_previous {
                errors.push(AuditVerificationError {
                    sequence_number: entry.sequence_number,
                    reason: "previous_hash does not match prior entry".to_string(),
                });
            }
            let hash_input = AuditEntryHashInput {
                id: entry.id,
                action: &entry.action,
                payload: &entry.payload,
                previous_hash: entry.previous_hash,
                sequence_number: entry.sequence_number,
            };
            let recomputed = match Self::hash_bytes(&hash_input).and_then(|b| sha256(b).map_err(MandateError::from)) {
                Ok(h) => h,
                Err(_) => {
                    errors.push(AuditVerificationError {
                        sequence_number: entry.sequence_number,
                        reason: "entry hash could not be recomputed".to_string(),
                    });
                    expected_previous = entry.entry_hash;
                    continue;
                }
            };
            if recomputed != entry.entry_hash {
                errors.push(AuditVerificationError {
                    sequence_number: entry.sequence_number,
                    reason: "entry_hash does not match recomputed digest".to_string(),
                });
            }
            if self
                .key_store
                .verify(&self.signing_key_id, &entry.entry_hash, &entry.signature)
                .await
                .is_err()
            {
                errors.push(AuditVerificationError {
                    sequence_number: entry.sequence_number,
                    reason: "signature verification failed".to_string(),
                });
            }
            expected_previous = entry.entry_hash;
        }
        Ok(AuditVerificationReport { entries_checked: entries.len() as u64, valid: errors.is_empty(), errors })
    }
}

#[async_trait]
impl AuditSink for Ledger {
    /// Assigns the next sequence number and chains to the prior entry,
    /// retrying on a losing CAS against `Storage::append_audit_entry` the
    /// same way a concurrent writer to the same organization would.
    async fn append(&self, draft: AuditDraft) -> Result<AuditEntry> {
        for _ in 0..MAX_CAS_RETRIES {
            let last_sequence = self.storage.latest_audit_sequence(&draft.organization_id).await?;
            let next_sequence = last_sequence + 1;
            let previous_hash = self.previous_hash(&draft.organization_id, last_sequence).await?;
            let entry = self.build_entry(&draft, next_sequence, previous_hash).await?;
            match self.storage.append_audit_entry(&entry, next_sequence).await {
                Ok(()) => return Ok(entry),
                Err(MandateError::State(StateError::VersionConflict(_))) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(MandateError::State(StateError::VersionConflict(format!(
            "audit append for {} did not converge after {MAX_CAS_RETRIES} attempts",
            draft.organization_id
        ))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mandate_crypto::key_store::LocalKeyStore;
    use mandate_types::audit::{ActorDescriptor, MerkleRoot, Severity};
    use mandate_types::ids::{AgentId, Did, PolicyId, TokenId};
    use std::collections::BTreeMap;
    use std::sync::Mutex as StdMutex;

    struct FixedClock(chrono::DateTime<chrono::Utc>);
    impl Clock for FixedClock {
        fn now(&self) -> chrono::DateTime<chrono::Utc> {
            self.0
        }
        fn monotonic_now(&self) -> std::time::Instant {
            std::time::Instant::now()
        }
    }

    #[derive(Default)]
    struct MemStorage {
        entries: StdMutex<BTreeMap<u64, AuditEntry>>,
        roots: StdMutex<Vec<MerkleRoot>>,
    }

    #[async_trait]
    impl Storage for MemStorage {
        async fn get_agent_by_id(&self, _id: &AgentId) -> Result<Option<mandate_types::agent::Agent>> { Ok(None) }
        async fn get_agent_by_did(&self, _did: &Did) -> Result<Option<mandate_types::agent::Agent>> { Ok(None) }
        async fn put_agent(&self, _agent: &mandate_types::agent::Agent) -> Result<()> { Ok(()) }
        async fn list_agents_for_org(&self, _organization_id: &str) -> Result<Vec<mandate_types::agent::Agent>> { Ok(vec![]) }
        async fn get_policy(&self, _id: &PolicyId) -> Result<Option<mandate_types::policy::Policy>> { Ok(None) }
        async fn put_policy(&self, _policy: &mandate_types::policy::Policy) -> Result<()> { Ok(()) }
        async fn list_policies_for_scope(&self, _scope: &mandate_types::policy::PolicyScope) -> Result<Vec<mandate_types::policy::Policy>> { Ok(vec![]) }
        async fn get_delegation_token(&self, _id: &TokenId) -> Result<Option<mandate_types::delegation::DelegationToken>> { Ok(None) }
        async fn put_delegation_token(&self, _token: &mandate_types::delegation::DelegationToken) -> Result<()> { Ok(()) }
        async fn list_child_tokens(&self, _parent_id: &TokenId) -> Result<Vec<mandate_types::delegation::DelegationToken>> { Ok(vec![]) }
        async fn list_active_tokens_for_agent(&self, _agent_did: &Did) -> Result<Vec<mandate_types::delegation::DelegationToken>> { Ok(vec![]) }
        async fn list_tokens_issued_by(&self, _issuer_did: &Did) -> Result<Vec<mandate_types::delegation::DelegationToken>> { Ok(vec![]) }
        async fn put_transaction(&self, _record: &mandate_types::transaction::TransactionRecord) -> Result<()> { Ok(()) }
        async fn get_transaction(&self, _id: &uuid::Uuid) -> Result<Option<mandate_types::transaction::TransactionRecord>> { Ok(None) }
        async fn update_transaction_status(&self, _id: &uuid::Uuid, _status: mandate_types::transaction::TransactionStatus) -> Result<()> { Ok(()) }
        async fn list_recent_transactions(&self, _agent_did: &Did, _since: chrono::DateTime<chrono::Utc>) -> Result<Vec<mandate_types::transaction::TransactionRecord>> { Ok(vec![]) }
        async fn append_audit_entry(&self, entry: &AuditEntry, expected_next_sequence: u64) -> Result<()> {
            let mut entries = self.entries.lock().unwrap();
            let current_max = entries.keys().next_back().copied().unwrap_or(0);
            if expected_next_sequence != current_max + 1 {
                return Err(MandateError::State(StateError::VersionConflict("sequence".into())));
            }
            entries.insert(entry.sequence_number, entry.clone());
            Ok(())
        }
        async fn latest_audit_sequence(&self, _organization_id: &str) -> Result<u64> {
            Ok(self.entries.lock().unwrap().keys().next_back().copied().unwrap_or(0))
        }
        async fn get_audit_entries_range(&self, _organization_id: &str, start_sequence: u64, end_sequence: u64) -> Result<Vec<AuditEntry>> {
            Ok(self
                .entries
                .lock()
                .unwrap()
                .range(start_sequence..=end_sequence)
                .map(|(_, v)| v.clone())
                .collect())
        }
        async fn put_merkle_root(&self, root: &MerkleRoot) -> Result<()> {
            self.roots.lock().unwrap().push(root.clone());
            Ok(())
        }
        async fn list_merkle_roots(&self, _organization_id: &str) -> Result<Vec<MerkleRoot>> {
            Ok(self.roots.lock().unwrap().clone())
        }
        async fn purge_audit_entries_before(&self, _organization_id: &str, _retain_until: chrono::DateTime<chrono::Utc>) -> Result<u64> { Ok(0) }
        async fn get_rate_limit_window(&self, _agent_did: &Did) -> Result<Option<mandate_types::ratelimit::RateLimitWindow>> { Ok(None) }
        async fn put_rate_limit_window(&self, _agent_did: &Did, _expected: Option<mandate_types::ratelimit::RateLimitWindow>, _next: mandate_types::ratelimit::RateLimitWindow) -> Result<()> { Ok(()) }
        async fn get_nonce(&self, _nonce: &str) -> Result<Option<mandate_types::ratelimit::NonceRecord>> { Ok(None) }
        async fn put_nonce_if_absent(&self, _record: &mandate_types::ratelimit::NonceRecord) -> Result<bool> { Ok(true) }
        async fn purge_expired_nonces(&self, _now: chrono::DateTime<chrono::Utc>) -> Result<u64> { Ok(0) }
    }

    async fn harness() -> (Ledger, Arc<MemStorage>) {
        let storage = Arc::new(MemStorage::default());
        let key_store = Arc::new(LocalKeyStore::new("test-secret", "test-salt"));
        let (key_id, _public) = key_store.generate_keypair().await.unwrap();
        let clock = Arc::new(FixedClock(chrono::Utc::now()));
        let ledger = Ledger::new(storage.clone(), key_store, clock, AuditConfig::default(), key_id);
        (ledger, storage)
    }

    fn draft(action: &str) -> AuditDraft {
        AuditDraft {
            organization_id: "org-1".to_string(),
            actor: ActorDescriptor { did: None, kind: "system".to_string(), label: "test".to_string() },
            action: action.to_string(),
            payload: serde_json::json!({"k": "v"}),
            severity: Severity::Info,
        }
    }

    #[tokio::test]
    async fn append_chains_sequential_entries() {
        let (ledger, _storage) = harness().await;
        let first = ledger.append(draft("agent.created")).await.unwrap();
        let second = ledger.append(draft("agent.updated")).await.unwrap();
        assert_eq!(first.sequence_number, 1);
        assert_eq!(second.sequence_number, 2);
        assert_eq!(second.previous_hash, first.entry_hash);
        assert_eq!(first.previous_hash, [0u8; 32]);
    }

    #[tokio::test]
    async fn verify_integrity_passes_on_untampered_chain() {
        let (ledger, _storage) = harness().await;
        for i in 0..5 {
            ledger.append(draft(&format!("action.{i}"))).await.unwrap();
        }
        let report = ledger.verify_integrity("org-1").await.unwrap();
        assert!(report.valid);
        assert_eq!(report.entries_checked, 5);
        assert!(report.errors.is_empty());
    }

    #[tokio::test]
    async fn verify_integrity_detects_tampered_payload() {
        let (ledger, storage) = harness().await;
        ledger.append(draft("action.a")).await.unwrap();
        ledger.append(draft("action.b")).await.unwrap();
        {
            let mut entries = storage.entries.lock().unwrap();
            if let Some(entry) = entries.get_mut(&1) {
                entry.payload = serde_json::json!({"tampered": true});
            }
        }
        let report = ledger.verify_integrity("org-1").await.unwrap();
        assert!(!report.valid);
        assert!(report.errors.iter().any(|e| e.sequence_number == 1));
    }
}
