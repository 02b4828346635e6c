// Path: crates/mandate-audit/src/retention.rs

//! Retention sweeping (§4.7). `Storage::purge_audit_entries_before` is
//! documented to only ever delete entries already covered by an anchored
//! Merkle root, so the sweeper itself just computes the cutoff and asks.

use std::sync::Arc;

use mandate_api::capabilities::{Clock, Storage};
use mandate_types::config::AuditConfig;
use mandate_types::error::Result;

pub struct RetentionSweeper {
    storage: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
    config: AuditConfig,
}

impl RetentionSweeper {
    pub fn new(storage: Arc<dyn Storage>, clock: Arc<dyn Clock>, config: AuditConfig) -> Self {
        Self { storage, clock, config }
    }

    /// Purges entries older than the configured retention window for
    /// `organization_id`, returning the number of entries removed.
    pub async fn sweep(&self, organization_id: &str) -> Result<u64> {
        let retain_until = self.clock.now() - chrono::Duration::days(365 * i64::from(self.config.retention_years));
        self.storage.purge_audit_entries_before(organization_id, retain_until).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mandate_types::ids::{AgentId, Did, PolicyId, TokenId};
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
    struct RecordingStorage {
        last_retain_until: StdMutex<Option<chrono::DateTime<chrono::Utc>>>,
    }

    #[async_trait]
    impl Storage for RecordingStorage {
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
        async fn append_audit_entry(&self, _entry: &mandate_types::audit::AuditEntry, _expected_next_sequence: u64) -> Result<()> { Ok(()) }
        async fn latest_audit_sequence(&self, _organization_id: &str) -> Result<u64> { Ok(0) }
        async fn get_audit_entries_range(&self, _organization_id: &str, _start_sequence: u64, _end_sequence: u64) -> Result<Vec<mandate_types::audit::AuditEntry>> { Ok(vec![]) }
        async fn put_merkle_root(&self, _root: &mandate_types::audit::MerkleRoot) -> Result<()> { Ok(()) }
        async fn list_merkle_roots(&self, _organization_id: &str) -> Result<Vec<mandate_types::audit::MerkleRoot>> { Ok(vec![]) }
        async fn purge_audit_entries_before(&self, _organization_id: &str, retain_until: chrono::DateTime<chrono::Utc>) -> Result<u64> {
            *self.last_retain_until.lock().unwrap() = Some(retain_until);
            Ok(3)
        }
        async fn get_rate_limit_window(&self, _agent_did: &Did) -> Result<Option<mandate_types::ratelimit::RateLimitWindow>> { Ok(None) }
        async fn put_rate_limit_window(&self, _agent_did: &Did, _expected: Option<mandate_types::ratelimit::RateLimitWindow>, _next: mandate_types::ratelimit::RateLimitWindow) -> Result<()> { Ok(()) }
        async fn get_nonce(&self, _nonce: &str) -> Result<Option<mandate_types::ratelimit::NonceRecord>> { Ok(None) }
        async fn put_nonce_if_absent(&self, _record: &mandate_types::ratelimit::NonceRecord) -> Result<bool> { Ok(true) }
        async fn purge_expired_nonces(&self, _now: chrono::DateTime<chrono::Utc>) -> Result<u64> { Ok(0) }
    }

    #[tokio::test]
    async fn sweep_computes_cutoff_from_retention_years() {
        let now = chrono::Utc::now();
        let storage = Arc::new(RecordingStorage::default());
        let sweeper = RetentionSweeper::new(
            storage.clone(),
            Arc::new(FixedClock(now)),
            AuditConfig { retention_years: 7, merkle_interval_seconds: 3600 },
        );
        let purged = sweeper.sweep("org-1").await.unwrap();
        assert_eq!(purged, 3);
        let recorded = storage.last_retain_until.lock().unwrap().unwrap();
        assert_eq!(recorded, now - chrono::Duration::days(365 * 7));
    }
}
