// Path: crates/mandate-issuer/src/issuer.rs

//! `MandateIssuer`: mints and verifies signed mandate tokens (§4.6).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mandate_api::capabilities::{Clock, KeyStore, Rng, Storage};
use mandate_types::config::MandateConfig;
use mandate_types::constraints::Constraints;
use mandate_types::error::{ConstraintError, MandateError, Result, SecurityError, StateError, ValidationError};
use mandate_types::ids::{Did, TokenId};
use mandate_types::mandate::{MandateHeader, MandateToken, MandateVerifyError, SignedMandate, CURRENT_MANDATE_SCHEMA, MANDATE_SCHEMA_V1, MANDATE_SCHEMA_V2};
use mandate_types::ratelimit::NonceRecord;

use crate::codec;
use crate::migrate::migrate_v1;

/// Consulted, if configured, as verification step 5 ("if an introspection
/// store is configured"). Kept local to this crate rather than added to
/// `mandate-api::capabilities` since it is optional and specific to
/// mandate lifecycle, unlike the Storage/Cache/etc. contracts every
/// component shares.
#[async_trait]
pub trait MandateIntrospector: Send + Sync {
    async fn is_revoked(&self, token_id: &TokenId) -> Result<bool>;
}

#[derive(Debug, Clone)]
pub struct IssueRequest {
    pub issuer: Did,
    pub subject: Did,
    pub audience: String,
    pub organization_id: String,
    pub permissions: Vec<String>,
    pub constraints: Constraints,
    pub delegation_chain_ids: Vec<TokenId>,
    pub ttl_seconds: Option<i64>,
    /// Hard expiry ceiling; used by [`MandateIssuer::delegate`] to clamp a
    /// sub-mandate's `exp` to its parent's.
    pub expires_at_override: Option<DateTime<Utc>>,
    pub custom_claims: serde_json::Map<String, serde_json::Value>,
}

pub struct DelegateRequest {
    pub subject: Did,
    pub audience: String,
    pub permissions: Vec<String>,
    pub constraints: Constraints,
    pub ttl_seconds: Option<i64>,
}

pub struct MandateIssuer {
    storage: Arc<dyn Storage>,
    key_store: Arc<dyn KeyStore>,
    clock: Arc<dyn Clock>,
    rng: Arc<dyn Rng>,
    introspector: Option<Arc<dyn MandateIntrospector>>,
    config: MandateConfig,
    signing_key_id: String,
}

impl MandateIssuer {
    pub fn new(
        storage: Arc<dyn Storage>,
        key_store: Arc<dyn KeyStore>,
        clock: Arc<dyn Clock>,
        rng: Arc<dyn Rng>,
        config: MandateConfig,
        signing_key_id: String,
    ) -> Self {
        Self { storage, key_store, clock, rng, introspector: None, config, signing_key_id }
    }

    pub fn with_introspector(mut self, introspector: Arc<dyn MandateIntrospector>) -> Self {
        self.introspector = Some(introspector);
        self
    }

    fn fresh_nonce(&self) -> String {
        let mut bytes = [0u8; 16];
        self.rng.fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    /// Mints and signs a new mandate token, registering its nonce so it
    /// cannot later be replayed as if it had been received over the wire.
    pub async fn issue(&self, req: IssueRequest) -> Result<SignedMandate> {
        let now = self.clock.now();
        let requested_ttl = req.ttl_seconds.unwrap_or(self.config.default_ttl_seconds);
        let ttl = requested_ttl.min(self.config.max_ttl_seconds).max(0);
        let mut expires_at = now + chrono::Duration::seconds(ttl);
        if let Some(cap) = req.expires_at_override {
            if cap < expires_at {
                expires_at = cap;
            }
        }

        let payload = MandateToken {
            version: CURRENT_MANDATE_SCHEMA,
            token_id: TokenId::new(),
            issuer: req.issuer,
            subject: req.subject,
            audience: req.audience,
            organization_id: req.organization_id,
            issued_at: now,
            not_before: None,
            expires_at,
            nonce: self.fresh_nonce(),
            delegation_chain_ids: req.delegation_chain_ids,
            permissions: req.permissions,
            constraints: req.constraints,
            custom_claims: req.custom_claims,
            org: None,
        };

        self.sign(payload).await
    }

    /// Mints a sub-mandate under `parent`: permissions must be a subset of
    /// the parent's, constraints merge per [`Constraints::merge`], and the
    /// new token's `exp` is clamped to the parent's.
    pub async fn delegate(&self, parent: &MandateToken, req: DelegateRequest) -> Result<SignedMandate> {
        if !req.permissions.iter().all(|p| parent.permissions.contains(p)) {
            return Err(ConstraintError::ChainBroken(
                "sub-mandate requests a permission outside the parent's grant".to_string(),
            )
            .into());
        }
        let merged_constraints = Constraints::merge(&parent.constraints, &req.constraints);
        let mut chain_ids = parent.delegation_chain_ids.clone();
        chain_ids.push(parent.token_id);

        self.issue(IssueRequest {
            issuer: parent.subject.clone(),
            subject: req.subject,
            audience: req.audience,
            organization_id: parent.organization_id.clone(),
            permissions: req.permissions,
            constraints: merged_constraints,
            delegation_chain_ids: chain_ids,
            ttl_seconds: req.ttl_seconds,
            expires_at_override: Some(parent.expires_at),
            custom_claims: Default::default(),
        })
        .await
    }

    /// Re-signs a v1 payload under the current schema (§4.6 versioning).
    pub async fn reissue_legacy(&self, legacy: MandateToken) -> Result<SignedMandate> {
        let migrated = migrate_v1(legacy, self.fresh_nonce());
        self.sign(migrated).await
    }

    async fn sign(&self, payload: MandateToken) -> Result<SignedMandate> {
        let header = MandateHeader::new(self.signing_key_id.clone());
        let header_segment = codec::encode_segment(&header)?;
        let payload_segment = codec::encode_segment(&payload)?;
        let signing_bytes = codec::signing_bytes(&header_segment, &payload_segment);
        let signature = self.key_store.sign(&self.signing_key_id, &signing_bytes).await?;
        Ok(SignedMandate { header, payload, signature })
    }

    /// Verifies a wire-encoded mandate per the five steps in §4.6,
    /// returning the validated payload. Inserting the nonce is itself part
    /// of verification: a token that has never been presented before is
    /// accepted and its nonce is immediately consumed, closing the window
    /// for a subsequent replay.
    pub async fn verify(&self, wire: &str) -> Result<MandateToken> {
        self.verify_detailed(wire).await.map_err(map_verify_error)
    }

    async fn verify_detailed(&self, wire: &str) -> std::result::Result<MandateToken, VerifyFailure> {
        let decoded = codec::decode(wire).map_err(VerifyFailure::Verify)?;
        let SignedMandate { header, payload, signature } = decoded.signed;

        if payload.version != MANDATE_SCHEMA_V1 && payload.version != MANDATE_SCHEMA_V2 {
            return Err(VerifyFailure::Verify(MandateVerifyError::UnsupportedVersion(payload.version)));
        }
        if payload.version == MANDATE_SCHEMA_V1 && !self.config.accept_legacy {
            return Err(VerifyFailure::Verify(MandateVerifyError::LegacyRejected));
        }

        let signing_bytes = codec::signing_bytes(&decoded.header_segment, &decoded.payload_segment);
        self.key_store
            .verify(&header.kid, &signing_bytes, &signature)
            .await
            .map_err(|_| VerifyFailure::Verify(MandateVerifyError::InvalidSignature))?;

        let now = self.clock.now();
        if payload.expires_at <= now {
            return Err(VerifyFailure::Verify(MandateVerifyError::Expired));
        }
        if let Some(nbf) = payload.not_before {
            if nbf > now {
                return Err(VerifyFailure::Verify(MandateVerifyError::NotYetValid));
            }
        }

        let inserted = self
            .storage
            .put_nonce_if_absent(&NonceRecord { nonce: payload.nonce.clone(), expires_at: payload.expires_at })
            .await
            .map_err(VerifyFailure::Mandate)?;
        if !inserted {
            return Err(VerifyFailure::Verify(MandateVerifyError::NonceReplay));
        }

        if let Some(introspector) = &self.introspector {
            let revoked = introspector.is_revoked(&payload.token_id).await.map_err(VerifyFailure::Mandate)?;
            if revoked {
                return Err(VerifyFailure::Verify(MandateVerifyError::Revoked));
            }
        }

        Ok(payload)
    }
}

enum VerifyFailure {
    Verify(MandateVerifyError),
    Mandate(MandateError),
}

fn map_verify_error(failure: VerifyFailure) -> MandateError {
    match failure {
        VerifyFailure::Mandate(e) => e,
        VerifyFailure::Verify(e) => match e {
            MandateVerifyError::MalformedStructure => {
                MandateError::Validation(ValidationError::InvalidTokenFormat("malformed mandate structure".to_string()))
            }
            MandateVerifyError::InvalidSignature => MandateError::Security(SecurityError::InvalidSignature),
            MandateVerifyError::Expired => MandateError::State(StateError::TokenExpired("mandate".to_string())),
            MandateVerifyError::NotYetValid => {
                MandateError::Validation(ValidationError::InvalidTokenFormat("mandate not yet valid".to_string()))
            }
            MandateVerifyError::NonceReplay => MandateError::Security(SecurityError::NonceReplay),
            MandateVerifyError::Revoked => MandateError::State(StateError::TokenRevoked("mandate".to_string())),
            MandateVerifyError::UnsupportedVersion(v) => {
                MandateError::Validation(ValidationError::InvalidTokenFormat(format!("unsupported mandate schema version {v}")))
            }
            MandateVerifyError::LegacyRejected => {
                MandateError::Validation(ValidationError::InvalidTokenFormat("legacy mandate rejected".to_string()))
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mandate_crypto::key_store::LocalKeyStore;
    use mandate_types::ids::{AgentId, PolicyId};
    use std::sync::Mutex as StdMutex;

    struct FixedClock(std::sync::Mutex<DateTime<Utc>>);
    impl FixedClock {
        fn new(now: DateTime<Utc>) -> Self {
            Self(std::sync::Mutex::new(now))
        }
        fn advance(&self, duration: chrono::Duration) {
            let mut guard = self.0.lock().unwrap();
            *guard += duration;
        }
    }
    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
        fn monotonic_now(&self) -> std::time::Instant {
            std::time::Instant::now()
        }
    }

    struct CountingRng(StdMutex<u8>);
    impl Rng for CountingRng {
        fn fill_bytes(&self, buf: &mut [u8]) {
            let mut counter = self.0.lock().unwrap();
            for b in buf.iter_mut() {
                *b = *counter;
                *counter = counter.wrapping_add(1);
            }
        }
    }

    #[derive(Default)]
    struct MemStorage {
        nonces: StdMutex<std::collections::HashSet<String>>,
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
        async fn list_recent_transactions(&self, _agent_did: &Did, _since: DateTime<Utc>) -> Result<Vec<mandate_types::transaction::TransactionRecord>> { Ok(vec![]) }
        async fn append_audit_entry(&self, _entry: &mandate_types::audit::AuditEntry, _expected_next_sequence: u64) -> Result<()> { Ok(()) }
        async fn latest_audit_sequence(&self, _organization_id: &str) -> Result<u64> { Ok(0) }
        async fn get_audit_entries_range(&self, _organization_id: &str, _start_sequence: u64, _end_sequence: u64) -> Result<Vec<mandate_types::audit::AuditEntry>> { Ok(vec![]) }
        async fn put_merkle_root(&self, _root: &mandate_types::audit::MerkleRoot) -> Result<()> { Ok(()) }
        async fn list_merkle_roots(&self, _organization_id: &str) -> Result<Vec<mandate_types::audit::MerkleRoot>> { Ok(vec![]) }
        async fn purge_audit_entries_before(&self, _organization_id: &str, _retain_until: DateTime<Utc>) -> Result<u64> { Ok(0) }
        async fn get_rate_limit_window(&self, _agent_did: &Did) -> Result<Option<mandate_types::ratelimit::RateLimitWindow>> { Ok(None) }
        async fn put_rate_limit_window(&self, _agent_did: &Did, _expected: Option<mandate_types::ratelimit::RateLimitWindow>, _next: mandate_types::ratelimit::RateLimitWindow) -> Result<()> { Ok(()) }
        async fn get_nonce(&self, nonce: &str) -> Result<Option<NonceRecord>> {
            if self.nonces.lock().unwrap().contains(nonce) {
                Ok(Some(NonceRecord { nonce: nonce.to_string(), expires_at: Utc::now() }))
            } else {
                Ok(None)
            }
        }
        async fn put_nonce_if_absent(&self, record: &NonceRecord) -> Result<bool> {
            Ok(self.nonces.lock().unwrap().insert(record.nonce.clone()))
        }
        async fn purge_expired_nonces(&self, _now: DateTime<Utc>) -> Result<u64> { Ok(0) }
    }

    fn did() -> Did {
        Did::parse("did:mand:3yQ3P8V7s4RexPuZ7cfjJb").unwrap()
    }

    async fn harness() -> (MandateIssuer, Arc<FixedClock>) {
        let key_store = Arc::new(LocalKeyStore::new("issuer-secret", "issuer-salt"));
        let (key_id, _public) = key_store.generate_keypair().await.unwrap();
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let issuer = MandateIssuer::new(
            Arc::new(MemStorage::default()),
            key_store,
            clock.clone(),
            Arc::new(CountingRng(StdMutex::new(0))),
            MandateConfig::default(),
            key_id,
        );
        (issuer, clock)
    }

    fn issue_request() -> IssueRequest {
        IssueRequest {
            issuer: did(),
            subject: did(),
            audience: "checkout-service".to_string(),
            organization_id: "org-1".to_string(),
            permissions: vec!["transact".to_string()],
            constraints: Constraints::unconstrained(),
            delegation_chain_ids: vec![],
            ttl_seconds: None,
            expires_at_override: None,
            custom_claims: Default::default(),
        }
    }

    #[tokio::test]
    async fn issue_then_verify_round_trips() {
        let (issuer, _clock) = harness().await;
        let signed = issuer.issue(issue_request()).await.unwrap();
        let wire = codec::encode(&signed).unwrap();
        let verified = issuer.verify(&wire).await.unwrap();
        assert_eq!(verified.token_id, signed.payload.token_id);
    }

    #[tokio::test]
    async fn verify_rejects_replayed_nonce() {
        let (issuer, _clock) = harness().await;
        let signed = issuer.issue(issue_request()).await.unwrap();
        let wire = codec::encode(&signed).unwrap();
        issuer.verify(&wire).await.unwrap();
        let replay = issuer.verify(&wire).await;
        assert!(matches!(replay, Err(MandateError::Security(SecurityError::NonceReplay))));
    }

    #[tokio::test]
    async fn verify_rejects_expired_token() {
        let (issuer, clock) = harness().await;
        let mut req = issue_request();
        req.ttl_seconds = Some(60);
        let signed = issuer.issue(req).await.unwrap();
        let wire = codec::encode(&signed).unwrap();
        clock.advance(chrono::Duration::seconds(120));
        let result = issuer.verify(&wire).await;
        assert!(matches!(result, Err(MandateError::State(StateError::TokenExpired(_)))));
    }

    #[tokio::test]
    async fn verify_rejects_tampered_signature() {
        let (issuer, _clock) = harness().await;
        let signed = issuer.issue(issue_request()).await.unwrap();
        let mut wire = codec::encode(&signed).unwrap();
        wire.push('x');
        let result = issuer.verify(&wire).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn delegate_rejects_permission_escalation() {
        let (issuer, _clock) = harness().await;
        let signed = issuer.issue(issue_request()).await.unwrap();
        let result = issuer
            .delegate(
                &signed.payload,
                DelegateRequest {
                    subject: did(),
                    audience: "checkout-service".to_string(),
                    permissions: vec!["transact".to_string(), "refund".to_string()],
                    constraints: Constraints::default(),
                    ttl_seconds: None,
                },
            )
            .await;
        assert!(matches!(result, Err(MandateError::Constraint(ConstraintError::ChainBroken(_)))));
    }

    #[tokio::test]
    async fn delegate_clamps_expiry_to_parent() {
        let (issuer, _clock) = harness().await;
        let mut req = issue_request();
        req.ttl_seconds = Some(60);
        let parent = issuer.issue(req).await.unwrap();
        let child = issuer
            .delegate(
                &parent.payload,
                DelegateRequest {
                    subject: did(),
                    audience: "checkout-service".to_string(),
                    permissions: vec!["transact".to_string()],
                    constraints: Constraints::default(),
                    ttl_seconds: Some(3_600),
                },
            )
            .await
            .unwrap();
        assert_eq!(child.payload.expires_at, parent.payload.expires_at);
    }
}
