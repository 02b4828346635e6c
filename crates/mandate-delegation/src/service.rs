// Path: crates/mandate-delegation/src/service.rs

//! The `DelegationService` (§4.3): minting, chain verification, and
//! revocation of delegation tokens.

use std::sync::Arc;

use mandate_api::capabilities::{AuditDraft, AuditSink, Clock, EventBus, KeyStore, Storage};
use mandate_crypto::algorithms::hash::sha256;
use mandate_identity::IdentityRegistry;
use mandate_types::audit::{ActorDescriptor, Severity};
use mandate_types::config::DelegationConfig;
use mandate_types::constraints::Constraints;
use mandate_types::delegation::{
    ChainVerification, DelegationPayload, DelegationToken, RevocationMeta,
};
use mandate_types::error::{ConstraintError, MandateError, NotFoundError, Result, StateError, ValidationError};
use mandate_types::ids::{Did, TokenId};

pub struct DelegationService {
    storage: Arc<dyn Storage>,
    key_store: Arc<dyn KeyStore>,
    identity: Arc<IdentityRegistry>,
    audit: Arc<dyn AuditSink>,
    events: Arc<dyn EventBus>,
    clock: Arc<dyn Clock>,
    config: DelegationConfig,
}

impl DelegationService {
    pub fn new(
        storage: Arc<dyn Storage>,
        key_store: Arc<dyn KeyStore>,
        identity: Arc<IdentityRegistry>,
        audit: Arc<dyn AuditSink>,
        events: Arc<dyn EventBus>,
        clock: Arc<dyn Clock>,
        config: DelegationConfig,
    ) -> Self {
        Self { storage, key_store, identity, audit, events, clock, config }
    }

    async fn audit(&self, organization_id: &str, actor: &str, action: &str, payload: serde_json::Value, severity: Severity) -> Result<()> {
        self.audit
            .append(AuditDraft {
                organization_id: organization_id.to_string(),
                actor: ActorDescriptor { did: None, kind: "agent".to_string(), label: actor.to_string() },
                action: action.to_string(),
                payload,
                severity,
            })
            .await?;
        Ok(())
    }

    async fn publish(&self, channel: &str, payload: serde_json::Value) {
        if let Err(err) = self.events.publish(channel, payload).await {
            tracing::warn!(error = %err, channel, "event publish failed");
        }
    }

    fn token_hash(payload_bytes: &[u8], signature: &[u8]) -> Result<[u8; 32]> {
        let mut buf = Vec::with_capacity(payload_bytes.len() + signature.len());
        buf.extend_from_slice(payload_bytes);
        buf.extend_from_slice(signature);
        sha256(&buf)
    }

    /// `IssueDelegation(issuer, recipient, constraints, parentTokenId?)`.
    ///
    /// When `parent_token_id` is present, rejects any requested constraint
    /// that loosens the parent's (§4.3 "rejects any constraint that is a
    /// loosening"), clamps expiry to `min(requested, parent.exp)`, and sets
    /// the effective payload constraints to `Merge(parent, requested)`.
    /// Without a parent, the token is a root: depth 0, `chain_hash` all
    /// zeros, payload constraints are exactly what was requested.
    pub async fn issue_delegation(
        &self,
        issuer: &Did,
        recipient: &Did,
        requested_constraints: Constraints,
        parent_token_id: Option<TokenId>,
        requested_ttl_seconds: Option<i64>,
    ) -> Result<DelegationToken> {
        let issuer_agent = self.identity.lookup_by_did(issuer).await?;
        if !issuer_agent.is_active() {
            return Err(MandateError::State(StateError::AgentFrozen(issuer.to_string())));
        }
        // Existence check only; the recipient need not be ACTIVE to receive
        // a token (e.g. a PENDING_APPROVAL service agent being provisioned).
        self.identity.lookup_by_did(recipient).await?;

        let now = self.clock.now();
        let requested_ttl = requested_ttl_seconds.unwrap_or(self.config.default_ttl_seconds);
        let requested_expiry = now + chrono::Duration::seconds(requested_ttl);

        let (depth, chain_hash, organization_id, expires_at, effective_constraints) =
            match parent_token_id {
                Some(parent_id) => {
                    let parent = self
                        .storage
                        .get_delegation_token(&parent_id)
                        .await?
                        .ok_or_else(|| MandateError::NotFound(NotFoundError::TokenNotFound(parent_id.to_string())))?;
                    if !parent.is_active(now) {
                        return Err(MandateError::Constraint(ConstraintError::ChainBroken(
                            "parent token is not active".to_string(),
                        )));
                    }
                    if &parent.payload.recipient != issuer {
                        return Err(MandateError::Constraint(ConstraintError::ChainBroken(
                            "issuer does not match parent's recipient".to_string(),
                        )));
                    }
                    if !parent.payload.constraints.can_sub_delegate {
                        return Err(MandateError::Constraint(ConstraintError::ChainBroken(
                            "parent token forbids sub-delegation".to_string(),
                        )));
                    }
                    let depth = parent.payload.depth + 1;
                    if depth > self.config.max_depth {
                        return Err(MandateError::Constraint(ConstraintError::DepthExceeded {
                            depth,
                            max: self.config.max_depth,
                        }));
                    }
                    if !requested_constraints.is_refinement_of(&parent.payload.constraints) {
                        return Err(MandateError::Constraint(ConstraintError::ChainBroken(
                            "requested constraints loosen the parent token".to_string(),
                        )));
                    }
                    let merged = Constraints::merge(&parent.payload.constraints, &requested_constraints);
                    let expires_at = requested_expiry.min(parent.payload.expires_at);
                    (
                        depth,
                        parent.token_hash,
                        parent.payload.organization_id.clone(),
                        expires_at,
                        merged,
                    )
                }
                None => (
                    0,
                    [0u8; 32],
                    Some(issuer_agent.organization_id.clone()),
                    requested_expiry,
                    requested_constraints,
                ),
            };

        let payload = DelegationPayload {
            token_type: "DELEGATION",
            version: 1,
            organization_id,
            token_id: TokenId::new(),
            issuer: issuer.clone(),
            recipient: recipient.clone(),
            parent_token_id,
            depth,
            issued_at: now,
            expires_at,
            constraints: effective_constraints,
            chain_hash,
        };

        let signing_bytes = payload.to_signing_bytes()?;
        let signature = self.key_store.sign(&issuer_agent.sealed_key_ref, &signing_bytes).await?;
        let token_hash = Self::token_hash(&signing_bytes, &signature)?;
        let token = DelegationToken { payload, signature, token_hash, revoked: None };

        self.storage.put_delegation_token(&token).await?;

        self.audit(
            &issuer_agent.organization_id,
            issuer.as_str(),
            "delegation.issued",
            serde_json::json!({
                "tokenId": token.token_id().to_string(),
                "issuer": issuer.as_str(),
                "recipient": recipient.as_str(),
                "depth": token.payload.depth,
            }),
            Severity::Info,
        )
        .await?;
        self.publish(
            "agent.events",
            serde_json::json!({ "type": "delegation.issued", "tokenId": token.token_id().to_string() }),
        )
        .await;

        Ok(token)
    }

    /// `VerifyChain(tokens, finalRecipient)` (§4.3).
    pub async fn verify_chain(&self, tokens: &[DelegationToken], final_recipient: &Did) -> Result<ChainVerification> {
        if tokens.is_empty() {
            return Err(MandateError::Validation(ValidationError::InvalidTokenFormat(
                "delegation chain is empty".to_string(),
            )));
        }
        if tokens.len() as u32 > self.config.max_depth {
            return Err(MandateError::Constraint(ConstraintError::DepthExceeded {
                depth: tokens.len() as u32,
                max: self.config.max_depth,
            }));
        }

        let now = self.clock.now();
        let first = tokens.first().ok_or_else(|| {
            MandateError::Validation(ValidationError::InvalidTokenFormat("delegation chain is empty".to_string()))
        })?;

        for token in tokens {
            if token.is_revoked() {
                return Err(MandateError::State(StateError::TokenRevoked(token.token_id().to_string())));
            }
            if token.is_expired(now) || token.is_not_yet_valid(now) {
                return Err(MandateError::State(StateError::TokenExpired(token.token_id().to_string())));
            }
            let signer = self.identity.lookup_by_did(&token.payload.issuer).await?;
            let signing_bytes = token.payload.to_signing_bytes()?;
            self.key_store
                .verify_with_key(&signer.public_key, &signing_bytes, &token.signature)
                .await?;
        }
        for (prev, curr) in tokens.iter().zip(tokens.iter().skip(1)) {
            if curr.payload.issuer != prev.payload.recipient {
                return Err(MandateError::Constraint(ConstraintError::ChainBroken(
                    "a token's issuer does not match the preceding token's recipient".to_string(),
                )));
            }
        }

        let last = tokens.last().ok_or_else(|| {
            MandateError::Validation(ValidationError::InvalidTokenFormat("delegation chain is empty".to_string()))
        })?;
        if &last.payload.recipient != final_recipient {
            return Err(MandateError::Constraint(ConstraintError::ChainBroken(
                "final token does not name the requesting recipient".to_string(),
            )));
        }

        let mut effective = first.payload.constraints.clone();
        for token in tokens.iter().skip(1) {
            effective = Constraints::merge(&effective, &token.payload.constraints);
        }

        Ok(ChainVerification {
            root_issuer: first.payload.issuer.clone(),
            effective_constraints: effective,
            chain_token_ids: tokens.iter().map(DelegationToken::token_id).collect(),
        })
    }

    /// Revokes a single token by id. Idempotent: revoking an
    /// already-revoked token is a no-op that returns the stored record.
    /// Always cascades to every descendant (§4.3 "Revocation ... cascade").
    pub async fn revoke_token(&self, token_id: &TokenId, reason: impl Into<String>, actor: &Did) -> Result<DelegationToken> {
        let reason = reason.into();
        let token = self.revoke_one(token_id, &reason, actor).await?;
        self.revoke_descendants(token_id, &reason, actor).await?;
        Ok(token)
    }

    /// Revokes every active token issued by `issuer`, cascading through
    /// each one's descendants. Used by the identity-freeze cascade.
    pub async fn revoke_by_issuer(&self, issuer: &Did, reason: impl Into<String>, actor: &Did) -> Result<u64> {
        let reason = reason.into();
        let tokens = self.storage.list_tokens_issued_by(issuer).await?;
        let mut count = 0u64;
        for token in tokens {
            if token.is_revoked() {
                continue;
            }
            self.revoke_token(&token.payload.token_id, reason.clone(), actor).await?;
            count += 1;
        }
        Ok(count)
    }

    async fn revoke_one(&self, token_id: &TokenId, reason: &str, actor: &Did) -> Result<DelegationToken> {
        let mut token = self
            .storage
            .get_delegation_token(token_id)
            .await?
            .ok_or_else(|| MandateError::NotFound(NotFoundError::TokenNotFound(token_id.to_string())))?;
        if token.is_revoked() {
            return Ok(token);
        }
        token.revoked = Some(RevocationMeta { reason: reason.to_string(), at: self.clock.now() });
        self.storage.put_delegation_token(&token).await?;

        self.audit(
            token.payload.organization_id.as_deref().unwrap_or("unknown"),
            actor.as_str(),
            "delegation.revoked",
            serde_json::json!({ "tokenId": token_id.to_string(), "reason": reason }),
            Severity::Warn,
        )
        .await?;
        self.publish(
            "agent.events",
            serde_json::json!({ "type": "delegation.revoked", "tokenId": token_id.to_string() }),
        )
        .await;
        Ok(token)
    }

    fn revoke_descendants<'a>(
        &'a self,
        token_id: &'a TokenId,
        reason: &'a str,
        actor: &'a Did,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let children = self.storage.list_child_tokens(token_id).await?;
            for child in children {
                if !child.is_revoked() {
                    self.revoke_one(&child.payload.token_id, reason, actor).await?;
                }
                self.revoke_descendants(&child.payload.token_id, reason, actor).await?;
            }
            Ok(())
        })
    }
}
