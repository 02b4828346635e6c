// Path: crates/mandate-identity/src/registry.rs

//! The `IdentityRegistry` (§4.2).
//!
//! Freezing an agent is deliberately *not* the place that cascades into
//! delegation revocation: that would put `mandate-identity` ahead of
//! `mandate-delegation` in the dependency graph, which violates the
//! documented component order (crypto → identity → the delegation/policy/
//! rate-limit/audit tier). Instead `freeze` publishes `agent.frozen` on the
//! event bus and the orchestrator — the one crate allowed to see both
//! identity and delegation — is responsible for reacting to it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use mandate_api::capabilities::{AuditDraft, AuditSink, Clock, EventBus, KeyStore, Storage};
use mandate_types::agent::{Agent, AgentStatus, AgentType, FreezeMeta};
use mandate_types::audit::{ActorDescriptor, Severity};
use mandate_types::error::{MandateError, NotFoundError, Result};
use mandate_types::ids::{AgentId, Did};

struct CacheEntry {
    agent: Agent,
    cached_at: Instant,
}

/// Agent registration, resolution, freeze/unfreeze, and reputation tracking.
///
/// Resolved agents are cached with a short TTL and invalidated on every
/// mutation of that agent's record. This is an in-process cache, not the
/// distributed `Cache` capability — it stays out of the constructor.
pub struct IdentityRegistry {
    storage: Arc<dyn Storage>,
    key_store: Arc<dyn KeyStore>,
    audit: Arc<dyn AuditSink>,
    events: Arc<dyn EventBus>,
    clock: Arc<dyn Clock>,
    cache_ttl: Duration,
    by_did: dashmap::DashMap<Did, CacheEntry>,
    by_id: dashmap::DashMap<AgentId, Did>,
    /// Per-organization global-freeze flag, so the check the orchestrator
    /// runs at the top of every authorization (§4.8 step 1) is O(1) instead
    /// of a storage round trip.
    global_freeze: dashmap::DashMap<String, bool>,
}

impl IdentityRegistry {
    pub fn new(
        storage: Arc<dyn Storage>,
        key_store: Arc<dyn KeyStore>,
        audit: Arc<dyn AuditSink>,
        events: Arc<dyn EventBus>,
        clock: Arc<dyn Clock>,
        cache_ttl_seconds: u64,
    ) -> Self {
        Self {
            storage,
            key_store,
            audit,
            events,
            clock,
            cache_ttl: Duration::from_secs(cache_ttl_seconds),
            by_did: dashmap::DashMap::new(),
            by_id: dashmap::DashMap::new(),
            global_freeze: dashmap::DashMap::new(),
        }
    }

    fn cache_get(&self, did: &Did) -> Option<Agent> {
        let entry = self.by_did.get(did)?;
        if entry.cached_at.elapsed() > self.cache_ttl {
            return None;
        }
        Some(entry.agent.clone())
    }

    fn cache_put(&self, agent: Agent) {
        self.by_id.insert(agent.id, agent.did.clone());
        self.by_did.insert(
            agent.did.clone(),
            CacheEntry {
                agent,
                cached_at: self.clock.monotonic_now(),
            },
        );
    }

    fn cache_invalidate(&self, did: &Did) {
        self.by_did.remove(did);
    }

    async fn audit(
        &self,
        organization_id: &str,
        actor: &str,
        action: &str,
        payload: serde_json::Value,
        severity: Severity,
    ) -> Result<()> {
        self.audit
            .append(AuditDraft {
                organization_id: organization_id.to_string(),
                actor: ActorDescriptor {
                    did: None,
                    kind: "operator".to_string(),
                    label: actor.to_string(),
                },
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

    /// `RegisterAgent(name, ownerDID?, type)`. Generates a keypair via the
    /// `KeyStore`, derives the agent's DID from the public key, and persists
    /// a fresh `ACTIVE` record with reputation 100.
    pub async fn register_agent(
        &self,
        organization_id: impl Into<String>,
        display_name: impl Into<String>,
        owner_did: Option<Did>,
        agent_type: AgentType,
    ) -> Result<Agent> {
        let organization_id = organization_id.into();
        let (key_id, public_key) = self.key_store.generate_keypair().await?;
        let did = mandate_crypto::did::derive_did(&public_key)?;

        let agent = Agent::new(
            AgentId::new(),
            did,
            organization_id.clone(),
            display_name,
            public_key,
            key_id,
            owner_did,
            agent_type,
            self.clock.now(),
        );
        self.storage.put_agent(&agent).await?;
        self.cache_put(agent.clone());

        self.audit(
            &organization_id,
            "identity-registry",
            "agent.registered",
            serde_json::json!({ "did": agent.did.as_str(), "agentType": format!("{:?}", agent.agent_type) }),
            Severity::Info,
        )
        .await?;
        self.publish(
            "agent.events",
            serde_json::json!({ "type": "agent.created", "did": agent.did.as_str() }),
        )
        .await;

        tracing::info!(did = %agent.did, "agent registered");
        Ok(agent)
    }

    /// `Lookup(did)`. Serves from the TTL cache when possible.
    pub async fn lookup_by_did(&self, did: &Did) -> Result<Agent> {
        if let Some(agent) = self.cache_get(did) {
            return Ok(agent);
        }
        let agent = self
            .storage
            .get_agent_by_did(did)
            .await?
            .ok_or_else(|| MandateError::NotFound(NotFoundError::AgentNotFound(did.to_string())))?;
        self.cache_put(agent.clone());
        Ok(agent)
    }

    /// `Lookup(id)`. Goes through the same cache as [`Self::lookup_by_did`]
    /// via the secondary `id → did` index.
    pub async fn lookup_by_id(&self, id: AgentId) -> Result<Agent> {
        if let Some(did) = self.by_id.get(&id).map(|r| r.value().clone()) {
            if let Some(agent) = self.cache_get(&did) {
                return Ok(agent);
            }
        }
        let agent = self
            .storage
            .get_agent_by_id(&id)
            .await?
            .ok_or_else(|| MandateError::NotFound(NotFoundError::AgentNotFound(id.to_string())))?;
        self.cache_put(agent.clone());
        Ok(agent)
    }

    /// `Freeze(did, reason, actor)`. Idempotent: freezing an already-frozen
    /// agent leaves its `FreezeMeta` untouched and returns the current
    /// record without a second audit entry.
    pub async fn freeze(&self, did: &Did, reason: impl Into<String>, actor: impl Into<String>) -> Result<Agent> {
        let mut agent = self
            .storage
            .get_agent_by_did(did)
            .await?
            .ok_or_else(|| MandateError::NotFound(NotFoundError::AgentNotFound(did.to_string())))?;
        if matches!(agent.status, AgentStatus::Frozen) {
            return Ok(agent);
        }
        let reason = reason.into();
        let actor = actor.into();
        agent.status = AgentStatus::Frozen;
        agent.freeze = Some(FreezeMeta {
            reason: reason.clone(),
            actor: actor.clone(),
            at: self.clock.now(),
        });
        self.storage.put_agent(&agent).await?;
        self.cache_invalidate(did);

        self.audit(
            &agent.organization_id,
            &actor,
            "agent.frozen",
            serde_json::json!({ "did": did.as_str(), "reason": reason }),
            Severity::Warn,
        )
        .await?;
        self.publish(
            "agent.events",
            serde_json::json!({ "type": "agent.frozen", "did": did.as_str(), "reason": reason }),
        )
        .await;

        tracing::warn!(did = %did, reason = %reason, "agent frozen");
        Ok(agent)
    }

    /// `Unfreeze(did, actor)`. Idempotent counterpart to [`Self::freeze`].
    pub async fn unfreeze(&self, did: &Did, actor: impl Into<String>) -> Result<Agent> {
        let mut agent = self
            .storage
            .get_agent_by_did(did)
            .await?
            .ok_or_else(|| MandateError::NotFound(NotFoundError::AgentNotFound(did.to_string())))?;
        if !matches!(agent.status, AgentStatus::Frozen) {
            return Ok(agent);
        }
        let actor = actor.into();
        agent.status = AgentStatus::Active;
        agent.freeze = None;
        self.storage.put_agent(&agent).await?;
        self.cache_invalidate(did);

        self.audit(
            &agent.organization_id,
            &actor,
            "agent.unfrozen",
            serde_json::json!({ "did": did.as_str() }),
            Severity::Info,
        )
        .await?;
        self.publish(
            "agent.events",
            serde_json::json!({ "type": "agent.unfrozen", "did": did.as_str() }),
        )
        .await;

        tracing::info!(did = %did, "agent unfrozen");
        Ok(agent)
    }

    /// `SetGlobalFreeze(orgId, active, reason, actor)`. Sweeps every agent
    /// in the organization into `FROZEN` (or back out of it) and records
    /// the flag used by [`Self::is_globally_frozen`]. Returns the number of
    /// agents whose status actually changed.
    pub async fn set_global_freeze(
        &self,
        organization_id: &str,
        active: bool,
        reason: impl Into<String>,
        actor: impl Into<String>,
    ) -> Result<u64> {
        let reason = reason.into();
        let actor = actor.into();
        self.global_freeze.insert(organization_id.to_string(), active);

        let agents = self.storage.list_agents_for_org(organization_id).await?;
        let mut changed = 0u64;
        for mut agent in agents {
            let target = if active { AgentStatus::Frozen } else { AgentStatus::Active };
            if agent.status == target {
                continue;
            }
            // Revoked agents never re-enter ACTIVE via a freeze sweep.
            if !active && matches!(agent.status, AgentStatus::Revoked) {
                continue;
            }
            agent.status = target;
            agent.freeze = if active {
                Some(FreezeMeta {
                    reason: reason.clone(),
                    actor: actor.clone(),
                    at: self.clock.now(),
                })
            } else {
                None
            };
            self.storage.put_agent(&agent).await?;
            self.cache_invalidate(&agent.did);
            changed += 1;
        }

        self.audit(
            organization_id,
            &actor,
            "organization.global_freeze",
            serde_json::json!({ "active": active, "reason": reason, "agentsAffected": changed }),
            Severity::Critical,
        )
        .await?;
        self.publish(
            "global.events",
            serde_json::json!({
                "type": "organization.global_freeze",
                "organizationId": organization_id,
                "active": active,
            }),
        )
        .await;

        tracing::warn!(organization_id, active, changed, "organization global freeze swept");
        Ok(changed)
    }

    /// O(1) read of the flag set by [`Self::set_global_freeze`]; used at the
    /// top of the authorization pipeline (§4.8 step 1).
    pub fn is_globally_frozen(&self, organization_id: &str) -> bool {
        self.global_freeze
            .get(organization_id)
            .map(|flag| *flag.value())
            .unwrap_or(false)
    }

    /// `UpdateReputation(did, success, amount)`. `amount` feeds the agent's
    /// last-known transaction volume; the reputation score itself only
    /// depends on the success/failure ratio (§4.2).
    pub async fn update_reputation(&self, did: &Did, success: bool) -> Result<Agent> {
        let mut agent = self
            .storage
            .get_agent_by_did(did)
            .await?
            .ok_or_else(|| MandateError::NotFound(NotFoundError::AgentNotFound(did.to_string())))?;
        agent.record_outcome(success);
        self.storage.put_agent(&agent).await?;
        self.cache_invalidate(did);
        Ok(agent)
    }
}
