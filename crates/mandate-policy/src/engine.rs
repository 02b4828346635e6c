// Path: crates/mandate-policy/src/engine.rs

//! The `PolicyEngine` (§4.4): scoped policy lookup, deterministic decision
//! composition, and semantic clause integration with response caching.

use std::sync::Arc;
use std::time::Duration;

use mandate_api::capabilities::{Cache, Clock, SemanticEvaluator, Storage};
use mandate_crypto::algorithms::hash::sha256;
use mandate_types::error::Result;
use mandate_types::ids::{Did, PolicyId};
use mandate_types::policy::{Policy, PolicyAction, PolicyScope};

use crate::rules;

/// One policy whose rule evaluated truthy against the context.
#[derive(Debug, Clone)]
pub struct PolicyMatch {
    pub policy_id: PolicyId,
    pub name: String,
    pub action: PolicyAction,
}

/// The outcome of the semantic (LLM-backed) clause check, if one ran.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind")]
pub enum SemanticOutcome {
    Evaluated {
        compliant: bool,
        confidence: f64,
        reasoning: String,
        /// +40 if non-compliant, +20 if compliant but under threshold, else 0;
        /// folded into the orchestrator's risk score (§4.8 step 6).
        risk_points: u8,
        #[serde(default)]
        cached: bool,
    },
    /// The evaluator errored, timed out, or was needed but unconfigured.
    /// Fail-closed per §4.4: the caller forces `REQUIRES_REVIEW` at a fixed
    /// risk score of 75 rather than folding this into the normal scoring.
    EvaluatorFailed,
}

/// The policy phase's verdict, before the orchestrator folds in rate-limit
/// and delegation-chain signals to compute the final decision and risk score.
#[derive(Debug, Clone)]
pub struct PolicyEvaluation {
    pub matched: Vec<PolicyMatch>,
    pub deny_policy: Option<PolicyMatch>,
    pub flags: Vec<PolicyMatch>,
    pub semantic: Option<SemanticOutcome>,
}

pub struct PolicyEngine {
    storage: Arc<dyn Storage>,
    semantic_evaluator: Option<Arc<dyn SemanticEvaluator>>,
    cache: Arc<dyn Cache>,
    clock: Arc<dyn Clock>,
    threshold: f64,
    cache_ttl: Duration,
    enabled: bool,
}

impl PolicyEngine {
    pub fn new(
        storage: Arc<dyn Storage>,
        semantic_evaluator: Option<Arc<dyn SemanticEvaluator>>,
        cache: Arc<dyn Cache>,
        clock: Arc<dyn Clock>,
        semantic_config: mandate_types::config::SemanticConfig,
    ) -> Self {
        Self {
            storage,
            semantic_evaluator,
            cache,
            clock,
            threshold: semantic_config.threshold,
            cache_ttl: Duration::from_secs(semantic_config.cache_ttl_seconds),
            enabled: semantic_config.enabled,
        }
    }

    /// `EvaluatePolicies` + semantic clause check (§4.4). Agent-scoped
    /// policies are evaluated before organization-scoped ones; within a
    /// scope, by `priority` descending then `id` ascending.
    #[allow(clippy::too_many_arguments)]
    pub async fn evaluate(
        &self,
        organization_id: &str,
        agent_did: &Did,
        agent_name: &str,
        context: &serde_json::Value,
        amount: f64,
        merchant_name: Option<&str>,
        reasoning: Option<&str>,
        chain_semantic_clause: Option<&str>,
    ) -> Result<PolicyEvaluation> {
        let mut agent_policies = self
            .storage
            .list_policies_for_scope(&PolicyScope::Agent(agent_did.to_string()))
            .await?;
        let mut org_policies = self
            .storage
            .list_policies_for_scope(&PolicyScope::Organization(organization_id.to_string()))
            .await?;
        agent_policies.sort_by_key(Policy::sort_key);
        org_policies.sort_by_key(Policy::sort_key);

        let mut matched = Vec::new();
        let mut semantic_clauses = Vec::new();
        for policy in agent_policies.iter().chain(org_policies.iter()) {
            if !policy.active {
                continue;
            }
            if rules::truthy(&rules::eval(&policy.rule, context)) {
                if let Some(semantic) = &policy.semantic {
                    semantic_clauses.push(semantic.clause.clone());
                }
                matched.push(PolicyMatch {
                    policy_id: policy.id,
                    name: policy.name.clone(),
                    action: policy.action,
                });
            }
        }
        if let Some(clause) = chain_semantic_clause {
            semantic_clauses.push(clause.to_string());
        }

        let deny_policy = matched.iter().find(|m| m.action == PolicyAction::Deny).cloned();
        let flags = matched
            .iter()
            .filter(|m| matches!(m.action, PolicyAction::Flag | PolicyAction::RequireMfa | PolicyAction::Notify))
            .cloned()
            .collect();

        let semantic = if self.enabled && !semantic_clauses.is_empty() {
            Some(
                self.evaluate_semantic(&semantic_clauses, reasoning, context, amount, agent_name, merchant_name)
                    .await?,
            )
        } else {
            None
        };

        Ok(PolicyEvaluation { matched, deny_policy, flags, semantic })
    }

    /// Calls the `SemanticEvaluator` (or reuses a cached verdict). The cache
    /// key is `SHA-256(clauses || reasoning || amount_bucket || merchant)`;
    /// amount is bucketed to the nearest 100 units so near-identical
    /// transactions share a cache entry (§4.4).
    async fn evaluate_semantic(
        &self,
        clauses: &[String],
        reasoning: Option<&str>,
        context: &serde_json::Value,
        amount: f64,
        agent_name: &str,
        merchant_name: Option<&str>,
    ) -> Result<SemanticOutcome> {
        let amount_bucket = (amount / 100.0).floor() as i64 * 100;
        let key_material = format!(
            "{}\n{}\n{}\n{}",
            clauses.join("\n"),
            reasoning.unwrap_or(""),
            amount_bucket,
            merchant_name.unwrap_or("")
        );
        let digest = sha256(key_material.as_bytes())?;
        let cache_key = format!("semantic:{}", hex::encode(digest));

        if let Some(cached) = self.cache.get(&cache_key).await? {
            if let Ok(mut outcome) = serde_json::from_slice::<SemanticOutcome>(&cached) {
                if let SemanticOutcome::Evaluated { cached: hit, .. } = &mut outcome {
                    *hit = true;
                }
                return Ok(outcome);
            }
        }

        let Some(evaluator) = &self.semantic_evaluator else {
            tracing::warn!("semantic clause present but no evaluator configured; failing closed");
            return Ok(SemanticOutcome::EvaluatorFailed);
        };

        let eval_context = serde_json::json!({
            "amount": amount,
            "agentName": agent_name,
            "merchantName": merchant_name,
            "context": context,
        });
        match evaluator.evaluate(clauses, reasoning, &eval_context).await {
            Ok(result) => {
                let risk_points = if !result.compliant {
                    40
                } else if result.confidence < self.threshold {
                    20
                } else {
                    0
                };
                let outcome = SemanticOutcome::Evaluated {
                    compliant: result.compliant,
                    confidence: result.confidence,
                    reasoning: result.reasoning,
                    risk_points,
                    cached: false,
                };
                if let Ok(bytes) = serde_json::to_vec(&outcome) {
                    self.cache.set(&cache_key, bytes, self.cache_ttl).await?;
                }
                Ok(outcome)
            }
            Err(err) => {
                tracing::warn!(error = %err, "semantic evaluator failed; failing closed");
                Ok(SemanticOutcome::EvaluatorFailed)
            }
        }
    }

    /// Present so the engine can stamp `recorded_at`-style fields the same
    /// way the rest of the kernel does; kept even though no current caller
    /// needs it yet.
    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mandate_api::capabilities::SemanticEvaluation;
    use mandate_types::ids::{AgentId, TokenId};
    use mandate_types::policy::SemanticClauseConfig;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;

    struct FixedClock;
    impl Clock for FixedClock {
        fn now(&self) -> chrono::DateTime<chrono::Utc> {
            chrono::Utc::now()
        }
        fn monotonic_now(&self) -> std::time::Instant {
            std::time::Instant::now()
        }
    }

    struct MemCache {
        entries: StdMutex<std::collections::HashMap<String, Vec<u8>>>,
    }
    impl MemCache {
        fn new() -> Self {
            Self { entries: StdMutex::new(std::collections::HashMap::new()) }
        }
    }
    #[async_trait]
    impl Cache for MemCache {
        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
            Ok(self.entries.lock().unwrap().get(key).cloned())
        }
        async fn set(&self, key: &str, value: Vec<u8>, _ttl: Duration) -> Result<()> {
            self.entries.lock().unwrap().insert(key.to_string(), value);
            Ok(())
        }
        async fn delete(&self, key: &str) -> Result<()> {
            self.entries.lock().unwrap().remove(key);
            Ok(())
        }
        async fn delete_pattern(&self, _pattern: &str) -> Result<u64> {
            Ok(0)
        }
        async fn lock(&self, _key: &str, _ttl: Duration) -> Result<Option<String>> {
            Ok(Some("token".to_string()))
        }
        async fn unlock(&self, _key: &str, _token: &str) -> Result<()> {
            Ok(())
        }
    }

    struct StubStorage {
        policies: Vec<Policy>,
    }
    #[async_trait]
    impl Storage for StubStorage {
        async fn get_agent_by_id(&self, _id: &AgentId) -> Result<Option<mandate_types::agent::Agent>> { Ok(None) }
        async fn get_agent_by_did(&self, _did: &Did) -> Result<Option<mandate_types::agent::Agent>> { Ok(None) }
        async fn put_agent(&self, _agent: &mandate_types::agent::Agent) -> Result<()> { Ok(()) }
        async fn list_agents_for_org(&self, _organization_id: &str) -> Result<Vec<mandate_types::agent::Agent>> { Ok(vec![]) }
        async fn get_policy(&self, _id: &PolicyId) -> Result<Option<Policy>> { Ok(None) }
        async fn put_policy(&self, _policy: &Policy) -> Result<()> { Ok(()) }
        async fn list_policies_for_scope(&self, scope: &PolicyScope) -> Result<Vec<Policy>> {
            Ok(self
                .policies
                .iter()
                .filter(|p| matches_scope(&p.scope, scope))
                .cloned()
                .collect())
        }
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
        async fn purge_audit_entries_before(&self, _organization_id: &str, _retain_until: chrono::DateTime<chrono::Utc>) -> Result<u64> { Ok(0) }
        async fn get_rate_limit_window(&self, _agent_did: &Did) -> Result<Option<mandate_types::ratelimit::RateLimitWindow>> { Ok(None) }
        async fn put_rate_limit_window(&self, _agent_did: &Did, _expected: Option<mandate_types::ratelimit::RateLimitWindow>, _next: mandate_types::ratelimit::RateLimitWindow) -> Result<()> { Ok(()) }
        async fn get_nonce(&self, _nonce: &str) -> Result<Option<mandate_types::ratelimit::NonceRecord>> { Ok(None) }
        async fn put_nonce_if_absent(&self, _record: &mandate_types::ratelimit::NonceRecord) -> Result<bool> { Ok(true) }
        async fn purge_expired_nonces(&self, _now: chrono::DateTime<chrono::Utc>) -> Result<u64> { Ok(0) }
    }

    fn matches_scope(have: &PolicyScope, want: &PolicyScope) -> bool {
        match (have, want) {
            (PolicyScope::Agent(a), PolicyScope::Agent(b)) => a == b,
            (PolicyScope::Organization(a), PolicyScope::Organization(b)) => a == b,
            _ => false,
        }
    }

    struct StubSemanticEvaluator {
        compliant: bool,
        confidence: f64,
    }
    #[async_trait]
    impl SemanticEvaluator for StubSemanticEvaluator {
        async fn evaluate(
            &self,
            _clauses: &[String],
            _reasoning: Option<&str>,
            _context: &serde_json::Value,
        ) -> Result<SemanticEvaluation> {
            Ok(SemanticEvaluation {
                compliant: self.compliant,
                confidence: self.confidence,
                reasoning: "stub".to_string(),
                latency_ms: 1,
                cost: 0.0,
            })
        }
    }

    fn deny_policy(rule: mandate_types::policy::Rule) -> Policy {
        Policy {
            id: PolicyId::new(),
            name: "no-large-travel".to_string(),
            scope: PolicyScope::Organization("org-1".to_string()),
            priority: 10,
            active: true,
            rule,
            semantic: None,
            action: PolicyAction::Deny,
            version: 1,
            previous_version: None,
            created_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn matching_deny_policy_wins() {
        let rule = mandate_types::policy::Rule::Gt {
            args: vec![
                mandate_types::policy::Rule::Var { path: "transaction.amount".to_string() },
                mandate_types::policy::Rule::Lit { value: json!(1000) },
            ],
        };
        let storage = Arc::new(StubStorage { policies: vec![deny_policy(rule)] });
        let engine = PolicyEngine::new(
            storage,
            None,
            Arc::new(MemCache::new()),
            Arc::new(FixedClock),
            mandate_types::config::SemanticConfig { enabled: false, ..Default::default() },
        );
        let ctx = json!({ "transaction": { "amount": 5000.0 } });
        let did = Did::parse("did:mand:3yQ3P8V7s4RexPuZ7cfjJb").unwrap();
        let result = engine.evaluate("org-1", &did, "agent", &ctx, 5000.0, None, None, None).await.unwrap();
        assert!(result.deny_policy.is_some());
        assert_eq!(result.deny_policy.unwrap().name, "no-large-travel");
    }

    #[tokio::test]
    async fn non_matching_policy_allows() {
        let rule = mandate_types::policy::Rule::Gt {
            args: vec![
                mandate_types::policy::Rule::Var { path: "transaction.amount".to_string() },
                mandate_types::policy::Rule::Lit { value: json!(1000) },
            ],
        };
        let storage = Arc::new(StubStorage { policies: vec![deny_policy(rule)] });
        let engine = PolicyEngine::new(
            storage,
            None,
            Arc::new(MemCache::new()),
            Arc::new(FixedClock),
            mandate_types::config::SemanticConfig { enabled: false, ..Default::default() },
        );
        let ctx = json!({ "transaction": { "amount": 50.0 } });
        let did = Did::parse("did:mand:3yQ3P8V7s4RexPuZ7cfjJb").unwrap();
        let result = engine.evaluate("org-1", &did, "agent", &ctx, 50.0, None, None, None).await.unwrap();
        assert!(result.deny_policy.is_none());
        assert!(result.matched.is_empty());
    }

    #[tokio::test]
    async fn semantic_clause_non_compliant_reports_risk_points() {
        let mut policy = deny_policy(mandate_types::policy::Rule::Lit { value: json!(true) });
        policy.action = PolicyAction::Flag;
        policy.semantic = Some(SemanticClauseConfig {
            clause: "reasoning must not mention gambling".to_string(),
            provider: "stub".to_string(),
            model: "stub".to_string(),
            threshold: 0.7,
            cache_ttl_seconds: 60,
        });
        let storage = Arc::new(StubStorage { policies: vec![policy] });
        let evaluator = Arc::new(StubSemanticEvaluator { compliant: false, confidence: 0.9 });
        let engine = PolicyEngine::new(
            storage,
            Some(evaluator),
            Arc::new(MemCache::new()),
            Arc::new(FixedClock),
            mandate_types::config::SemanticConfig::default(),
        );
        let ctx = json!({});
        let did = Did::parse("did:mand:3yQ3P8V7s4RexPuZ7cfjJb").unwrap();
        let result = engine
            .evaluate("org-1", &did, "agent", &ctx, 100.0, Some("acme"), Some("betting pool"), None)
            .await
            .unwrap();
        match result.semantic {
            Some(SemanticOutcome::Evaluated { compliant, risk_points, .. }) => {
                assert!(!compliant);
                assert_eq!(risk_points, 40);
            }
            other => panic!("expected Evaluated outcome, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_evaluator_with_clause_fails_closed() {
        let mut policy = deny_policy(mandate_types::policy::Rule::Lit { value: json!(true) });
        policy.action = PolicyAction::Flag;
        policy.semantic = Some(SemanticClauseConfig {
            clause: "must be reasonable".to_string(),
            provider: "stub".to_string(),
            model: "stub".to_string(),
            threshold: 0.7,
            cache_ttl_seconds: 60,
        });
        let storage = Arc::new(StubStorage { policies: vec![policy] });
        let engine = PolicyEngine::new(
            storage,
            None,
            Arc::new(MemCache::new()),
            Arc::new(FixedClock),
            mandate_types::config::SemanticConfig::default(),
        );
        let ctx = json!({});
        let did = Did::parse("did:mand:3yQ3P8V7s4RexPuZ7cfjJb").unwrap();
        let result = engine.evaluate("org-1", &did, "agent", &ctx, 100.0, None, None, None).await.unwrap();
        assert!(matches!(result.semantic, Some(SemanticOutcome::EvaluatorFailed)));
    }
}
