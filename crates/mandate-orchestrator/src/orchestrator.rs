// Path: crates/mandate-orchestrator/src/orchestrator.rs

//! The `Orchestrator` (§4.8): the single public `authorize` operation that
//! composes every other component into one decision. This is the one crate
//! allowed to hold both an `IdentityRegistry` and a `DelegationService`,
//! because only it is positioned to react to `IdentityRegistry::freeze`'s
//! `agent.frozen` event by cascading into delegation revocation — see
//! [`Orchestrator::handle_agent_frozen_event`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;

use mandate_api::capabilities::{AuditDraft, AuditSink, Clock, EventBus, Storage};
use mandate_delegation::{constraints_eval, DelegationService};
use mandate_identity::IdentityRegistry;
use mandate_issuer::{IssueRequest, MandateIssuer};
use mandate_policy::{context, PolicyEngine, SemanticOutcome};
use mandate_ratelimit::{AnomalyDetector, RateLimiter};
use mandate_types::agent::Agent;
use mandate_types::audit::{ActorDescriptor, Severity};
use mandate_types::config::AnomalyConfig;
use mandate_types::error::Result;
use mandate_types::ids::Did;
use mandate_types::mandate::MandateToken;
use mandate_types::ratelimit::TransactionHistoryRow;
use mandate_types::transaction::{
    AuthorizationResponse, Decision, TransactionRecord, TransactionRequest, TransactionStatus,
};

pub struct Orchestrator {
    storage: Arc<dyn Storage>,
    identity: Arc<IdentityRegistry>,
    delegation: Arc<DelegationService>,
    policy: Arc<PolicyEngine>,
    rate_limiter: Arc<RateLimiter>,
    anomaly: Arc<AnomalyDetector>,
    anomaly_config: AnomalyConfig,
    issuer: Arc<MandateIssuer>,
    audit: Arc<dyn AuditSink>,
    events: Arc<dyn EventBus>,
    clock: Arc<dyn Clock>,
    global_freeze_enabled: bool,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        storage: Arc<dyn Storage>,
        identity: Arc<IdentityRegistry>,
        delegation: Arc<DelegationService>,
        policy: Arc<PolicyEngine>,
        rate_limiter: Arc<RateLimiter>,
        anomaly: Arc<AnomalyDetector>,
        anomaly_config: AnomalyConfig,
        issuer: Arc<MandateIssuer>,
        audit: Arc<dyn AuditSink>,
        events: Arc<dyn EventBus>,
        clock: Arc<dyn Clock>,
        global_freeze_enabled: bool,
    ) -> Self {
        Self {
            storage,
            identity,
            delegation,
            policy,
            rate_limiter,
            anomaly,
            anomaly_config,
            issuer,
            audit,
            events,
            clock,
            global_freeze_enabled,
        }
    }

    /// `Authorize(req)` (§4.8), steps 1-11.
    pub async fn authorize(&self, request: TransactionRequest) -> Result<AuthorizationResponse> {
        request.validate()?;
        let now = self.clock.now();
        let transaction_id = uuid::Uuid::new_v4();

        // Steps 1+2: the global-freeze flag is organization-scoped, and the
        // organization is only known once the agent resolves, so this
        // implementation folds the two lookups together. `AgentNotFound` has
        // no organization to audit under and propagates as an error rather
        // than a decision (it is not in `MandateError::is_soft_denial`).
        let agent = self.identity.lookup_by_did(&request.agent_did).await?;

        if self.global_freeze_enabled && self.identity.is_globally_frozen(&agent.organization_id) {
            return self
                .finish(
                    transaction_id,
                    &agent,
                    &request,
                    now,
                    Decision::Frozen,
                    "organization is under a global freeze".to_string(),
                    vec!["GLOBAL_FREEZE".to_string()],
                    100,
                    None,
                )
                .await;
        }
        // Every non-ACTIVE status (FROZEN, REVOKED, PENDING_APPROVAL) is
        // treated uniformly as FROZEN at authorization time; the kernel's
        // only "can this agent transact" signal is `Agent::is_active`.
        if !agent.is_active() {
            return self
                .finish(
                    transaction_id,
                    &agent,
                    &request,
                    now,
                    Decision::Frozen,
                    "agent is not active".to_string(),
                    vec!["AGENT_FROZEN".to_string()],
                    100,
                    None,
                )
                .await;
        }

        // Step 3: delegation chain verification. Any failure here becomes a
        // DENY carrying that failure's own reason code, unconditionally —
        // unlike the propagate-vs-decide split used elsewhere in this
        // pipeline via `MandateError::is_soft_denial`.
        let mut effective_constraints = mandate_types::constraints::Constraints::unconstrained();
        let mut delegation_depth: u32 = 0;
        let mut chain_dids: Vec<String> = Vec::new();
        if !request.delegation_chain.is_empty() {
            match self.delegation.verify_chain(&request.delegation_chain, &agent.did).await {
                Ok(verification) => {
                    effective_constraints = verification.effective_constraints;
                    delegation_depth = request
                        .delegation_chain
                        .last()
                        .map(|t| t.payload.depth)
                        .unwrap_or(0);
                    chain_dids = request
                        .delegation_chain
                        .iter()
                        .map(|t| t.payload.recipient.as_str().to_string())
                        .collect();
                }
                Err(err) => {
                    return self
                        .finish(
                            transaction_id,
                            &agent,
                            &request,
                            now,
                            Decision::Deny,
                            err.to_string(),
                            vec![err.reason_code()],
                            100,
                            None,
                        )
                        .await;
                }
            }
        }

        // Step 4: rate limit, then anomaly detection only on the limited path.
        let check = self.rate_limiter.check(&agent.did, request.amount).await?;
        if !check.allowed {
            let since = now - chrono::Duration::minutes(self.anomaly_config.window_minutes);
            let records = self.storage.list_recent_transactions(&agent.did, since).await?;
            let history: Vec<TransactionHistoryRow> =
                records.iter().map(|r| TransactionHistoryRow { at: r.created_at, amount: r.amount }).collect();
            let signal = self.anomaly.detect(&history, now);

            if signal.is_anomalous() && self.anomaly_config.auto_freeze {
                self.freeze_and_cascade(&agent.did, "anomalous transaction behavior detected").await?;
                return self
                    .finish(
                        transaction_id,
                        &agent,
                        &request,
                        now,
                        Decision::Frozen,
                        "anomalous behavior detected; agent auto-frozen".to_string(),
                        vec!["ANOMALOUS_BEHAVIOR".to_string()],
                        100,
                        None,
                    )
                    .await;
            }
            return self
                .finish(
                    transaction_id,
                    &agent,
                    &request,
                    now,
                    Decision::Deny,
                    "rate limit exceeded".to_string(),
                    vec!["RATE_LIMIT".to_string()],
                    100,
                    None,
                )
                .await;
        }

        // Step 5: build context; evaluate chain-inherited constraints as
        // hard caps, then evaluate policies (with the chain's semantic
        // clause, if any, folded in alongside whatever policies carry).
        let (usage_snapshot, usage_ctx) = self.usage_snapshot(&agent.did, now).await?;
        if !request.delegation_chain.is_empty() {
            let violations = constraints_eval::evaluate(&effective_constraints, &request, usage_ctx, now);
            if !violations.is_empty() {
                let codes = violations.iter().map(|v| v.code.clone()).collect();
                let detail = violations.iter().map(|v| v.detail.clone()).collect::<Vec<_>>().join("; ");
                return self
                    .finish(transaction_id, &agent, &request, now, Decision::Deny, detail, codes, 100, None)
                    .await;
            }
        }

        let context_doc = context::build(&context::ContextInputs {
            request: &request,
            agent: &agent,
            usage: usage_snapshot,
            delegation_depth,
            delegation_chain_dids: &chain_dids,
            now,
        });
        let chain_semantic_clause = effective_constraints.semantic_constraint.clone();
        let evaluation = self
            .policy
            .evaluate(
                &agent.organization_id,
                &agent.did,
                &agent.display_name,
                &context_doc,
                request.amount,
                request.merchant_name.as_deref(),
                Some(request.reasoning.as_str()),
                chain_semantic_clause.as_deref(),
            )
            .await?;

        // Step 6+7: risk score and decision. A failed semantic evaluator is
        // fail-closed and overrides the normal composition entirely.
        let (decision, reason, violated_codes, risk_score) = if matches!(evaluation.semantic, Some(SemanticOutcome::EvaluatorFailed)) {
            (
                Decision::RequiresReview,
                "semantic evaluator unavailable; failing closed to manual review".to_string(),
                vec!["SEMANTIC_EVALUATOR_FAILED".to_string()],
                75u8,
            )
        } else {
            let mut risk: u16 = 0;
            if evaluation.deny_policy.is_some() {
                risk += 50;
            }
            if !evaluation.flags.is_empty() {
                risk += 25;
            }
            let mut semantic_non_compliant = false;
            if let Some(SemanticOutcome::Evaluated { compliant, risk_points, .. }) = &evaluation.semantic {
                risk += u16::from(*risk_points);
                semantic_non_compliant = !*compliant;
            }
            let risk_score = risk.min(100) as u8;

            if let Some(deny) = &evaluation.deny_policy {
                (Decision::Deny, format!("denied by policy \"{}\"", deny.name), vec![deny.name.clone()], risk_score)
            } else if semantic_non_compliant {
                (Decision::Deny, "semantic clause violation".to_string(), vec!["SEMANTIC_VIOLATION".to_string()], risk_score)
            } else if risk_score >= 80 {
                let codes = evaluation.flags.iter().map(|f| f.name.clone()).collect();
                (Decision::RequiresReview, "risk score exceeds manual-review threshold".to_string(), codes, risk_score)
            } else {
                (Decision::Allow, "approved".to_string(), Vec::new(), risk_score)
            }
        };

        // Step 8: on ALLOW, mint the mandate, commit the rate-limit record,
        // and record a reputation success.
        let mandate = if matches!(decision, Decision::Allow) {
            let issue_req = IssueRequest {
                issuer: agent.did.clone(),
                subject: agent.did.clone(),
                audience: request.merchant_id.clone(),
                organization_id: agent.organization_id.clone(),
                permissions: vec!["transact".to_string()],
                constraints: effective_constraints,
                delegation_chain_ids: request.delegation_chain.iter().map(|t| t.payload.token_id).collect(),
                ttl_seconds: None,
                expires_at_override: None,
                custom_claims: Default::default(),
            };
            let signed = self.issuer.issue(issue_req).await?;
            self.rate_limiter.record(&agent.did, request.amount).await?;
            self.identity.update_reputation(&agent.did, true).await?;
            Some(signed.payload)
        } else {
            None
        };

        self.finish(transaction_id, &agent, &request, now, decision, reason, violated_codes, risk_score, mandate).await
    }

    /// Steps 9-11: persist the `TransactionRecord`, append one audit entry,
    /// publish the outcome, and build the response.
    #[allow(clippy::too_many_arguments)]
    async fn finish(
        &self,
        transaction_id: uuid::Uuid,
        agent: &Agent,
        request: &TransactionRequest,
        now: DateTime<Utc>,
        decision: Decision,
        reason: String,
        violated_codes: Vec<String>,
        risk_score: u8,
        mandate: Option<MandateToken>,
    ) -> Result<AuthorizationResponse> {
        let status = match decision {
            Decision::Allow => TransactionStatus::Approved,
            Decision::Deny | Decision::Frozen => TransactionStatus::Denied,
            Decision::RequiresReview => TransactionStatus::Pending,
        };
        let record = TransactionRecord {
            id: transaction_id,
            agent_did: agent.did.clone(),
            amount: request.amount,
            currency: request.currency.clone(),
            merchant_id: request.merchant_id.clone(),
            status,
            decision,
            reason: reason.clone(),
            violated_codes: violated_codes.clone(),
            risk_score,
            mandate_token_id: mandate.as_ref().map(|m| m.token_id),
            created_at: now,
        };
        self.storage.put_transaction(&record).await?;

        let action = match decision {
            Decision::Allow => "transaction.approved",
            Decision::Deny | Decision::Frozen => "transaction.denied",
            Decision::RequiresReview => "transaction.requires_review",
        };
        let severity = match decision {
            Decision::Allow => Severity::Info,
            Decision::Deny => Severity::Warn,
            Decision::RequiresReview => Severity::Warn,
            Decision::Frozen => Severity::Critical,
        };
        self.audit
            .append(AuditDraft {
                organization_id: agent.organization_id.clone(),
                actor: ActorDescriptor { did: Some(agent.did.as_str().to_string()), kind: "agent".to_string(), label: agent.display_name.clone() },
                action: action.to_string(),
                payload: json!({
                    "transactionId": transaction_id.to_string(),
                    "amount": request.amount,
                    "currency": request.currency,
                    "merchantId": request.merchant_id,
                    "decision": format!("{decision:?}"),
                    "reason": reason,
                    "violatedCodes": violated_codes,
                    "riskScore": risk_score,
                }),
                severity,
            })
            .await?;
        self.publish(
            "transaction.events",
            json!({ "type": action, "transactionId": transaction_id.to_string(), "agentDid": agent.did.as_str() }),
        )
        .await;

        Ok(AuthorizationResponse { decision, reason, violated_codes, risk_score, mandate, transaction_id })
    }

    /// Applies the freeze synchronously and cascades into delegation
    /// revocation in the same call. This is the auto-freeze path (§4.5);
    /// see [`Self::handle_agent_frozen_event`] for the reactive form used
    /// when some other component (e.g. `IdentityRegistry::freeze` called
    /// directly by an operator) publishes `agent.frozen` without going
    /// through this orchestrator.
    async fn freeze_and_cascade(&self, did: &Did, reason: &str) -> Result<u64> {
        self.identity.freeze(did, reason.to_string(), "orchestrator:auto-freeze").await?;
        self.delegation.revoke_by_issuer(did, reason.to_string(), did).await
    }

    /// Reacts to an `agent.frozen` event published on the `agent.events`
    /// channel by cascading into delegation revocation. `IdentityRegistry`
    /// deliberately does not do this itself (see its module docs); a
    /// deployment wires a subscriber on `agent.events` to call this for
    /// every freeze that didn't originate from [`Self::freeze_and_cascade`]
    /// (e.g. an operator calling `Freeze` or `SetGlobalFreeze` directly).
    pub async fn handle_agent_frozen_event(&self, did: &Did, reason: &str) -> Result<u64> {
        self.delegation.revoke_by_issuer(did, reason.to_string(), did).await
    }

    /// Per-agent spend/usage figures, both in the shape the context builder
    /// wants and the shape the constraint evaluator wants, from a single
    /// `list_recent_transactions` read. Only successful (`ALLOW`) prior
    /// transactions count toward cumulative spend; a denied attempt never
    /// consumed any cap.
    async fn usage_snapshot(
        &self,
        agent_did: &Did,
        now: DateTime<Utc>,
    ) -> Result<(context::AgentUsageSnapshot, constraints_eval::UsageContext)> {
        let since = now - chrono::Duration::days(31);
        let records = self.storage.list_recent_transactions(agent_did, since).await?;
        let day_start = now - chrono::Duration::days(1);
        let week_start = now - chrono::Duration::days(7);
        let month_start = now - chrono::Duration::days(30);

        let mut spend_today = 0.0;
        let mut spend_week = 0.0;
        let mut spend_month = 0.0;
        let mut spend_total = 0.0;
        let mut count_today = 0u64;
        let mut count_total = 0u64;
        for record in records.iter().filter(|r| r.decision == Decision::Allow) {
            spend_total += record.amount;
            count_total += 1;
            if record.created_at >= month_start {
                spend_month += record.amount;
            }
            if record.created_at >= week_start {
                spend_week += record.amount;
            }
            if record.created_at >= day_start {
                spend_today += record.amount;
                count_today += 1;
            }
        }

        Ok((
            context::AgentUsageSnapshot {
                spend_today,
                spend_this_week: spend_week,
                spend_this_month: spend_month,
                transactions_today: count_today,
            },
            constraints_eval::UsageContext {
                usage_count: count_total,
                daily_spend: spend_today,
                weekly_spend: spend_week,
                monthly_spend: spend_month,
                total_spend: spend_total,
            },
        ))
    }

    async fn publish(&self, channel: &str, payload: serde_json::Value) {
        if let Err(err) = self.events.publish(channel, payload).await {
            tracing::warn!(error = %err, channel, "event publish failed");
        }
    }
}
