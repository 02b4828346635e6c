// Path: crates/mandate-policy/src/context.rs

//! Builds the JSON context document policies and semantic clauses are
//! evaluated against (§4.4 "Context").

use chrono::{DateTime, Datelike, Timelike, Utc};
use mandate_types::agent::Agent;
use mandate_types::transaction::TransactionRequest;
use serde_json::{json, Value};

/// Per-agent spend/usage figures the orchestrator already has on hand from
/// the rate limiter and transaction history; folded into the `agent.*`
/// branch of the context document.
#[derive(Debug, Clone, Copy, Default)]
pub struct AgentUsageSnapshot {
    pub spend_today: f64,
    pub spend_this_week: f64,
    pub spend_this_month: f64,
    pub transactions_today: u64,
}

/// Everything [`build`] needs beyond what lives on [`TransactionRequest`]
/// and [`Agent`] directly.
pub struct ContextInputs<'a> {
    pub request: &'a TransactionRequest,
    pub agent: &'a Agent,
    pub usage: AgentUsageSnapshot,
    pub delegation_depth: u32,
    pub delegation_chain_dids: &'a [String],
    pub now: DateTime<Utc>,
}

/// Assembles the `transaction` / `agent` / `delegation` / `temporal` / `ai`
/// branches of the evaluation context. Business hours are defined as
/// Monday-Friday, 09:00-17:00 UTC; a deployment needing a different
/// business calendar overrides via a policy rule on the `temporal.hour`
/// and `temporal.dayOfWeek` fields directly rather than this builder
/// guessing a timezone.
pub fn build(inputs: &ContextInputs<'_>) -> Value {
    let weekday = inputs.now.weekday().num_days_from_monday();
    let hour = inputs.now.hour();
    let is_weekend = weekday >= 5;
    let is_business_hours = !is_weekend && (9..17).contains(&hour);

    json!({
        "transaction": {
            "amount": inputs.request.amount,
            "currency": inputs.request.currency,
            "merchant": {
                "id": inputs.request.merchant_id,
                "name": inputs.request.merchant_name,
                "category": inputs.request.category,
            },
            "metadata": inputs.request.metadata,
        },
        "agent": {
            "id": inputs.agent.id.to_string(),
            "did": inputs.agent.did.as_str(),
            "type": format!("{:?}", inputs.agent.agent_type),
            "spendToday": inputs.usage.spend_today,
            "spendThisWeek": inputs.usage.spend_this_week,
            "spendThisMonth": inputs.usage.spend_this_month,
            "transactionsToday": inputs.usage.transactions_today,
            "reputation": inputs.agent.reputation,
        },
        "delegation": {
            "depth": inputs.delegation_depth,
            "chainDids": inputs.delegation_chain_dids,
        },
        "temporal": {
            "timestamp": inputs.now.to_rfc3339(),
            "dayOfWeek": weekday,
            "hour": hour,
            "isWeekend": is_weekend,
            "isBusinessHours": is_business_hours,
        },
        "ai": {
            "reasoningTrace": inputs.request.reasoning,
        },
    })
}
