// Path: crates/mandate-types/src/policy.rs
//! The `Policy` entity and the JSON-Logic-style rule tree it carries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::PolicyId;

/// Closed operator set for the rule language. `Rule::Lit` and `Rule::Var`
/// are the leaves; everything else is a recursive combinator. The
/// evaluator (see `mandate-policy::rules`) is total over this type: there
/// is no "unknown operator" case to fall through to at runtime, because
/// the parser already rejects anything outside this set at write time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Rule {
    /// A literal JSON scalar/array/object.
    Lit { value: Value },
    /// A dotted-path lookup into the evaluation context, e.g. `amount` or
    /// `merchant.category`.
    Var { path: String },
    Eq { args: Vec<Rule> },
    Ne { args: Vec<Rule> },
    Lt { args: Vec<Rule> },
    Lte { args: Vec<Rule> },
    Gt { args: Vec<Rule> },
    Gte { args: Vec<Rule> },
    And { args: Vec<Rule> },
    Or { args: Vec<Rule> },
    Not { arg: Box<Rule> },
    In { needle: Box<Rule>, haystack: Box<Rule> },
    NotIn { needle: Box<Rule>, haystack: Box<Rule> },
    Add { args: Vec<Rule> },
    Sub { args: Vec<Rule> },
    Mul { args: Vec<Rule> },
    Div { args: Vec<Rule> },
    /// `some`/`all` over an array-valued sub-expression.
    Some { array: Box<Rule>, predicate: Box<Rule> },
    All { array: Box<Rule>, predicate: Box<Rule> },
    If { cond: Box<Rule>, then: Box<Rule>, else_: Box<Rule> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyAction {
    Allow,
    Deny,
    Flag,
    RequireMfa,
    Notify,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticClauseConfig {
    pub clause: String,
    pub provider: String,
    pub model: String,
    pub threshold: f64,
    pub cache_ttl_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PolicyScope {
    Organization(String),
    Agent(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    pub id: PolicyId,
    pub name: String,
    pub scope: PolicyScope,
    /// Higher is evaluated first.
    pub priority: i32,
    pub active: bool,
    pub rule: Rule,
    pub semantic: Option<SemanticClauseConfig>,
    pub action: PolicyAction,
    pub version: u32,
    pub previous_version: Option<PolicyId>,
    pub created_at: DateTime<Utc>,
}

impl Policy {
    /// Sort key for deterministic evaluation order: priority descending,
    /// then id ascending as a tie-breaker.
    pub fn sort_key(&self) -> (std::cmp::Reverse<i32>, PolicyId) {
        (std::cmp::Reverse(self.priority), self.id)
    }
}
