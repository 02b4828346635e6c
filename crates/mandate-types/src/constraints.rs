// Path: crates/mandate-types/src/constraints.rs
//! The `Constraints` value object and its deterministic merge semantics.
//!
//! Carried by both delegation tokens and policies. `None` always means
//! "unconstrained" on that dimension; merging is total and never panics.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Constraints {
    // Numeric upper bounds.
    pub max_single_amount: Option<f64>,
    pub max_daily_spend: Option<f64>,
    pub max_weekly_spend: Option<f64>,
    pub max_monthly_spend: Option<f64>,
    pub max_total_spend: Option<f64>,
    pub max_usage_count: Option<u64>,
    pub max_sub_delegation_depth: Option<u32>,

    // Set caps.
    pub allowed_merchants: Option<BTreeSet<String>>,
    pub blocked_merchants: BTreeSet<String>,
    pub allowed_categories: Option<BTreeSet<String>>,
    pub blocked_categories: BTreeSet<String>,
    pub allowed_currencies: Option<BTreeSet<String>>,
    pub allowed_days_of_week: Option<BTreeSet<u8>>,

    // Temporal hour window, in the constraint's timezone.
    pub hour_start: Option<u8>,
    pub hour_end: Option<u8>,
    pub timezone: Option<String>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,

    // Booleans.
    pub can_sub_delegate: bool,
    pub require_reason: bool,

    // Free-form.
    pub semantic_constraint: Option<String>,
    #[serde(default)]
    pub custom: serde_json::Map<String, Value>,
}

impl Constraints {
    /// An explicitly unconstrained object, used as the identity element for
    /// folding a chain of delegations from the root.
    pub fn unconstrained() -> Self {
        Self {
            can_sub_delegate: true,
            ..Default::default()
        }
    }

    /// Deterministic merge of a parent constraint with a child's requested
    /// (refining) constraint, per the spec's total merge table.
    pub fn merge(parent: &Constraints, child: &Constraints) -> Constraints {
        Constraints {
            max_single_amount: min_opt(parent.max_single_amount, child.max_single_amount),
            max_daily_spend: min_opt(parent.max_daily_spend, child.max_daily_spend),
            max_weekly_spend: min_opt(parent.max_weekly_spend, child.max_weekly_spend),
            max_monthly_spend: min_opt(parent.max_monthly_spend, child.max_monthly_spend),
            max_total_spend: min_opt(parent.max_total_spend, child.max_total_spend),
            max_usage_count: min_opt_u64(parent.max_usage_count, child.max_usage_count),
            max_sub_delegation_depth: min_opt_u32(
                parent.max_sub_delegation_depth,
                child.max_sub_delegation_depth,
            ),

            allowed_merchants: intersect_opt(&parent.allowed_merchants, &child.allowed_merchants),
            blocked_merchants: parent
                .blocked_merchants
                .union(&child.blocked_merchants)
                .cloned()
                .collect(),
            allowed_categories: intersect_opt(
                &parent.allowed_categories,
                &child.allowed_categories,
            ),
            blocked_categories: parent
                .blocked_categories
                .union(&child.blocked_categories)
                .cloned()
                .collect(),
            allowed_currencies: intersect_opt(
                &parent.allowed_currencies,
                &child.allowed_currencies,
            ),
            allowed_days_of_week: intersect_opt(
                &parent.allowed_days_of_week,
                &child.allowed_days_of_week,
            ),

            hour_start: max_opt_u8(parent.hour_start, child.hour_start),
            hour_end: min_opt_u8(parent.hour_end, child.hour_end),
            timezone: child.timezone.clone().or_else(|| parent.timezone.clone()),
            valid_from: max_opt_time(parent.valid_from, child.valid_from),
            valid_until: min_opt_time(parent.valid_until, child.valid_until),

            can_sub_delegate: parent.can_sub_delegate && child.can_sub_delegate,
            require_reason: parent.require_reason || child.require_reason,

            semantic_constraint: concat_clauses(
                &parent.semantic_constraint,
                &child.semantic_constraint,
            ),
            custom: {
                let mut merged = parent.custom.clone();
                for (k, v) in &child.custom {
                    merged.insert(k.clone(), v.clone());
                }
                merged
            },
        }
    }

    /// Whether `child` is a refinement of `self` (never loosens a cap,
    /// never narrows a block-set, never widens an allow-set beyond what the
    /// parent already permits, never extends validity past the parent's).
    /// Used by the delegation service to reject loosening mints.
    pub fn is_refinement_of(&self, parent: &Constraints) -> bool {
        refines_upper(self.max_single_amount, parent.max_single_amount)
            && refines_upper(self.max_daily_spend, parent.max_daily_spend)
            && refines_upper(self.max_weekly_spend, parent.max_weekly_spend)
            && refines_upper(self.max_monthly_spend, parent.max_monthly_spend)
            && refines_upper(self.max_total_spend, parent.max_total_spend)
            && refines_upper_u64(self.max_usage_count, parent.max_usage_count)
            && refines_upper_u32(
                self.max_sub_delegation_depth,
                parent.max_sub_delegation_depth,
            )
            && refines_allow_set(&self.allowed_merchants, &parent.allowed_merchants)
            && refines_block_set(&self.blocked_merchants, &parent.blocked_merchants)
            && refines_allow_set(&self.allowed_categories, &parent.allowed_categories)
            && refines_block_set(&self.blocked_categories, &parent.blocked_categories)
            && refines_allow_set(&self.allowed_currencies, &parent.allowed_currencies)
            && refines_valid_until(self.valid_until, parent.valid_until)
            && (!self.can_sub_delegate || parent.can_sub_delegate)
    }
}

fn min_opt(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (Some(x), None) | (None, Some(x)) => Some(x),
        (None, None) => None,
    }
}
fn min_opt_u64(a: Option<u64>, b: Option<u64>) -> Option<u64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (Some(x), None) | (None, Some(x)) => Some(x),
        (None, None) => None,
    }
}
fn min_opt_u32(a: Option<u32>, b: Option<u32>) -> Option<u32> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (Some(x), None) | (None, Some(x)) => Some(x),
        (None, None) => None,
    }
}
fn max_opt_u8(a: Option<u8>, b: Option<u8>) -> Option<u8> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (Some(x), None) | (None, Some(x)) => Some(x),
        (None, None) => None,
    }
}
fn min_opt_u8(a: Option<u8>, b: Option<u8>) -> Option<u8> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (Some(x), None) | (None, Some(x)) => Some(x),
        (None, None) => None,
    }
}
fn max_opt_time(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (Some(x), None) | (None, Some(x)) => Some(x),
        (None, None) => None,
    }
}
fn min_opt_time(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (Some(x), None) | (None, Some(x)) => Some(x),
        (None, None) => None,
    }
}
fn intersect_opt<T: Clone + Ord>(
    a: &Option<BTreeSet<T>>,
    b: &Option<BTreeSet<T>>,
) -> Option<BTreeSet<T>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.intersection(b).cloned().collect()),
        (Some(x), None) | (None, Some(x)) => Some(x.clone()),
        (None, None) => None,
    }
}
fn concat_clauses(a: &Option<String>, b: &Option<String>) -> Option<String> {
    match (a, b) {
        (Some(a), Some(b)) => Some(format!("{a} AND {b}")),
        (Some(x), None) | (None, Some(x)) => Some(x.clone()),
        (None, None) => None,
    }
}

fn refines_upper(child: Option<f64>, parent: Option<f64>) -> bool {
    match (child, parent) {
        (_, None) => true,
        (None, Some(_)) => false,
        (Some(c), Some(p)) => c <= p,
    }
}
fn refines_upper_u64(child: Option<u64>, parent: Option<u64>) -> bool {
    match (child, parent) {
        (_, None) => true,
        (None, Some(_)) => false,
        (Some(c), Some(p)) => c <= p,
    }
}
fn refines_upper_u32(child: Option<u32>, parent: Option<u32>) -> bool {
    match (child, parent) {
        (_, None) => true,
        (None, Some(_)) => false,
        (Some(c), Some(p)) => c <= p,
    }
}
fn refines_valid_until(
    child: Option<DateTime<Utc>>,
    parent: Option<DateTime<Utc>>,
) -> bool {
    match (child, parent) {
        (_, None) => true,
        (None, Some(_)) => false,
        (Some(c), Some(p)) => c <= p,
    }
}
fn refines_allow_set(child: &Option<BTreeSet<String>>, parent: &Option<BTreeSet<String>>) -> bool {
    match (child, parent) {
        (_, None) => true,
        (None, Some(_)) => false,
        (Some(c), Some(p)) => c.is_subset(p),
    }
}
fn refines_block_set(child: &BTreeSet<String>, parent: &BTreeSet<String>) -> bool {
    parent.is_subset(child)
}
