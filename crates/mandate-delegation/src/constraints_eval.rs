// Path: crates/mandate-delegation/src/constraints_eval.rs

//! Constraint evaluation against a request (§4.3, "Constraint evaluation
//! against a request"). Produces a total list of machine-readable
//! violations rather than failing fast, so a caller can report every cap a
//! transaction would breach at once.

use chrono::{DateTime, Datelike, Timelike, Utc};
use mandate_types::constraints::Constraints;
use mandate_types::delegation::ConstraintViolation;
use mandate_types::transaction::TransactionRequest;

/// Accumulated spend/usage the caller already knows about, folded in
/// alongside the single-transaction checks below. Evaluating cumulative
/// caps (`max_daily_spend` and friends) requires this external context;
/// the delegation service itself holds no transaction history.
#[derive(Debug, Clone, Copy, Default)]
pub struct UsageContext {
    pub usage_count: u64,
    pub daily_spend: f64,
    pub weekly_spend: f64,
    pub monthly_spend: f64,
    pub total_spend: f64,
}

/// Evaluates `constraints` against `request` (plus `usage`, `now`),
/// returning every violated cap. An empty result means the request is
/// within all constraints.
pub fn evaluate(
    constraints: &Constraints,
    request: &TransactionRequest,
    usage: UsageContext,
    now: DateTime<Utc>,
) -> Vec<ConstraintViolation> {
    let mut violations = Vec::new();

    if let Some(cap) = constraints.max_single_amount {
        if request.amount > cap {
            violations.push(ConstraintViolation::new(
                "AMOUNT_EXCEEDS_CAP",
                format!("amount {} exceeds single-transaction cap {}", request.amount, cap),
            ));
        }
    }
    check_cumulative(&mut violations, "max_daily_spend", constraints.max_daily_spend, usage.daily_spend + request.amount);
    check_cumulative(&mut violations, "max_weekly_spend", constraints.max_weekly_spend, usage.weekly_spend + request.amount);
    check_cumulative(&mut violations, "max_monthly_spend", constraints.max_monthly_spend, usage.monthly_spend + request.amount);
    check_cumulative(&mut violations, "max_total_spend", constraints.max_total_spend, usage.total_spend + request.amount);
    if let Some(cap) = constraints.max_usage_count {
        if usage.usage_count + 1 > cap {
            violations.push(ConstraintViolation::new(
                "AMOUNT_EXCEEDS_CAP",
                format!("usage count {} exceeds cap {}", usage.usage_count + 1, cap),
            ));
        }
    }

    if let Some(allowed) = &constraints.allowed_merchants {
        if !allowed.contains(&request.merchant_id) {
            violations.push(ConstraintViolation::new(
                "MERCHANT_BLOCKED",
                format!("merchant {} is not in the allowed set", request.merchant_id),
            ));
        }
    }
    if constraints.blocked_merchants.contains(&request.merchant_id) {
        violations.push(ConstraintViolation::new(
            "MERCHANT_BLOCKED",
            format!("merchant {} is explicitly blocked", request.merchant_id),
        ));
    }

    if let Some(category) = &request.category {
        if let Some(allowed) = &constraints.allowed_categories {
            if !allowed.contains(category) {
                violations.push(ConstraintViolation::new(
                    "CATEGORY_BLOCKED",
                    format!("category {category} is not in the allowed set"),
                ));
            }
        }
        if constraints.blocked_categories.contains(category) {
            violations.push(ConstraintViolation::new(
                "CATEGORY_BLOCKED",
                format!("category {category} is explicitly blocked"),
            ));
        }
    }

    if let Some(allowed) = &constraints.allowed_currencies {
        if !allowed.contains(&request.currency) {
            violations.push(ConstraintViolation::new(
                "CURRENCY_NOT_ALLOWED",
                format!("currency {} is not in the allowed set", request.currency),
            ));
        }
    }

    if let Some(allowed_days) = &constraints.allowed_days_of_week {
        let weekday = now.weekday().num_days_from_monday() as u8;
        if !allowed_days.contains(&weekday) {
            violations.push(ConstraintViolation::new("OUTSIDE_HOURS", "day of week not permitted"));
        }
    }
    if let (Some(start), Some(end)) = (constraints.hour_start, constraints.hour_end) {
        let hour = now.hour() as u8;
        let within = if start <= end {
            hour >= start && hour <= end
        } else {
            // Wraps past midnight, e.g. 22..=6.
            hour >= start || hour <= end
        };
        if !within {
            violations.push(ConstraintViolation::new(
                "OUTSIDE_HOURS",
                format!("hour {hour} outside permitted window {start}-{end}"),
            ));
        }
    }
    if let Some(from) = constraints.valid_from {
        if now < from {
            violations.push(ConstraintViolation::new("OUTSIDE_HOURS", "before constraint's valid-from"));
        }
    }
    if let Some(until) = constraints.valid_until {
        if now > until {
            violations.push(ConstraintViolation::new("OUTSIDE_HOURS", "after constraint's valid-until"));
        }
    }

    violations
}

fn check_cumulative(
    violations: &mut Vec<ConstraintViolation>,
    code: &str,
    cap: Option<f64>,
    projected: f64,
) {
    if let Some(cap) = cap {
        if projected > cap {
            violations.push(ConstraintViolation::new(
                "AMOUNT_EXCEEDS_CAP",
                format!("{code} cap {cap} exceeded by projected total {projected}"),
            ));
        }
    }
}
