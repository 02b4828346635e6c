// Path: crates/mandate-telemetry/src/prometheus.rs
//! A concrete implementation of the metrics sinks using the Prometheus crate.

use crate::sinks::*;
use once_cell::sync::OnceCell;
use prometheus::{
    exponential_buckets, register_gauge, register_histogram_vec, register_int_counter_vec, Gauge,
    HistogramVec, IntCounterVec,
};

// --- Metric Statics ---
// We use OnceCell to hold the metric collectors. They will be initialized
// exactly once by the `install` function.

static DECISIONS_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static RISK_SCORE: OnceCell<HistogramVec> = OnceCell::new();
static AUTHORIZE_DURATION_SECONDS: OnceCell<HistogramVec> = OnceCell::new();
static MANDATES_ISSUED_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();

static DELEGATION_TOKENS_ISSUED_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static DELEGATION_REVOCATIONS_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static DELEGATION_CHAIN_DEPTH: OnceCell<HistogramVec> = OnceCell::new();

static RATE_LIMIT_DENIED_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static ANOMALIES_DETECTED_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static RATE_LIMIT_ACTIVE_WINDOWS: OnceCell<Gauge> = OnceCell::new();

static AUDIT_ENTRIES_APPENDED_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static AUDIT_INTEGRITY_VIOLATIONS_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static AUDIT_APPEND_DURATION_SECONDS: OnceCell<HistogramVec> = OnceCell::new();

static ERRORS_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static SVC_CAPABILITY_RESOLVE_FAIL_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static SVC_DISPATCH_LATENCY_SECONDS: OnceCell<HistogramVec> = OnceCell::new();
static SVC_DISPATCH_ERRORS_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();

#[derive(Debug, Clone, Copy)]
pub struct PrometheusSink;

/// Helper macro to reduce boilerplate for getting a metric from OnceCell.
/// This will panic if `install()` has not been called, which is intentional
/// as it indicates a critical application setup error.
macro_rules! get_metric {
    ($metric:ident) => {
        $metric
            .get()
            .expect("Prometheus sink not initialized. Call telemetry::prometheus::install() first.")
    };
}

impl AuthorizationMetricsSink for PrometheusSink {
    fn inc_decisions_total(&self, decision: &str) {
        get_metric!(DECISIONS_TOTAL)
            .with_label_values(&[decision])
            .inc();
    }
    fn observe_risk_score(&self, score: f64) {
        get_metric!(RISK_SCORE).with_label_values(&[]).observe(score);
    }
    fn observe_authorize_duration(&self, duration_secs: f64) {
        get_metric!(AUTHORIZE_DURATION_SECONDS)
            .with_label_values(&[])
            .observe(duration_secs);
    }
    fn inc_mandates_issued_total(&self) {
        get_metric!(MANDATES_ISSUED_TOTAL)
            .with_label_values(&[])
            .inc();
    }
}

impl DelegationMetricsSink for PrometheusSink {
    fn inc_tokens_issued_total(&self) {
        get_metric!(DELEGATION_TOKENS_ISSUED_TOTAL)
            .with_label_values(&[])
            .inc();
    }
    fn inc_revocations_total(&self, count: u64) {
        get_metric!(DELEGATION_REVOCATIONS_TOTAL)
            .with_label_values(&[])
            .inc_by(count);
    }
    fn observe_chain_depth(&self, depth: f64) {
        get_metric!(DELEGATION_CHAIN_DEPTH)
            .with_label_values(&[])
            .observe(depth);
    }
}

impl RateLimitMetricsSink for PrometheusSink {
    fn inc_rate_limit_denied_total(&self) {
        get_metric!(RATE_LIMIT_DENIED_TOTAL)
            .with_label_values(&[])
            .inc();
    }
    fn inc_anomalies_detected_total(&self) {
        get_metric!(ANOMALIES_DETECTED_TOTAL)
            .with_label_values(&[])
            .inc();
    }
    fn set_active_windows(&self, count: f64) {
        get_metric!(RATE_LIMIT_ACTIVE_WINDOWS).set(count);
    }
}

impl AuditMetricsSink for PrometheusSink {
    fn inc_entries_appended_total(&self, severity: &str) {
        get_metric!(AUDIT_ENTRIES_APPENDED_TOTAL)
            .with_label_values(&[severity])
            .inc();
    }
    fn inc_integrity_violations_total(&self, count: u64) {
        get_metric!(AUDIT_INTEGRITY_VIOLATIONS_TOTAL)
            .with_label_values(&[])
            .inc_by(count);
    }
    fn observe_append_duration(&self, duration_secs: f64) {
        get_metric!(AUDIT_APPEND_DURATION_SECONDS)
            .with_label_values(&[])
            .observe(duration_secs);
    }
}

impl ErrorMetricsSink for PrometheusSink {
    fn inc_error(&self, kind: &'static str, variant: &'static str) {
        get_metric!(ERRORS_TOTAL)
            .with_label_values(&[kind, variant])
            .inc();
    }
}

impl ServiceMetricsSink for PrometheusSink {
    fn inc_capability_resolve_fail(&self, capability: &str) {
        get_metric!(SVC_CAPABILITY_RESOLVE_FAIL_TOTAL)
            .with_label_values(&[capability])
            .inc();
    }
    fn observe_service_dispatch_latency(&self, service_id: &str, method: &str, duration_secs: f64) {
        get_metric!(SVC_DISPATCH_LATENCY_SECONDS)
            .with_label_values(&[service_id, method])
            .observe(duration_secs);
    }
    fn inc_dispatch_error(&self, service_id: &str, method: &str, reason: &'static str) {
        get_metric!(SVC_DISPATCH_ERRORS_TOTAL)
            .with_label_values(&[service_id, method, reason])
            .inc();
    }
}

/// Initializes all Prometheus metrics collectors and returns a static reference to the sink.
/// This function must be called only once at application startup.
#[allow(clippy::expect_used)]
pub fn install() -> Result<&'static dyn MetricsSink, prometheus::Error> {
    DECISIONS_TOTAL
        .set(register_int_counter_vec!(
            "mandate_decisions_total",
            "Total authorization decisions, by outcome.",
            &["decision"]
        )?)
        .expect("static already initialized");
    RISK_SCORE
        .set(register_histogram_vec!(
            "mandate_risk_score",
            "Composed risk score (0-100) of completed authorizations.",
            &[],
            prometheus::linear_buckets(0.0, 10.0, 11)?
        )?)
        .expect("static already initialized");
    AUTHORIZE_DURATION_SECONDS
        .set(register_histogram_vec!(
            "mandate_authorize_duration_seconds",
            "Latency of the Authorize(req) pipeline.",
            &[],
            exponential_buckets(0.001, 2.0, 15)?
        )?)
        .expect("static already initialized");
    MANDATES_ISSUED_TOTAL
        .set(register_int_counter_vec!(
            "mandate_mandates_issued_total",
            "Total mandate tokens minted on ALLOW.",
            &[]
        )?)
        .expect("static already initialized");
    DELEGATION_TOKENS_ISSUED_TOTAL
        .set(register_int_counter_vec!(
            "mandate_delegation_tokens_issued_total",
            "Total delegation tokens minted.",
            &[]
        )?)
        .expect("static already initialized");
    DELEGATION_REVOCATIONS_TOTAL
        .set(register_int_counter_vec!(
            "mandate_delegation_revocations_total",
            "Total delegation tokens revoked, including cascades.",
            &[]
        )?)
        .expect("static already initialized");
    DELEGATION_CHAIN_DEPTH
        .set(register_histogram_vec!(
            "mandate_delegation_chain_depth",
            "Depth of verified delegation chains.",
            &[],
            prometheus::linear_buckets(0.0, 1.0, 12)?
        )?)
        .expect("static already initialized");
    RATE_LIMIT_DENIED_TOTAL
        .set(register_int_counter_vec!(
            "mandate_rate_limit_denied_total",
            "Total requests denied by the sliding-window rate limiter.",
            &[]
        )?)
        .expect("static already initialized");
    ANOMALIES_DETECTED_TOTAL
        .set(register_int_counter_vec!(
            "mandate_anomalies_detected_total",
            "Total anomaly-detector positives (velocity or spend-rate).",
            &[]
        )?)
        .expect("static already initialized");
    RATE_LIMIT_ACTIVE_WINDOWS
        .set(register_gauge!(
            "mandate_rate_limit_active_windows",
            "Current number of agents with a live rate-limit window."
        )?)
        .expect("static already initialized");
    AUDIT_ENTRIES_APPENDED_TOTAL
        .set(register_int_counter_vec!(
            "mandate_audit_entries_appended_total",
            "Total audit entries appended, by severity.",
            &["severity"]
        )?)
        .expect("static already initialized");
    AUDIT_INTEGRITY_VIOLATIONS_TOTAL
        .set(register_int_counter_vec!(
            "mandate_audit_integrity_violations_total",
            "Total per-entry integrity violations found by verify_integrity.",
            &[]
        )?)
        .expect("static already initialized");
    AUDIT_APPEND_DURATION_SECONDS
        .set(register_histogram_vec!(
            "mandate_audit_append_duration_seconds",
            "Latency of a single audit ledger append.",
            &[],
            exponential_buckets(0.0005, 2.0, 14)?
        )?)
        .expect("static already initialized");
    ERRORS_TOTAL
        .set(register_int_counter_vec!(
            "mandate_errors_total",
            "Total number of errors, categorized by type and variant.",
            &["kind", "variant"]
        )?)
        .expect("static already initialized");
    SVC_CAPABILITY_RESOLVE_FAIL_TOTAL
        .set(register_int_counter_vec!(
            "mandate_svc_capability_resolve_fail_total",
            "Total failures to resolve a required capability.",
            &["capability"]
        )?)
        .expect("static already initialized");
    SVC_DISPATCH_LATENCY_SECONDS
        .set(register_histogram_vec!(
            "mandate_service_dispatch_latency_seconds",
            "Latency of dispatched calls into capability implementations.",
            &["service_id", "method"],
            exponential_buckets(0.0001, 2.0, 16)?
        )?)
        .expect("static already initialized");
    SVC_DISPATCH_ERRORS_TOTAL
        .set(register_int_counter_vec!(
            "mandate_service_dispatch_errors_total",
            "Total errors returned from capability dispatch calls.",
            &["service_id", "method", "reason"]
        )?)
        .expect("static already initialized");

    static SINK: PrometheusSink = PrometheusSink;
    Ok(&SINK)
}
