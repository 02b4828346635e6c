// Path: crates/mandate-telemetry/src/sinks.rs
//! Defines abstract traits for metrics reporting, decoupling core logic from the backend.

use once_cell::sync::OnceCell;

// --- Static Sink Access ---

/// A no-op sink for use in tests or when telemetry is disabled.
#[derive(Debug, Clone, Copy)]
pub struct NopSink;

/// A lazily-initialized static reference to the global `MetricsSink` implementation.
pub static SINK: OnceCell<&'static dyn MetricsSink> = OnceCell::new();
static NOP_SINK: NopSink = NopSink;

/// Returns a static reference to the configured error metrics sink.
/// If no sink has been initialized, it returns a no-op sink.
pub fn error_metrics() -> &'static dyn ErrorMetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

/// Returns a static reference to the configured service metrics sink.
/// If no sink has been initialized, it returns a no-op sink.
pub fn service_metrics() -> &'static dyn ServiceMetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

/// Returns a static reference to the configured authorization metrics sink.
pub fn authorization_metrics() -> &'static dyn AuthorizationMetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

/// Returns a static reference to the configured delegation metrics sink.
pub fn delegation_metrics() -> &'static dyn DelegationMetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

/// Returns a static reference to the configured rate-limit metrics sink.
pub fn rate_limit_metrics() -> &'static dyn RateLimitMetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

/// Returns a static reference to the configured audit metrics sink.
pub fn audit_metrics() -> &'static dyn AuditMetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

// --- Trait Definitions ---

/// A sink for metrics produced by `Orchestrator::authorize` (§4.8).
pub trait AuthorizationMetricsSink: Send + Sync + std::fmt::Debug {
    /// Increments the total number of decisions, labeled by outcome
    /// (`allow|deny|requires_review|frozen`).
    fn inc_decisions_total(&self, decision: &str);
    /// Observes the composed risk score (0-100) of a completed authorization.
    fn observe_risk_score(&self, score: f64);
    /// Observes the wall-clock latency of one `authorize` call.
    fn observe_authorize_duration(&self, duration_secs: f64);
    /// Increments the total number of mandates minted on `ALLOW`.
    fn inc_mandates_issued_total(&self);
}
impl AuthorizationMetricsSink for NopSink {
    fn inc_decisions_total(&self, _decision: &str) {}
    fn observe_risk_score(&self, _score: f64) {}
    fn observe_authorize_duration(&self, _duration_secs: f64) {}
    fn inc_mandates_issued_total(&self) {}
}

/// A sink for metrics related to delegation token minting, chain verification, and revocation.
pub trait DelegationMetricsSink: Send + Sync + std::fmt::Debug {
    /// Increments the total number of delegation tokens minted.
    fn inc_tokens_issued_total(&self);
    /// Increments the total number of tokens revoked (single or cascade).
    fn inc_revocations_total(&self, count: u64);
    /// Observes the depth of a verified delegation chain.
    fn observe_chain_depth(&self, depth: f64);
}
impl DelegationMetricsSink for NopSink {
    fn inc_tokens_issued_total(&self) {}
    fn inc_revocations_total(&self, _count: u64) {}
    fn observe_chain_depth(&self, _depth: f64) {}
}

/// A sink for metrics related to rate limiting and anomaly detection.
pub trait RateLimitMetricsSink: Send + Sync + std::fmt::Debug {
    /// Increments a counter for requests denied by the sliding-window rate limit.
    fn inc_rate_limit_denied_total(&self);
    /// Increments a counter for anomaly-detector positives (velocity or spend-rate).
    fn inc_anomalies_detected_total(&self);
    /// Sets the gauge for the number of agents with a live rate-limit window.
    fn set_active_windows(&self, count: f64);
}
impl RateLimitMetricsSink for NopSink {
    fn inc_rate_limit_denied_total(&self) {}
    fn inc_anomalies_detected_total(&self) {}
    fn set_active_windows(&self, _count: f64) {}
}

/// A sink for metrics related to the audit ledger.
pub trait AuditMetricsSink: Send + Sync + std::fmt::Debug {
    /// Increments the total number of audit entries appended, labeled by severity.
    fn inc_entries_appended_total(&self, severity: &str);
    /// Increments the total number of integrity-check failures found by `verify_integrity`.
    fn inc_integrity_violations_total(&self, count: u64);
    /// Observes the latency of one `append` call.
    fn observe_append_duration(&self, duration_secs: f64);
}
impl AuditMetricsSink for NopSink {
    fn inc_entries_appended_total(&self, _severity: &str) {}
    fn inc_integrity_violations_total(&self, _count: u64) {}
    fn observe_append_duration(&self, _duration_secs: f64) {}
}

/// A sink for recording structured error metrics.
pub trait ErrorMetricsSink: Send + Sync + std::fmt::Debug {
    /// Increments a counter for a specific error, categorized by its kind and variant.
    fn inc_error(&self, kind: &'static str, variant: &'static str);
}
impl ErrorMetricsSink for NopSink {
    fn inc_error(&self, _kind: &'static str, _variant: &'static str) {}
}

/// A sink for service-level metrics related to the capability-dispatch mechanism
/// (calls the orchestrator and its siblings make into `Storage`/`Cache`/`KeyStore`/etc).
pub trait ServiceMetricsSink: Send + Sync + std::fmt::Debug {
    /// Increments a counter when a required capability cannot be resolved.
    fn inc_capability_resolve_fail(&self, capability: &str);
    /// Observes the latency of a dispatched capability call, labeled by capability and method.
    fn observe_service_dispatch_latency(&self, service_id: &str, method: &str, duration_secs: f64);
    /// Increments a counter for errors returned from a capability call, labeled by reason.
    fn inc_dispatch_error(&self, service_id: &str, method: &str, reason: &'static str);
}
impl ServiceMetricsSink for NopSink {
    fn inc_capability_resolve_fail(&self, _capability: &str) {}
    fn observe_service_dispatch_latency(
        &self,
        _service_id: &str,
        _method: &str,
        _duration_secs: f64,
    ) {
    }
    fn inc_dispatch_error(&self, _service_id: &str, _method: &str, _reason: &'static str) {}
}

/// A unified sink that implements all domain-specific traits, providing a single
/// point of implementation for metrics backends like Prometheus.
pub trait MetricsSink:
    AuthorizationMetricsSink
    + DelegationMetricsSink
    + RateLimitMetricsSink
    + AuditMetricsSink
    + ErrorMetricsSink
    + ServiceMetricsSink
{
}

// Blanket implementation to allow any type that implements all sub-traits
// to be used as a `MetricsSink`.
impl<T> MetricsSink for T where
    T: AuthorizationMetricsSink
        + DelegationMetricsSink
        + RateLimitMetricsSink
        + AuditMetricsSink
        + ErrorMetricsSink
        + ServiceMetricsSink
{
}
