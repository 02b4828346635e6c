// Path: crates/mandate-types/src/config.rs
//! Configuration options recognized by the core (§6).
//!
//! Every field has a default matching the spec's documented default so a
//! deployment can override just the handful of knobs it cares about.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyStoreConfig {
    pub master_key_secret: String,
    pub master_key_salt: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MandateConfig {
    pub default_ttl_seconds: i64,
    pub max_ttl_seconds: i64,
    pub accept_legacy: bool,
}

impl Default for MandateConfig {
    fn default() -> Self {
        Self {
            default_ttl_seconds: 300,
            max_ttl_seconds: 300,
            accept_legacy: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DelegationConfig {
    pub default_ttl_seconds: i64,
    pub max_depth: u32,
}

impl Default for DelegationConfig {
    fn default() -> Self {
        Self {
            default_ttl_seconds: 86_400,
            max_depth: 8,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub window_size_ms: i64,
    pub max_amount: f64,
    pub max_transactions: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_size_ms: 86_400_000, // 24h daily window
            max_amount: 5_000.0,
            max_transactions: 200,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AnomalyConfig {
    pub window_minutes: i64,
    pub velocity_threshold_per_minute: f64,
    pub spend_rate_threshold_per_minute: f64,
    pub auto_freeze: bool,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            window_minutes: 5,
            velocity_threshold_per_minute: 5.0,
            spend_rate_threshold_per_minute: 500.0,
            auto_freeze: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SemanticConfig {
    pub enabled: bool,
    pub threshold: f64,
    pub cache_ttl_seconds: u64,
    pub fail_closed: bool,
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 0.7,
            cache_ttl_seconds: 300,
            fail_closed: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AuditConfig {
    pub retention_years: u32,
    pub merkle_interval_seconds: u64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            retention_years: 7,
            merkle_interval_seconds: 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelConfig {
    pub key_store: KeyStoreConfig,
    #[serde(default)]
    pub mandate: MandateConfig,
    #[serde(default)]
    pub delegation: DelegationConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub anomaly: AnomalyConfig,
    #[serde(default)]
    pub semantic: SemanticConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub global_freeze_enabled: bool,
    /// Agent-resolution cache TTL; see Identity Registry (§4.2).
    #[serde(default = "default_agent_cache_ttl_seconds")]
    pub agent_cache_ttl_seconds: u64,
}

fn default_agent_cache_ttl_seconds() -> u64 {
    300
}
