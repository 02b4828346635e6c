// Path: crates/mandate-types/src/ratelimit.rs
//! Per-agent sliding-window rate-limit and nonce-replay bookkeeping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimitWindow {
    pub window_start: DateTime<Utc>,
    pub window_size_ms: i64,
    pub accumulated_spend: f64,
    pub accumulated_count: u64,
}

impl RateLimitWindow {
    pub fn fresh(now: DateTime<Utc>, window_size_ms: i64) -> Self {
        Self {
            window_start: now,
            window_size_ms,
            accumulated_spend: 0.0,
            accumulated_count: 0,
        }
    }

    /// Returns a window valid for `now`, resetting the accumulators if the
    /// window has elapsed. Pure; does not mutate in place so callers can
    /// compare against the pre-reset value when needed.
    pub fn refreshed(&self, now: DateTime<Utc>) -> Self {
        let elapsed_ms = (now - self.window_start).num_milliseconds();
        if elapsed_ms > self.window_size_ms {
            Self::fresh(now, self.window_size_ms)
        } else {
            *self
        }
    }

    pub fn reset_at(&self) -> DateTime<Utc> {
        self.window_start + chrono::Duration::milliseconds(self.window_size_ms)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimitCheck {
    pub allowed: bool,
    pub current_spend: f64,
    pub current_count: u64,
    pub remaining_amount: f64,
    pub remaining_count: u64,
    pub reset_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionHistoryRow {
    pub at: DateTime<Utc>,
    pub amount: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AnomalySignal {
    pub velocity_per_minute: f64,
    pub spend_rate_per_minute: f64,
    pub velocity_exceeded: bool,
    pub spend_rate_exceeded: bool,
}

impl AnomalySignal {
    pub fn is_anomalous(&self) -> bool {
        self.velocity_exceeded || self.spend_rate_exceeded
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NonceRecord {
    pub nonce: String,
    pub expires_at: DateTime<Utc>,
}
