// Path: crates/mandate-ratelimit/src/anomaly.rs

//! Velocity and spend-rate anomaly detection (§4.5). Pure over a caller-
//! supplied transaction history; the caller is responsible for sourcing
//! that history (e.g. from `Storage::list_recent_transactions`) since the
//! detector has no storage dependency of its own.

use chrono::{DateTime, Utc};
use mandate_types::config::AnomalyConfig;
use mandate_types::ratelimit::{AnomalySignal, TransactionHistoryRow};

pub struct AnomalyDetector {
    config: AnomalyConfig,
}

impl AnomalyDetector {
    pub fn new(config: AnomalyConfig) -> Self {
        Self { config }
    }

    /// Evaluates `history` against the configured window, counting only
    /// rows that fall within `window_minutes` of `now`. `history` need not
    /// be pre-filtered or sorted.
    pub fn detect(&self, history: &[TransactionHistoryRow], now: DateTime<Utc>) -> AnomalySignal {
        let window_start = now - chrono::Duration::minutes(self.config.window_minutes);
        let in_window: Vec<&TransactionHistoryRow> =
            history.iter().filter(|row| row.at >= window_start && row.at <= now).collect();

        let window_minutes = self.config.window_minutes.max(1) as f64;
        let velocity_per_minute = in_window.len() as f64 / window_minutes;
        let spend_rate_per_minute = in_window.iter().map(|row| row.amount).sum::<f64>() / window_minutes;

        AnomalySignal {
            velocity_per_minute,
            spend_rate_per_minute,
            velocity_exceeded: velocity_per_minute > self.config.velocity_threshold_per_minute,
            spend_rate_exceeded: spend_rate_per_minute > self.config.spend_rate_threshold_per_minute,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(at: DateTime<Utc>, amount: f64) -> TransactionHistoryRow {
        TransactionHistoryRow { at, amount }
    }

    #[test]
    fn quiet_history_is_not_anomalous() {
        let detector = AnomalyDetector::new(AnomalyConfig {
            window_minutes: 5,
            velocity_threshold_per_minute: 5.0,
            spend_rate_threshold_per_minute: 500.0,
            auto_freeze: true,
        });
        let now = Utc::now();
        let history = vec![row(now - chrono::Duration::minutes(1), 50.0)];
        let signal = detector.detect(&history, now);
        assert!(!signal.is_anomalous());
    }

    #[test]
    fn burst_of_transactions_exceeds_velocity() {
        let detector = AnomalyDetector::new(AnomalyConfig {
            window_minutes: 5,
            velocity_threshold_per_minute: 1.0,
            spend_rate_threshold_per_minute: 1_000_000.0,
            auto_freeze: true,
        });
        let now = Utc::now();
        let history: Vec<_> = (0..20)
            .map(|i| row(now - chrono::Duration::seconds(i), 1.0))
            .collect();
        let signal = detector.detect(&history, now);
        assert!(signal.velocity_exceeded);
        assert!(signal.is_anomalous());
    }

    #[test]
    fn large_spend_exceeds_spend_rate_even_with_one_transaction() {
        let detector = AnomalyDetector::new(AnomalyConfig {
            window_minutes: 5,
            velocity_threshold_per_minute: 100.0,
            spend_rate_threshold_per_minute: 10.0,
            auto_freeze: true,
        });
        let now = Utc::now();
        let history = vec![row(now, 10_000.0)];
        let signal = detector.detect(&history, now);
        assert!(signal.spend_rate_exceeded);
        assert!(!signal.velocity_exceeded);
    }

    #[test]
    fn rows_outside_window_are_ignored() {
        let detector = AnomalyDetector::new(AnomalyConfig {
            window_minutes: 5,
            velocity_threshold_per_minute: 0.0,
            spend_rate_threshold_per_minute: 0.0,
            auto_freeze: true,
        });
        let now = Utc::now();
        let history = vec![row(now - chrono::Duration::minutes(30), 10_000.0)];
        let signal = detector.detect(&history, now);
        assert!(!signal.is_anomalous());
    }
}
