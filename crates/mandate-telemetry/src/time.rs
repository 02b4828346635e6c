// Path: crates/mandate-telemetry/src/time.rs
use crate::sinks::AuthorizationMetricsSink;
use std::time::Instant;

/// RAII timer that reports the elapsed wall-clock time of a scope to
/// `AuthorizationMetricsSink::observe_authorize_duration` when dropped.
pub struct Timer<'a> {
    sink: &'a dyn AuthorizationMetricsSink,
    start: Instant,
}

impl<'a> Timer<'a> {
    pub fn new(sink: &'a dyn AuthorizationMetricsSink) -> Self {
        Self {
            sink,
            start: Instant::now(),
        }
    }
}

impl Drop for Timer<'_> {
    fn drop(&mut self) {
        self.sink
            .observe_authorize_duration(self.start.elapsed().as_secs_f64());
    }
}