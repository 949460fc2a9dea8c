use rand::Rng;
use std::time::Duration;

/// Exponential retry delays with bounded random jitter
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoff {
    base_ms: u64,
    max_ms: u64,
    jitter_percent: u64,
}

impl ExponentialBackoff {
    pub const fn new(base_ms: u64, max_ms: u64) -> Self {
        Self {
            base_ms,
            max_ms,
            jitter_percent: 10,
        }
    }

    pub fn with_jitter(mut self, jitter_percent: u64) -> Self {
        self.jitter_percent = jitter_percent;
        self
    }

    /// Delay before retry number `attempt` (0 = first retry)
    ///
    /// `base * 2^attempt`, capped at `max`, plus up to `jitter_percent` of
    /// the capped delay. The result never exceeds `max`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponential_delay = self
            .base_ms
            .saturating_mul(2u64.saturating_pow(attempt.min(20)));
        let capped_delay = exponential_delay.min(self.max_ms);
        let jitter_span = capped_delay.saturating_mul(self.jitter_percent) / 100;
        let jitter = if jitter_span > 0 {
            rand::thread_rng().gen_range(0..=jitter_span)
        } else {
            0
        };
        Duration::from_millis(capped_delay.saturating_add(jitter).min(self.max_ms))
    }
}
