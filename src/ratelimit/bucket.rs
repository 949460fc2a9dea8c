use std::time::Duration;
use tokio::time::Instant;

/// Per-domain token bucket
///
/// Refill is lazy: tokens are recomputed from elapsed time whenever the
/// bucket is touched, never by a background timer. Tokens never exceed
/// capacity.
#[derive(Debug, Clone)]
pub struct RateBucket {
    pub domain: String,
    capacity: f64,
    tokens: f64,
    last_refill: Instant,
    /// Refill rate in tokens per second
    rate: f64,
    last_used: Instant,
}

impl RateBucket {
    /// Creates a full bucket
    ///
    /// Capacity is `max(1, floor(rate))`, so a bucket always admits at least
    /// one request immediately.
    pub fn new(domain: impl Into<String>, rate: f64) -> Self {
        let now = Instant::now();
        let capacity = capacity_for(rate);
        Self {
            domain: domain.into(),
            capacity,
            tokens: capacity,
            last_refill: now,
            rate,
            last_used: now,
        }
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    pub fn last_used(&self) -> Instant {
        self.last_used
    }

    /// Brings the token count up to date at `now`
    pub fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity);
        self.last_refill = now;
    }

    /// Switches the bucket to a new refill rate
    ///
    /// Time elapsed so far is credited at the old rate first.
    pub fn set_rate(&mut self, rate: f64, now: Instant) {
        if (rate - self.rate).abs() < f64::EPSILON {
            return;
        }
        self.refill(now);
        self.rate = rate;
        self.capacity = capacity_for(rate);
        self.tokens = self.tokens.min(self.capacity);
    }

    /// Time until a token is available, zero if one is available now
    ///
    /// Does not consume anything.
    pub fn time_to_token(&mut self, now: Instant) -> Duration {
        self.refill(now);
        if self.tokens >= 1.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64((1.0 - self.tokens) / self.rate)
        }
    }

    /// Takes one token, or reports how long until one is available
    pub fn try_take(&mut self, now: Instant) -> Result<(), Duration> {
        self.last_used = now;
        let wait = self.time_to_token(now);
        if wait.is_zero() {
            self.tokens -= 1.0;
            Ok(())
        } else {
            Err(wait)
        }
    }
}

fn capacity_for(rate: f64) -> f64 {
    rate.floor().max(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_capacity_is_floor_of_rate_at_least_one() {
        assert_eq!(RateBucket::new("a", 0.5).capacity(), 1.0);
        assert_eq!(RateBucket::new("a", 1.0).capacity(), 1.0);
        assert_eq!(RateBucket::new("a", 3.7).capacity(), 3.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_then_wait() {
        let mut bucket = RateBucket::new("a.test", 2.0);
        let now = Instant::now();
        assert!(bucket.try_take(now).is_ok());
        assert!(bucket.try_take(now).is_ok());
        let wait = bucket.try_take(now).unwrap_err();
        assert_eq!(wait, Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_time_to_token_does_not_consume() {
        let mut bucket = RateBucket::new("a.test", 1.0);
        let now = Instant::now();
        assert_eq!(bucket.time_to_token(now), Duration::ZERO);
        assert_eq!(bucket.time_to_token(now), Duration::ZERO);
        bucket.try_take(now).unwrap();
        assert_eq!(bucket.time_to_token(now), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_never_exceeds_capacity() {
        let mut bucket = RateBucket::new("a.test", 2.0);
        let start = Instant::now();
        bucket.try_take(start).unwrap();
        bucket.refill(start + Duration::from_secs(60));
        assert_eq!(bucket.tokens(), 2.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_change_credits_old_rate_first() {
        let mut bucket = RateBucket::new("a.test", 1.0);
        let start = Instant::now();
        bucket.try_take(start).unwrap();
        assert_eq!(bucket.tokens(), 0.0);

        // Half a second at 1/s yields 0.5 tokens before the switch to 4/s
        bucket.set_rate(4.0, start + Duration::from_millis(500));
        assert!((bucket.tokens() - 0.5).abs() < 1e-9);
        assert_eq!(bucket.capacity(), 4.0);
        let wait = bucket
            .try_take(start + Duration::from_millis(500))
            .unwrap_err();
        assert_eq!(wait, Duration::from_millis(125));
    }
}
