//! Per-domain rate limiting
//!
//! This module handles:
//! - Token buckets keyed by domain, shared by every job in the process
//! - Fair FIFO admission for workers contending on one domain
//! - Cancellable waits, so stopping a job unblocks its waiting workers
//! - Merging a job's configured rate with the robots.txt crawl-delay

mod bucket;

pub use bucket::RateBucket;

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// The wait for a token was abandoned because the job was cancelled
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("rate limit wait cancelled")]
pub struct Cancelled;

/// Proof of admission for one request to a domain
#[derive(Debug, Clone)]
pub struct Ticket {
    pub domain: String,
    /// Time spent waiting for the token
    pub waited: Duration,
}

/// Computes the effective request rate for a domain
///
/// Robots crawl-delay can only make the rate stricter: the result is the
/// lower of the configured rate and `1 / crawl_delay`.
pub fn effective_rate(configured: f64, crawl_delay: Option<Duration>) -> f64 {
    match crawl_delay {
        Some(delay) if !delay.is_zero() => configured.min(1.0 / delay.as_secs_f64()),
        _ => configured,
    }
}

/// Process-wide registry of per-domain token buckets
///
/// Each bucket sits behind a fair (FIFO) async mutex. A worker holds the
/// mutex while it sleeps for the next token, so contenders are admitted
/// strictly in arrival order and none can starve.
pub struct RateLimiter {
    buckets: Mutex<HashMap<String, Arc<tokio::sync::Mutex<RateBucket>>>>,
    idle_ttl: Duration,
}

impl RateLimiter {
    /// Creates a limiter; buckets untouched for `idle_ttl` are evicted
    pub fn new(idle_ttl: Duration) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            idle_ttl,
        }
    }

    /// Waits for a token from `domain`'s bucket
    ///
    /// Returns immediately when a token is available. The wait (both for
    /// the bucket and for the refill) ends early with `Cancelled` when
    /// `cancel` fires.
    ///
    /// # Arguments
    ///
    /// * `domain` - Bucket key
    /// * `rate` - Effective rate for this request (see [`effective_rate`])
    /// * `cancel` - The requesting job's cancellation token
    pub async fn acquire(
        &self,
        domain: &str,
        rate: f64,
        cancel: &CancellationToken,
    ) -> Result<Ticket, Cancelled> {
        self.acquire_gated(domain, rate, cancel, async { Some(()) })
            .await
            .map(|(ticket, ())| ticket)
    }

    /// Waits for a token from `domain`'s bucket and for `gate`, taking the
    /// token only once the gate has opened
    ///
    /// The bucket stays held while the gate is pending, so the token is
    /// consumed right before the caller dispatches and a slow gate (such as
    /// a saturated global fetch ceiling) cannot bank tokens for a later
    /// burst. A gate resolving to None counts as cancellation.
    pub async fn acquire_gated<T, G>(
        &self,
        domain: &str,
        rate: f64,
        cancel: &CancellationToken,
        gate: G,
    ) -> Result<(Ticket, T), Cancelled>
    where
        G: Future<Output = Option<T>>,
    {
        let started = Instant::now();
        let bucket = self.bucket(domain, rate);

        let mut guard = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Cancelled),
            guard = bucket.lock() => guard,
        };
        guard.set_rate(rate, Instant::now());
        wait_for_token(&mut guard, cancel).await?;

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Cancelled),
            opened = gate => opened.ok_or(Cancelled)?,
        };

        // Only the holder of the bucket takes tokens, so the one found above
        // is still there
        loop {
            match guard.try_take(Instant::now()) {
                Ok(()) => break,
                Err(_) => wait_for_token(&mut guard, cancel).await?,
            }
        }

        let ticket = Ticket {
            domain: domain.to_string(),
            waited: started.elapsed(),
        };
        Ok((ticket, opened))
    }

    /// Number of buckets currently cached
    pub fn len(&self) -> usize {
        self.buckets.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn bucket(&self, domain: &str, rate: f64) -> Arc<tokio::sync::Mutex<RateBucket>> {
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(bucket) = buckets.get(domain) {
            return Arc::clone(bucket);
        }

        // Evict idle buckets whenever a new one is created. A bucket some
        // caller still holds a handle to is never idle.
        let now = Instant::now();
        let idle_ttl = self.idle_ttl;
        buckets.retain(|_, bucket| {
            if Arc::strong_count(bucket) > 1 {
                return true;
            }
            match bucket.try_lock() {
                Ok(b) => now.saturating_duration_since(b.last_used()) < idle_ttl,
                Err(_) => true,
            }
        });

        let bucket = Arc::new(tokio::sync::Mutex::new(RateBucket::new(domain, rate)));
        buckets.insert(domain.to_string(), Arc::clone(&bucket));
        bucket
    }
}

/// Sleeps until the held bucket has a token to give
async fn wait_for_token(bucket: &mut RateBucket, cancel: &CancellationToken) -> Result<(), Cancelled> {
    loop {
        let wait = bucket.time_to_token(Instant::now());
        if wait.is_zero() {
            return Ok(());
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Cancelled),
            _ = tokio::time::sleep(wait) => {}
        }
    }
}
