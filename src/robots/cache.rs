//! Robots.txt caching implementation
//!
//! A `RobotsRecord` is the cached policy for one host. Records expire after a
//! configurable TTL and must be re-fetched before being trusted again.

use crate::robots::{ParsedRobots, RobotsRule};
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::Instant;

/// Cached robots.txt policy for a host
#[derive(Debug, Clone)]
pub struct RobotsRecord {
    /// `host[:port]` the record applies to
    pub host: String,

    /// Wall-clock time of the fetch, for display
    pub fetched_at: DateTime<Utc>,

    /// Monotonic time of the fetch, for expiry
    loaded_at: Instant,

    robots: ParsedRobots,
}

impl RobotsRecord {
    pub fn new(host: impl Into<String>, robots: ParsedRobots) -> Self {
        Self {
            host: host.into(),
            fetched_at: Utc::now(),
            loaded_at: Instant::now(),
            robots,
        }
    }

    /// Creates the degraded "allow all, no delay" record
    pub fn allow_all(host: impl Into<String>) -> Self {
        Self::new(host, ParsedRobots::allow_all())
    }

    /// Checks if the record is older than `ttl`
    pub fn is_stale(&self, ttl: Duration) -> bool {
        self.age() > ttl
    }

    pub fn age(&self) -> Duration {
        self.loaded_at.elapsed()
    }

    /// Checks if a URL is allowed according to the cached robots.txt
    pub fn is_allowed(&self, url: &str) -> bool {
        self.robots.is_allowed(url)
    }

    pub fn crawl_delay(&self) -> Option<Duration> {
        self.robots.crawl_delay()
    }

    pub fn rules(&self) -> &[RobotsRule] {
        self.robots.rules()
    }

    pub fn sitemaps(&self) -> &[String] {
        self.robots.sitemaps()
    }

    pub fn is_allow_all(&self) -> bool {
        self.robots.is_allow_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_record_goes_stale_after_ttl() {
        let record = RobotsRecord::allow_all("a.test");
        let ttl = Duration::from_secs(60);
        assert!(!record.is_stale(ttl));

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(!record.is_stale(ttl));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(record.is_stale(ttl));
    }

    #[test]
    fn test_record_delegates_to_parsed_robots() {
        let parsed = ParsedRobots::parse(
            "User-agent: *\nDisallow: /private/\nCrawl-delay: 3\nSitemap: https://a.test/s.xml",
            "TestBot",
        );
        let record = RobotsRecord::new("a.test", parsed);
        assert!(!record.is_allowed("https://a.test/private/x"));
        assert!(record.is_allowed("https://a.test/public"));
        assert_eq!(record.crawl_delay(), Some(Duration::from_secs(3)));
        assert_eq!(record.sitemaps().len(), 1);
        assert!(!record.is_allow_all());
    }
}
