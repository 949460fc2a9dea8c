//! Robots.txt handling module
//!
//! This module provides fetching, parsing, and caching of robots.txt files.
//! The cache is shared by every job in the process: politeness is a property
//! of the target host, not of a single crawl.

mod cache;
mod parser;

pub use cache::RobotsRecord;
pub use parser::{ParsedRobots, RobotsRule};

use crate::url::host_key;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

/// Hosts kept before stale entries are pruned
const MAX_CACHED_HOSTS: usize = 1024;

type Slot = Arc<tokio::sync::Mutex<Option<Arc<RobotsRecord>>>>;

/// Fetches and caches robots.txt policy per origin
///
/// Each origin has its own async slot. The first caller to find the slot
/// empty or stale performs the fetch while holding the slot; concurrent
/// callers for the same origin wait on it and reuse the result, so at most
/// one robots.txt request per origin is ever in flight.
pub struct RobotsManager {
    client: Client,
    agent: String,
    ttl: Duration,
    fetch_timeout: Duration,
    slots: Mutex<HashMap<String, Slot>>,
}

impl RobotsManager {
    /// Creates a new manager
    ///
    /// # Arguments
    ///
    /// * `client` - HTTP client carrying the crawler's User-Agent header
    /// * `agent` - Product token matched against `User-agent` lines
    /// * `ttl` - Age after which a cached record is re-fetched
    /// * `fetch_timeout` - Timeout for one robots.txt request
    pub fn new(client: Client, agent: impl Into<String>, ttl: Duration, fetch_timeout: Duration) -> Self {
        Self {
            client,
            agent: agent.into(),
            ttl,
            fetch_timeout,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Checks if a canonical URL may be fetched
    ///
    /// Always true when `respect_robots` is false.
    pub async fn is_allowed(&self, url: &Url, respect_robots: bool) -> bool {
        if !respect_robots {
            return true;
        }
        match self.record(url).await {
            Some(record) => record.is_allowed(url.as_str()),
            None => true,
        }
    }

    /// Returns the robots crawl-delay of the URL's host
    ///
    /// Always None when `respect_robots` is false.
    pub async fn crawl_delay(&self, url: &Url, respect_robots: bool) -> Option<Duration> {
        if !respect_robots {
            return None;
        }
        self.record(url).await.and_then(|r| r.crawl_delay())
    }

    /// Returns the sitemap URLs advertised by the URL's host
    pub async fn sitemaps(&self, url: &Url) -> Vec<String> {
        self.record(url)
            .await
            .map(|r| r.sitemaps().to_vec())
            .unwrap_or_default()
    }

    /// Returns the fresh record for the URL's origin, fetching if needed
    ///
    /// Returns None only for URLs without a host.
    pub async fn record(&self, url: &Url) -> Option<Arc<RobotsRecord>> {
        let host = host_key(url)?;
        let origin = url.origin().ascii_serialization();
        let slot = self.slot(&origin);

        let mut guard = slot.lock().await;
        if let Some(record) = guard.as_ref() {
            if !record.is_stale(self.ttl) {
                return Some(Arc::clone(record));
            }
            tracing::debug!("robots.txt for {} is stale, refreshing", origin);
        }

        let record = Arc::new(self.fetch(&origin, &host).await);
        *guard = Some(Arc::clone(&record));
        Some(record)
    }

    fn slot(&self, origin: &str) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(slot) = slots.get(origin) {
            return Arc::clone(slot);
        }

        if slots.len() >= MAX_CACHED_HOSTS {
            let ttl = self.ttl;
            slots.retain(|_, slot| match slot.try_lock() {
                Ok(entry) => entry.as_ref().map(|r| !r.is_stale(ttl)).unwrap_or(false),
                Err(_) => true,
            });
        }

        let slot: Slot = Arc::new(tokio::sync::Mutex::new(None));
        slots.insert(origin.to_string(), Arc::clone(&slot));
        slot
    }

    /// Fetches robots.txt; every failure degrades to allow-all
    async fn fetch(&self, origin: &str, host: &str) -> RobotsRecord {
        let robots_url = format!("{}/robots.txt", origin);
        tracing::debug!("Fetching {}", robots_url);

        let response = match self
            .client
            .get(&robots_url)
            .timeout(self.fetch_timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Failed to fetch {}: {}; allowing all", robots_url, e);
                return RobotsRecord::allow_all(host);
            }
        };

        let status = response.status();
        if status.is_server_error() {
            tracing::warn!("{} returned {}; allowing all", robots_url, status);
            return RobotsRecord::allow_all(host);
        }
        if !status.is_success() {
            // A missing robots.txt (404 and other 4xx) places no restrictions
            tracing::debug!("{} returned {}; no restrictions", robots_url, status);
            return RobotsRecord::allow_all(host);
        }

        match response.text().await {
            Ok(body) => {
                let parsed = ParsedRobots::parse(&body, &self.agent);
                tracing::debug!(
                    "Parsed {}: {} rules, crawl-delay {:?}",
                    robots_url,
                    parsed.rules().len(),
                    parsed.crawl_delay()
                );
                RobotsRecord::new(host, parsed)
            }
            Err(e) => {
                tracing::warn!("Failed to read {}: {}; allowing all", robots_url, e);
                RobotsRecord::allow_all(host)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn manager(ttl: Duration) -> RobotsManager {
        RobotsManager::new(Client::new(), "TestBot", ttl, Duration::from_secs(5))
    }

    fn url(server: &MockServer, p: &str) -> Url {
        Url::parse(&format!("{}{}", server.uri(), p)).unwrap()
    }

    #[tokio::test]
    async fn test_disallowed_path_is_blocked() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "User-agent: *\nDisallow: /private/\nCrawl-delay: 2\nSitemap: https://a.test/sitemap.xml",
            ))
            .mount(&server)
            .await;

        let robots = manager(Duration::from_secs(3600));
        assert!(!robots.is_allowed(&url(&server, "/private/page"), true).await);
        assert!(robots.is_allowed(&url(&server, "/public"), true).await);
        assert!(robots.is_allowed(&url(&server, "/private/page"), false).await);
        assert_eq!(
            robots.crawl_delay(&url(&server, "/"), true).await,
            Some(Duration::from_secs(2))
        );
        assert_eq!(robots.crawl_delay(&url(&server, "/"), false).await, None);
        assert_eq!(
            robots.sitemaps(&url(&server, "/")).await,
            vec!["https://a.test/sitemap.xml".to_string()]
        );
    }

    #[tokio::test]
    async fn test_missing_robots_allows_all() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let robots = manager(Duration::from_secs(3600));
        assert!(robots.is_allowed(&url(&server, "/anything"), true).await);
    }

    #[tokio::test]
    async fn test_server_error_degrades_to_allow_all() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let robots = manager(Duration::from_secs(3600));
        assert!(robots.is_allowed(&url(&server, "/private/page"), true).await);
        let record = robots.record(&url(&server, "/")).await.unwrap();
        assert!(record.is_allow_all());
        assert_eq!(record.crawl_delay(), None);
    }

    #[tokio::test]
    async fn test_unreachable_host_degrades_to_allow_all() {
        let robots = manager(Duration::from_secs(3600));
        // Port 9 (discard) on localhost is closed in test environments
        let target = Url::parse("http://127.0.0.1:9/page").unwrap();
        assert!(robots.is_allowed(&target, true).await);
    }

    #[tokio::test]
    async fn test_concurrent_lookups_share_one_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("User-agent: *\nDisallow: /x")
                    .set_delay(Duration::from_millis(200)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let robots = Arc::new(manager(Duration::from_secs(3600)));
        let mut handles = Vec::new();
        for i in 0..8 {
            let robots = Arc::clone(&robots);
            let target = url(&server, &format!("/page{}", i));
            handles.push(tokio::spawn(async move { robots.is_allowed(&target, true).await }));
        }
        for handle in handles {
            assert!(handle.await.unwrap());
        }
        // MockServer verifies `expect(1)` on drop
    }

    #[tokio::test]
    async fn test_stale_record_is_refetched() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow:"))
            .expect(2)
            .mount(&server)
            .await;

        let robots = manager(Duration::from_millis(50));
        robots.record(&url(&server, "/")).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        robots.record(&url(&server, "/")).await;
    }
}
