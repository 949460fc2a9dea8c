//! Shared fixtures for the engine integration tests
//!
//! `FakeSite` is an in-memory `Extractor` serving a synthetic site graph, so
//! the engine can be driven end-to-end without a real web server.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use sumi_sitecrawl::crawler::{Asset, ExtractError, Extraction, Extractor};
use sumi_sitecrawl::{EngineConfig, JobConfig};
use url::Url;

#[derive(Debug, Clone, Default)]
pub struct FakePage {
    pub title: Option<String>,
    pub links: Vec<String>,
    pub assets: Vec<String>,
    pub final_url: Option<String>,
}

/// Synthetic site graph keyed by canonical URL
#[derive(Default)]
pub struct FakeSite {
    pages: HashMap<String, FakePage>,
    assets: HashMap<String, Vec<u8>>,
    failures: Mutex<HashMap<String, VecDeque<ExtractError>>>,
    calls: Mutex<Vec<(String, Instant)>>,
    delay: Option<Duration>,
    host_delays: HashMap<String, Duration>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

/// Counts an extraction as in flight until dropped
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FakeSite {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a page linking to `links`
    pub fn page(mut self, url: &str, links: &[&str]) -> Self {
        self.pages.insert(
            url.to_string(),
            FakePage {
                title: Some(format!("Title of {}", url)),
                links: links.iter().map(|l| l.to_string()).collect(),
                ..FakePage::default()
            },
        );
        self
    }

    pub fn custom_page(mut self, url: &str, page: FakePage) -> Self {
        self.pages.insert(url.to_string(), page);
        self
    }

    pub fn asset(mut self, url: &str, bytes: &[u8]) -> Self {
        self.assets.insert(url.to_string(), bytes.to_vec());
        self
    }

    /// Makes the next extractions of `url` fail with `errors`, in order
    pub fn failing(self, url: &str, errors: Vec<ExtractError>) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert(url.to_string(), errors.into());
        self
    }

    /// Delays every extraction, to keep jobs running for a while
    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Delays extractions of pages on `host` only
    pub fn slow_host(mut self, host: &str, delay: Duration) -> Self {
        self.host_delays.insert(host.to_string(), delay);
        self
    }

    /// URLs passed to `extract`, in call order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(url, _)| url.clone()).collect()
    }

    /// Instants at which pages on `host` were dispatched
    pub fn dispatches_to(&self, host: &str) -> Vec<Instant> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(url, _)| {
                Url::parse(url)
                    .map(|u| u.host_str() == Some(host))
                    .unwrap_or(false)
            })
            .map(|(_, at)| *at)
            .collect()
    }

    /// Highest number of simultaneous `extract` calls seen
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, url: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == url).count()
    }
}

#[async_trait]
impl Extractor for FakeSite {
    async fn extract(&self, url: &Url) -> Result<Extraction, ExtractError> {
        self.calls.lock().unwrap().push((url.to_string(), Instant::now()));
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _in_flight = InFlight(&self.in_flight);
        self.peak_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);

        let delay = url
            .host_str()
            .and_then(|host| self.host_delays.get(host).copied())
            .or(self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self
            .failures
            .lock()
            .unwrap()
            .get_mut(url.as_str())
            .and_then(|queue| queue.pop_front());
        if let Some(error) = scripted {
            return Err(error);
        }

        let page = self
            .pages
            .get(url.as_str())
            .ok_or(ExtractError::Status(404))?;
        Ok(Extraction {
            final_url: page.final_url.clone(),
            status_code: 200,
            title: page.title.clone(),
            content_length: Some(512),
            text_length: Some(100),
            links: page.links.clone(),
            assets: page.assets.clone(),
        })
    }

    async fn fetch_asset(&self, url: &Url, max_bytes: u64) -> Result<Asset, ExtractError> {
        let bytes = self
            .assets
            .get(url.as_str())
            .ok_or(ExtractError::Status(404))?;
        if bytes.len() as u64 > max_bytes {
            return Err(ExtractError::Extraction("too large".to_string()));
        }
        Ok(Asset {
            bytes: bytes.clone(),
            content_type: "image/png".to_string(),
        })
    }
}

/// Engine configuration rooted in `data_dir` with fast retries
pub fn engine_config(data_dir: &Path) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.engine.data_dir = data_dir.to_path_buf();
    config.engine.retry_base_delay_ms = 10;
    config.engine.retry_max_delay_ms = 50;
    config.engine.fetch_timeout_secs = 5;
    config.engine.progress_interval_secs = 1;
    config.robots.fetch_timeout_secs = 2;
    config
}

/// Largest number of `instants` falling in any window of length `window`
pub fn max_in_window(instants: &[Instant], window: Duration) -> usize {
    let mut sorted = instants.to_vec();
    sorted.sort();
    (0..sorted.len())
        .map(|i| sorted[i..].iter().take_while(|t| **t < sorted[i] + window).count())
        .max()
        .unwrap_or(0)
}

/// Job configuration that ignores robots.txt and crawls at full speed
pub fn job_config(start_url: &str) -> JobConfig {
    let mut config = JobConfig::new(start_url);
    config.rate_limit = 10.0;
    config.respect_robots = false;
    config
}
