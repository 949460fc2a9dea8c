use serde::Deserialize;
use std::path::PathBuf;

/// Engine-wide configuration for Sumi-Sitecrawl
///
/// Every section and field has a default, so an empty file (or no file at
/// all) yields a working configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub robots: RobotsConfig,
    #[serde(default, rename = "rate-limit")]
    pub rate_limit: RateLimitConfig,
    #[serde(default, rename = "user-agent")]
    pub user_agent: UserAgentConfig,
}

/// Process-wide crawl engine settings
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    /// Root directory holding the `crawls/` tree and the job registry
    #[serde(rename = "data-dir", default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Ceiling on concurrent fetches across all jobs
    #[serde(rename = "max-concurrent-fetches", default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: u32,

    /// Timeout for a single extractor call (seconds)
    #[serde(rename = "fetch-timeout-secs", default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Retries after the first attempt for transient failures
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay of the exponential retry backoff (milliseconds)
    #[serde(rename = "retry-base-delay-ms", default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Upper bound on a single retry delay (milliseconds)
    #[serde(rename = "retry-max-delay-ms", default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,

    /// How often a running job logs its progress (seconds)
    #[serde(rename = "progress-interval-secs", default = "default_progress_interval_secs")]
    pub progress_interval_secs: u64,

    /// Age of a job's last heartbeat after which no engine is considered to
    /// own it any more (seconds)
    #[serde(rename = "stale-job-secs", default = "default_stale_job_secs")]
    pub stale_job_secs: u64,

    /// Largest asset body that will be written to disk (bytes)
    #[serde(rename = "max-asset-bytes", default = "default_max_asset_bytes")]
    pub max_asset_bytes: u64,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            max_concurrent_fetches: default_max_concurrent_fetches(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            progress_interval_secs: default_progress_interval_secs(),
            stale_job_secs: default_stale_job_secs(),
            max_asset_bytes: default_max_asset_bytes(),
        }
    }
}

/// Robots.txt cache settings
#[derive(Debug, Clone, Deserialize)]
pub struct RobotsConfig {
    /// Age after which a cached robots record is re-fetched (seconds)
    #[serde(rename = "cache-ttl-secs", default = "default_robots_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Timeout for fetching robots.txt (seconds)
    #[serde(rename = "fetch-timeout-secs", default = "default_robots_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

impl Default for RobotsConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_robots_ttl_secs(),
            fetch_timeout_secs: default_robots_fetch_timeout_secs(),
        }
    }
}

/// Rate limiter settings
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Buckets unused for this long are evicted (seconds)
    #[serde(rename = "bucket-idle-secs", default = "default_bucket_idle_secs")]
    pub bucket_idle_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            bucket_idle_secs: default_bucket_idle_secs(),
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler, also the robots.txt product token
    #[serde(rename = "crawler-name", default = "default_crawler_name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version", default = "default_crawler_version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url", default = "default_contact_url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email", default = "default_contact_email")]
    pub contact_email: String,
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: default_crawler_name(),
            crawler_version: default_crawler_version(),
            contact_url: default_contact_url(),
            contact_email: default_contact_email(),
        }
    }
}

impl UserAgentConfig {
    /// Builds the full User-Agent header value
    ///
    /// Format: `{name}/{version} (+{url}; {email})`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_max_concurrent_fetches() -> u32 {
    16
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_base_delay_ms() -> u64 {
    500
}

fn default_retry_max_delay_ms() -> u64 {
    10_000
}

fn default_progress_interval_secs() -> u64 {
    10
}

fn default_stale_job_secs() -> u64 {
    60
}

fn default_max_asset_bytes() -> u64 {
    20 * 1024 * 1024
}

fn default_robots_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_robots_fetch_timeout_secs() -> u64 {
    10
}

fn default_bucket_idle_secs() -> u64 {
    300
}

fn default_crawler_name() -> String {
    "SumiSitecrawl".to_string()
}

fn default_crawler_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_contact_url() -> String {
    "https://example.com/crawler".to_string()
}

fn default_contact_email() -> String {
    "crawler@example.com".to_string()
}
