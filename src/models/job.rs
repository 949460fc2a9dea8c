use crate::models::JobStatus;
use crate::url::DEFAULT_IGNORED_PARAMS;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Policy deciding which discovered URLs belong to a crawl
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "pattern", rename_all = "lowercase")]
pub enum ScopePolicy {
    /// Same registrable domain as the seed, subdomains included
    #[default]
    Domain,
    /// Exact host (and port) of the seed
    Host,
    /// Seed host, and the seed path or a descendant of it
    Path,
    /// URL matches the given regular expression
    Regex(String),
}

impl ScopePolicy {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Domain => "domain",
            Self::Host => "host",
            Self::Path => "path",
            Self::Regex(_) => "regex",
        }
    }
}

/// Include/exclude regular expressions applied on top of the scope policy
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CustomPatterns {
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// Fixed, validated configuration of one crawl job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    pub start_url: String,

    /// Hard cap on pages found (1-5000)
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,

    /// Soft wall-clock limit in seconds (60-43200)
    #[serde(default = "default_max_duration_secs")]
    pub max_duration_secs: u64,

    #[serde(default)]
    pub scope: ScopePolicy,

    /// Requests per second per domain (0.1-10.0)
    #[serde(default = "default_rate_limit")]
    pub rate_limit: f64,

    #[serde(default = "default_true")]
    pub respect_robots: bool,

    #[serde(default)]
    pub include_assets: bool,

    #[serde(default)]
    pub custom_patterns: CustomPatterns,

    /// Workers serving this job (1-32)
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// Pages at this depth are fetched but their links are not followed
    #[serde(default)]
    pub max_depth: Option<u32>,

    /// Glob patterns of query keys dropped during normalization
    #[serde(default = "default_ignore_query_params")]
    pub ignore_query_params: Vec<String>,
}

impl JobConfig {
    /// Creates a job configuration with default limits for `start_url`
    pub fn new(start_url: impl Into<String>) -> Self {
        Self {
            start_url: start_url.into(),
            max_pages: default_max_pages(),
            max_duration_secs: default_max_duration_secs(),
            scope: ScopePolicy::default(),
            rate_limit: default_rate_limit(),
            respect_robots: true,
            include_assets: false,
            custom_patterns: CustomPatterns::default(),
            concurrency: default_concurrency(),
            max_depth: None,
            ignore_query_params: default_ignore_query_params(),
        }
    }
}

fn default_max_pages() -> u32 {
    1000
}

fn default_max_duration_secs() -> u64 {
    3600
}

fn default_rate_limit() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

fn default_concurrency() -> u32 {
    4
}

fn default_ignore_query_params() -> Vec<String> {
    DEFAULT_IGNORED_PARAMS.iter().map(|p| p.to_string()).collect()
}

/// Progress counters persisted in the manifest
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounters {
    /// URLs admitted to the frontier (seed included)
    pub pages_found: u64,
    /// Unique page records written
    pub pages_crawled: u64,
    /// `pages_found - pages_crawled`
    pub pages_remaining: u64,
    pub pages_ok: u64,
    pub pages_failed: u64,
    pub pages_skipped: u64,
}

impl JobCounters {
    pub fn refresh_remaining(&mut self) {
        self.pages_remaining = self.pages_found.saturating_sub(self.pages_crawled);
    }
}

/// One crawl run, as persisted in its manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    /// Registrable domain of the seed, used for the storage layout
    pub domain: String,
    pub config: JobConfig,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Last time the owning engine reported the job alive
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat_at: Option<DateTime<Utc>>,
    pub counters: JobCounters,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl Job {
    /// Creates a new pending job
    ///
    /// The job id is the first 16 hex characters of SHA-256 over the start
    /// URL and the creation instant.
    pub fn new(config: JobConfig, domain: impl Into<String>) -> Self {
        let created_at = Utc::now();
        let mut hasher = Sha256::new();
        hasher.update(config.start_url.as_bytes());
        hasher.update(b"_");
        hasher.update(
            created_at
                .timestamp_nanos_opt()
                .unwrap_or_else(|| created_at.timestamp_micros())
                .to_string()
                .as_bytes(),
        );
        let id = hex::encode(hasher.finalize())[..16].to_string();

        Self {
            id,
            domain: domain.into(),
            config,
            status: JobStatus::Pending,
            created_at,
            started_at: None,
            finished_at: None,
            heartbeat_at: None,
            counters: JobCounters::default(),
            errors: Vec::new(),
        }
    }

    /// Most recent sign of life from the engine driving this job
    pub fn last_alive(&self) -> DateTime<Utc> {
        self.heartbeat_at
            .or(self.started_at)
            .unwrap_or(self.created_at)
    }

    /// Returns true for an unfinished job that no engine has touched for
    /// longer than `stale_after`
    pub fn is_orphaned(&self, stale_after: chrono::Duration, now: DateTime<Utc>) -> bool {
        !self.status.is_terminal() && now - self.last_alive() > stale_after
    }

    /// Wall-clock time the job has been (or was) running
    pub fn elapsed(&self) -> Option<chrono::Duration> {
        let started = self.started_at?;
        Some(self.finished_at.unwrap_or_else(Utc::now) - started)
    }
}
