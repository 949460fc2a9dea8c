//! Sumi-Sitecrawl: a polite site crawling engine
//!
//! This crate implements the crawl orchestration core of a site crawler: URL
//! canonicalization, scope enforcement, robots.txt compliance, per-domain rate
//! limiting, a deduplicating breadth-first frontier, durable job persistence
//! and the worker pool that ties them together. Page rendering and content
//! extraction are delegated to an [`crawler::Extractor`] implementation.

pub mod config;
pub mod crawler;
pub mod frontier;
pub mod models;
pub mod ratelimit;
pub mod robots;
pub mod scope;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for crawl engine operations
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Job {0} is still running; stop it before deleting")]
    JobRunning(String),

    #[error("Job {0} is being crawled by another engine")]
    OwnedElsewhere(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(storage::StorageError),

    #[error("Worker failed: {0}")]
    Worker(String),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<storage::StorageError> for CrawlError {
    fn from(e: storage::StorageError) -> Self {
        match e {
            storage::StorageError::JobNotFound(id) => Self::NotFound(id),
            other => Self::Storage(other),
        }
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),
}

/// URL normalization errors
///
/// A link that fails normalization is dropped; it never fails the job.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for crawl engine operations
pub type Result<T> = std::result::Result<T, CrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::EngineConfig;
pub use crawler::{CrawlEngine, Extractor, HttpExtractor, StopOutcome};
pub use models::{Job, JobConfig, JobStatus, PageRecord, ScopePolicy, SkipReason};
pub use url::{normalize_url, Normalizer};
