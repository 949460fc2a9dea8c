//! The renderer/extractor seam
//!
//! The engine never performs page fetches itself: every page goes through an
//! [`Extractor`], which returns the status, title and outbound links of a URL
//! or an [`ExtractError`]. The default implementation is
//! [`crate::crawler::HttpExtractor`]; tests substitute in-memory fakes.

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

/// What an extractor learned about one page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    /// URL after redirects, if different from the requested URL
    pub final_url: Option<String>,
    pub status_code: u16,
    pub title: Option<String>,
    /// Size of the response body in bytes
    pub content_length: Option<u64>,
    /// Characters of visible text, when the extractor measures it
    pub text_length: Option<usize>,
    /// Outbound links, absolute or relative to the page URL
    pub links: Vec<String>,
    /// Embedded asset URLs (images), absolute or relative to the page URL
    pub assets: Vec<String>,
}

/// A downloaded asset body
#[derive(Debug, Clone, PartialEq)]
pub struct Asset {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Extractor failures, classified for the retry policy
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("extraction failed: {0}")]
    Extraction(String),

    #[error("not supported: {0}")]
    Unsupported(&'static str),
}

impl ExtractError {
    /// Transient failures (timeouts, connection errors, 5xx) are retried
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout | Self::Connection(_) => true,
            Self::Status(code) => (500..=599).contains(code),
            Self::Extraction(_) | Self::Unsupported(_) => false,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status(code) => Some(*code),
            _ => None,
        }
    }
}

/// External page renderer/extractor
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Fetches and extracts one page
    async fn extract(&self, url: &Url) -> Result<Extraction, ExtractError>;

    /// Downloads an asset of at most `max_bytes`
    async fn fetch_asset(&self, url: &Url, max_bytes: u64) -> Result<Asset, ExtractError> {
        let _ = (url, max_bytes);
        Err(ExtractError::Unsupported("asset capture"))
    }
}
