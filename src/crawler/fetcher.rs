//! HTTP extractor implementation
//!
//! This module provides the default [`Extractor`]: a reqwest client that
//! fetches a page, follows redirects, and parses HTML responses with
//! [`parse_html`]. It handles:
//! - Building HTTP clients with proper user agent strings
//! - Redirect handling (reported through `final_url`)
//! - Error classification for the retry policy
//! - Size-capped asset downloads

use crate::config::UserAgentConfig;
use crate::crawler::extractor::{Asset, ExtractError, Extraction, Extractor};
use crate::crawler::parser::parse_html;
use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, redirect::Policy, Client, Response};
use std::time::Duration;
use url::Url;

/// Maximum redirect hops followed per request
pub const MAX_REDIRECTS: usize = 10;

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The user agent configuration
/// * `timeout` - Overall per-request timeout
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use sumi_sitecrawl::config::UserAgentConfig;
/// use sumi_sitecrawl::crawler::build_http_client;
///
/// let client = build_http_client(&UserAgentConfig::default(), Duration::from_secs(30)).unwrap();
/// ```
pub fn build_http_client(config: &UserAgentConfig, timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .redirect(Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches pages over HTTP and extracts title, links and images
#[derive(Debug, Clone)]
pub struct HttpExtractor {
    client: Client,
}

impl HttpExtractor {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds an extractor with its own client
    pub fn from_config(config: &UserAgentConfig, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self::new(build_http_client(config, timeout)?))
    }

    async fn get(&self, url: &Url) -> Result<Response, ExtractError> {
        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(classify_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExtractError::Status(status.as_u16()));
        }
        Ok(response)
    }
}

#[async_trait]
impl Extractor for HttpExtractor {
    async fn extract(&self, url: &Url) -> Result<Extraction, ExtractError> {
        let response = self.get(url).await?;
        let status_code = response.status().as_u16();
        let final_url = response.url().clone();
        let content_type = content_type_of(&response);

        let body = response.bytes().await.map_err(classify_error)?;
        let mut extraction = Extraction {
            final_url: (final_url != *url).then(|| final_url.to_string()),
            status_code,
            content_length: Some(body.len() as u64),
            ..Extraction::default()
        };

        if !is_html(&content_type) {
            tracing::debug!("{} is {}, not following links", url, content_type);
            return Ok(extraction);
        }

        let html = String::from_utf8_lossy(&body);
        let parsed = parse_html(&html, &final_url);
        extraction.title = parsed.title;
        extraction.links = parsed.links;
        extraction.assets = parsed.assets;
        extraction.text_length = Some(parsed.text_length);
        Ok(extraction)
    }

    async fn fetch_asset(&self, url: &Url, max_bytes: u64) -> Result<Asset, ExtractError> {
        let mut response = self.get(url).await?;
        if response.content_length().is_some_and(|len| len > max_bytes) {
            return Err(ExtractError::Extraction(format!(
                "asset exceeds {} bytes",
                max_bytes
            )));
        }
        let content_type = content_type_of(&response);

        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(classify_error)? {
            if (bytes.len() + chunk.len()) as u64 > max_bytes {
                return Err(ExtractError::Extraction(format!(
                    "asset exceeds {} bytes",
                    max_bytes
                )));
            }
            bytes.extend_from_slice(&chunk);
        }

        Ok(Asset {
            bytes,
            content_type,
        })
    }
}

fn content_type_of(response: &Response) -> String {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string()
}

fn is_html(content_type: &str) -> bool {
    let mime = content_type.split(';').next().unwrap_or("").trim();
    mime.eq_ignore_ascii_case("text/html") || mime.eq_ignore_ascii_case("application/xhtml+xml")
}

/// Maps a reqwest error onto the retry classification
fn classify_error(e: reqwest::Error) -> ExtractError {
    if e.is_timeout() {
        ExtractError::Timeout
    } else if e.is_redirect() {
        ExtractError::Extraction(format!("redirect error: {}", e))
    } else if e.is_connect() || e.is_request() || e.is_body() {
        ExtractError::Connection(e.to_string())
    } else {
        ExtractError::Extraction(e.to_string())
    }
}
