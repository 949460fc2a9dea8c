//! Crawler module: job orchestration and page extraction
//!
//! This module contains the core crawling logic, including:
//! - The engine exposing the job lifecycle operations
//! - Per-job orchestration (worker pool, limits, state machine)
//! - The worker loop (scope, robots, rate limiting, retries)
//! - The extractor seam and its default HTTP implementation

mod backoff;
mod engine;
mod extractor;
mod fetcher;
mod orchestrator;
mod parser;
mod worker;

pub use backoff::ExponentialBackoff;
pub use engine::{CrawlEngine, StopOutcome, INTERRUPTED_ERROR};
pub use extractor::{Asset, ExtractError, Extraction, Extractor};
pub use fetcher::{build_http_client, HttpExtractor, MAX_REDIRECTS};
pub use parser::{parse_html, ParsedPage};
