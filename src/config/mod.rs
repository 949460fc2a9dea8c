//! Configuration module for Sumi-Sitecrawl
//!
//! This module handles loading, parsing, and validating the engine's TOML
//! configuration file, and validating per-job configuration at StartJob.
//!
//! # Example
//!
//! ```no_run
//! use sumi_sitecrawl::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("sitecrawl.toml")).unwrap();
//! println!("Global fetch ceiling: {}", config.engine.max_concurrent_fetches);
//! ```

mod parser;
mod types;
mod validation;

pub use types::{EngineConfig, EngineSection, RateLimitConfig, RobotsConfig, UserAgentConfig};

pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::{
    validate, validate_job_config, CONCURRENCY_RANGE, MAX_DEPTH_LIMIT, MAX_DURATION_RANGE,
    MAX_PAGES_RANGE, RATE_LIMIT_RANGE,
};
