//! URL handling module for Sumi-Sitecrawl
//!
//! This module provides URL canonicalization, host and registrable-domain
//! extraction, and glob matching for query parameter filters.

mod domain;
mod matcher;
mod normalize;

pub use domain::{extract_host, host_key, registrable_domain};
pub use matcher::matches_glob;
pub use normalize::{normalize_url, Normalizer, DEFAULT_IGNORED_PARAMS};
