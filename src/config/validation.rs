use crate::config::types::{EngineConfig, EngineSection, RateLimitConfig, RobotsConfig, UserAgentConfig};
use crate::models::{JobConfig, ScopePolicy};
use crate::url::normalize_url;
use crate::ConfigError;
use regex::Regex;
use url::Url;

/// Inclusive bounds on job parameters
pub const MAX_PAGES_RANGE: (u32, u32) = (1, 5000);
pub const MAX_DURATION_RANGE: (u64, u64) = (60, 43_200);
pub const RATE_LIMIT_RANGE: (f64, f64) = (0.1, 10.0);
pub const CONCURRENCY_RANGE: (u32, u32) = (1, 32);
pub const MAX_DEPTH_LIMIT: u32 = 100;

/// Validates the entire engine configuration
pub fn validate(config: &EngineConfig) -> Result<(), ConfigError> {
    validate_engine_section(&config.engine)?;
    validate_robots_config(&config.robots)?;
    validate_rate_limit_config(&config.rate_limit)?;
    validate_user_agent_config(&config.user_agent)?;
    Ok(())
}

fn validate_engine_section(config: &EngineSection) -> Result<(), ConfigError> {
    if config.data_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation("data_dir cannot be empty".to_string()));
    }

    if config.max_concurrent_fetches < 1 || config.max_concurrent_fetches > 256 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent_fetches must be between 1 and 256, got {}",
            config.max_concurrent_fetches
        )));
    }

    if config.fetch_timeout_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "fetch_timeout_secs must be >= 1, got {}",
            config.fetch_timeout_secs
        )));
    }

    if config.max_retries > 10 {
        return Err(ConfigError::Validation(format!(
            "max_retries must be <= 10, got {}",
            config.max_retries
        )));
    }

    if config.retry_base_delay_ms > config.retry_max_delay_ms {
        return Err(ConfigError::Validation(format!(
            "retry_base_delay_ms ({}) cannot exceed retry_max_delay_ms ({})",
            config.retry_base_delay_ms, config.retry_max_delay_ms
        )));
    }

    if config.progress_interval_secs < 1 {
        return Err(ConfigError::Validation(
            "progress_interval_secs must be >= 1".to_string(),
        ));
    }

    // Live jobs heartbeat on every progress tick
    if config.stale_job_secs < 2 * config.progress_interval_secs {
        return Err(ConfigError::Validation(format!(
            "stale_job_secs ({}) must be at least twice progress_interval_secs ({})",
            config.stale_job_secs, config.progress_interval_secs
        )));
    }

    Ok(())
}

fn validate_robots_config(config: &RobotsConfig) -> Result<(), ConfigError> {
    if config.fetch_timeout_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "robots fetch_timeout_secs must be >= 1, got {}",
            config.fetch_timeout_secs
        )));
    }
    Ok(())
}

fn validate_rate_limit_config(config: &RateLimitConfig) -> Result<(), ConfigError> {
    if config.bucket_idle_secs < 1 {
        return Err(ConfigError::Validation(
            "bucket_idle_secs must be >= 1".to_string(),
        ));
    }
    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // The crawler name doubles as the robots.txt product token
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only letters, digits, '-' and '_', got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates a job configuration before the job is created
///
/// Checks the numeric bounds, that the start URL is a crawlable http(s) URL,
/// and that every regular expression compiles.
pub fn validate_job_config(config: &JobConfig) -> Result<(), ConfigError> {
    normalize_url(&config.start_url, None).map_err(|e| {
        ConfigError::InvalidUrl(format!("Invalid start_url '{}': {}", config.start_url, e))
    })?;

    let (min, max) = MAX_PAGES_RANGE;
    if config.max_pages < min || config.max_pages > max {
        return Err(ConfigError::Validation(format!(
            "max_pages must be between {} and {}, got {}",
            min, max, config.max_pages
        )));
    }

    let (min, max) = MAX_DURATION_RANGE;
    if config.max_duration_secs < min || config.max_duration_secs > max {
        return Err(ConfigError::Validation(format!(
            "max_duration must be between {} and {} seconds, got {}",
            min, max, config.max_duration_secs
        )));
    }

    let (min, max) = RATE_LIMIT_RANGE;
    if !(min..=max).contains(&config.rate_limit) {
        return Err(ConfigError::Validation(format!(
            "rate_limit must be between {} and {} requests/second, got {}",
            min, max, config.rate_limit
        )));
    }

    let (min, max) = CONCURRENCY_RANGE;
    if config.concurrency < min || config.concurrency > max {
        return Err(ConfigError::Validation(format!(
            "concurrency must be between {} and {}, got {}",
            min, max, config.concurrency
        )));
    }

    if let Some(depth) = config.max_depth {
        if depth > MAX_DEPTH_LIMIT {
            return Err(ConfigError::Validation(format!(
                "max_depth must be <= {}, got {}",
                MAX_DEPTH_LIMIT, depth
            )));
        }
    }

    if let ScopePolicy::Regex(pattern) = &config.scope {
        if pattern.is_empty() {
            return Err(ConfigError::InvalidPattern(
                "regex scope requires a non-empty pattern".to_string(),
            ));
        }
        validate_regex(pattern)?;
    }

    for pattern in config
        .custom_patterns
        .include
        .iter()
        .chain(config.custom_patterns.exclude.iter())
    {
        validate_regex(pattern)?;
    }

    if config.ignore_query_params.iter().any(|p| p.is_empty()) {
        return Err(ConfigError::InvalidPattern(
            "ignore_query_params cannot contain empty patterns".to_string(),
        ));
    }

    Ok(())
}

fn validate_regex(pattern: &str) -> Result<(), ConfigError> {
    Regex::new(pattern)
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidPattern(format!("'{}': {}", pattern, e)))
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    // Must contain exactly one @ with text on both sides
    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !parts[1].contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
