//! Scope enforcement
//!
//! Decides whether a canonical URL belongs to a job. Rules are evaluated in
//! priority order:
//! 1. The seed URL (always in scope)
//! 2. Exclude patterns (highest pattern priority)
//! 3. Include patterns
//! 4. The base scope policy (domain, host, path or regex)

use crate::models::{JobConfig, ScopePolicy};
use crate::url::{host_key, registrable_domain};
use crate::ConfigError;
use regex::Regex;
use url::Url;

/// Compiled scope policy for one job
#[derive(Debug, Clone)]
pub struct ScopeFilter {
    seed: Url,
    seed_host: Option<String>,
    seed_domain: Option<String>,
    policy: CompiledPolicy,
    include: Vec<Regex>,
    exclude: Vec<Regex>,
}

#[derive(Debug, Clone)]
enum CompiledPolicy {
    Domain,
    Host,
    Path,
    Regex(Regex),
}

impl ScopeFilter {
    /// Compiles the scope policy of `config` around the canonical `seed`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidPattern` if any regular expression fails
    /// to compile.
    pub fn new(seed: &Url, config: &JobConfig) -> Result<Self, ConfigError> {
        let policy = match &config.scope {
            ScopePolicy::Domain => CompiledPolicy::Domain,
            ScopePolicy::Host => CompiledPolicy::Host,
            ScopePolicy::Path => CompiledPolicy::Path,
            ScopePolicy::Regex(pattern) => CompiledPolicy::Regex(compile(pattern)?),
        };

        Ok(Self {
            seed: seed.clone(),
            seed_host: host_key(seed),
            seed_domain: registrable_domain(seed),
            policy,
            include: compile_all(&config.custom_patterns.include)?,
            exclude: compile_all(&config.custom_patterns.exclude)?,
        })
    }

    /// Returns true if the canonical URL is eligible for crawling
    pub fn in_scope(&self, url: &Url) -> bool {
        if url == &self.seed {
            return true;
        }

        let candidate = url.as_str();
        if self.exclude.iter().any(|re| re.is_match(candidate)) {
            return false;
        }
        if self.include.iter().any(|re| re.is_match(candidate)) {
            return true;
        }

        match &self.policy {
            CompiledPolicy::Domain => {
                self.seed_domain.is_some() && registrable_domain(url) == self.seed_domain
            }
            CompiledPolicy::Host => self.same_host(url),
            CompiledPolicy::Path => self.same_host(url) && is_path_descendant(self.seed.path(), url.path()),
            CompiledPolicy::Regex(re) => re.is_match(candidate),
        }
    }

    /// The canonical seed this filter was built around
    pub fn seed(&self) -> &Url {
        &self.seed
    }

    fn same_host(&self, url: &Url) -> bool {
        self.seed_host.is_some() && host_key(url) == self.seed_host
    }
}

/// Returns true if `path` equals `base` or lies beneath it
///
/// Matching is segment-aware: `/docs` contains `/docs/intro` but not
/// `/docs-old`.
fn is_path_descendant(base: &str, path: &str) -> bool {
    if base == "/" || path == base {
        return true;
    }
    path.strip_prefix(base)
        .map(|rest| rest.starts_with('/'))
        .unwrap_or(false)
}

fn compile(pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern(format!("'{}': {}", pattern, e)))
}

fn compile_all(patterns: &[String]) -> Result<Vec<Regex>, ConfigError> {
    patterns.iter().map(|p| compile(p)).collect()
}
