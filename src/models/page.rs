use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a page attempt did not produce a successful fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    /// robots.txt disallows the URL for this crawler
    RobotsDisallowed,

    /// URL fell outside the job's scope policy
    OutOfScope,

    /// URL resolved (e.g. via redirect) to a page already recorded
    Duplicate,

    /// Non-retryable HTTP status (4xx)
    HttpStatus,

    /// Transient failures persisted past the retry bound
    RetriesExhausted,

    /// The extractor failed for a reason other than transport
    ExtractionFailed,
}

impl SkipReason {
    /// Returns the persisted string form, e.g. `robots-disallowed`
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RobotsDisallowed => "robots-disallowed",
            Self::OutOfScope => "out-of-scope",
            Self::Duplicate => "duplicate",
            Self::HttpStatus => "http-status",
            Self::RetriesExhausted => "retries-exhausted",
            Self::ExtractionFailed => "extraction-failed",
        }
    }

    /// Returns true if this reason means the page was never fetched
    ///
    /// Skipped pages count toward `pages_skipped`, fetched failures toward
    /// `pages_failed`.
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            Self::RobotsDisallowed | Self::OutOfScope | Self::Duplicate
        )
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The durable result of one fetch attempt for one canonical URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRecord {
    /// Canonical URL (identity key)
    pub url: String,

    /// Link distance from the seed (seed = 0)
    pub depth: u32,

    /// Page on which this URL was discovered; None for the seed
    pub parent: Option<String>,

    pub discovered_at: DateTime<Utc>,

    /// When the attempt finished; None if the page was never fetched
    pub fetched_at: Option<DateTime<Utc>>,

    pub status_code: Option<u16>,

    pub success: bool,

    pub content_length: Option<u64>,

    pub title: Option<String>,

    pub skip_reason: Option<SkipReason>,

    /// Human-readable error detail for failures
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Final URL after redirects, when it differs from `url`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_url: Option<String>,
}

impl PageRecord {
    /// Creates a successful page record
    pub fn success(
        url: impl Into<String>,
        depth: u32,
        parent: Option<String>,
        discovered_at: DateTime<Utc>,
        status_code: u16,
        content_length: Option<u64>,
        title: Option<String>,
    ) -> Self {
        Self {
            url: url.into(),
            depth,
            parent,
            discovered_at,
            fetched_at: Some(Utc::now()),
            status_code: Some(status_code),
            success: true,
            content_length,
            title,
            skip_reason: None,
            error: None,
            final_url: None,
        }
    }

    /// Creates a record for a page that was not fetched successfully
    pub fn failure(
        url: impl Into<String>,
        depth: u32,
        parent: Option<String>,
        discovered_at: DateTime<Utc>,
        reason: SkipReason,
    ) -> Self {
        Self {
            url: url.into(),
            depth,
            parent,
            discovered_at,
            fetched_at: if reason.is_skip() { None } else { Some(Utc::now()) },
            status_code: None,
            success: false,
            content_length: None,
            title: None,
            skip_reason: Some(reason),
            error: None,
            final_url: None,
        }
    }

    /// Attaches an HTTP status code
    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }

    /// Attaches an error message
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Returns true if the page was never fetched (robots, scope, duplicate)
    pub fn is_skipped(&self) -> bool {
        self.skip_reason.map(|r| r.is_skip()).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_reason_strings() {
        assert_eq!(SkipReason::RobotsDisallowed.as_str(), "robots-disallowed");
        assert_eq!(SkipReason::OutOfScope.to_string(), "out-of-scope");
        assert_eq!(
            serde_json::to_string(&SkipReason::RetriesExhausted).unwrap(),
            "\"retries-exhausted\""
        );
    }

    #[test]
    fn test_failure_record_classification() {
        let now = Utc::now();
        let skipped = PageRecord::failure("https://a.test/p", 1, None, now, SkipReason::RobotsDisallowed);
        assert!(!skipped.success);
        assert!(skipped.is_skipped());
        assert!(skipped.fetched_at.is_none());

        let failed = PageRecord::failure("https://a.test/q", 1, None, now, SkipReason::HttpStatus)
            .with_status(404);
        assert!(!failed.is_skipped());
        assert_eq!(failed.status_code, Some(404));
        assert!(failed.fetched_at.is_some());
    }

    #[test]
    fn test_record_json_shape() {
        let record = PageRecord::success(
            "https://a.test/",
            0,
            None,
            Utc::now(),
            200,
            Some(512),
            Some("Home".to_string()),
        );
        let json: serde_json::Value = serde_json::to_value(&record).unwrap();
        assert_eq!(json["url"], "https://a.test/");
        assert_eq!(json["skip_reason"], serde_json::Value::Null);
        assert!(json.get("error").is_none());
    }
}
