//! Core domain types: jobs, results, strategies, extracted page content.

use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::error::{CrawlqError, Result};

/// Error string used for results synthesized by the submitter on timeout.
pub const TIMEOUT_ERROR: &str = "timeout";

/// Error string used when every strategy failed the fetch or the quality gate.
pub const EXHAUSTED_ERROR: &str = "all crawl strategies failed";

// ---------------------------------------------------------------------------
// JobId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for crawl job identifiers (time-sortable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Generate a new time-sortable job identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// CrawlJob
// ---------------------------------------------------------------------------

/// A unit of work on the job queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlJob {
    /// Correlation key between the request and its result.
    pub job_id: JobId,
    /// Absolute http(s) URL to fetch.
    pub url: String,
}

impl CrawlJob {
    /// Validate `raw` and build a job with a fresh identifier.
    pub fn new(raw: &str) -> Result<Self> {
        let url = validate_target_url(raw)?;
        Ok(Self {
            job_id: JobId::new(),
            url: url.to_string(),
        })
    }
}

/// Check that `raw` is an absolute `http://` or `https://` URL.
pub fn validate_target_url(raw: &str) -> Result<Url> {
    let trimmed = raw.trim();
    let lower = trimmed.to_ascii_lowercase();
    if !(lower.starts_with("http://") || lower.starts_with("https://")) {
        return Err(CrawlqError::invalid_url(
            raw,
            "URL must start with http:// or https://",
        ));
    }

    let url = Url::parse(trimmed).map_err(|e| CrawlqError::invalid_url(raw, e.to_string()))?;
    if url.host_str().is_none_or(str::is_empty) {
        return Err(CrawlqError::invalid_url(raw, "URL has no host"));
    }
    Ok(url)
}

// ---------------------------------------------------------------------------
// Strategy
// ---------------------------------------------------------------------------

/// Fetch strategies, in the order the pipeline tries them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Load the target once.
    Direct,
    /// Load the target and give client-side rendering time to finish.
    SpaWithDelay,
    /// Load the site root and click through to the target.
    NavigateFromHome,
}

impl Strategy {
    /// The ladder, cheapest first.
    pub const LADDER: [Strategy; 3] = [
        Strategy::Direct,
        Strategy::SpaWithDelay,
        Strategy::NavigateFromHome,
    ];

    /// The strategy tried after this one, if any.
    pub fn next(self) -> Option<Strategy> {
        match self {
            Strategy::Direct => Some(Strategy::SpaWithDelay),
            Strategy::SpaWithDelay => Some(Strategy::NavigateFromHome),
            Strategy::NavigateFromHome => None,
        }
    }

    /// Wire name, as used in results and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::Direct => "direct",
            Strategy::SpaWithDelay => "spa_with_delay",
            Strategy::NavigateFromHome => "navigate_from_home",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// PageContent
// ---------------------------------------------------------------------------

/// A heading captured during extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heading {
    /// 1 for `<h1>`, 2 for `<h2>`.
    pub level: u8,
    pub text: String,
}

/// Structured content extracted from one rendered page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageContent {
    pub title: String,
    pub description: String,
    pub headings: Vec<Heading>,
    /// Cleaned body text, already truncated to the byte budget.
    pub content: String,
}

impl PageContent {
    /// Length of the cleaned content in characters.
    pub fn content_chars(&self) -> usize {
        self.content.chars().count()
    }
}

// ---------------------------------------------------------------------------
// CrawlResult
// ---------------------------------------------------------------------------

/// Terminal status of a crawl job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlStatus {
    Success,
    Error,
}

/// One entry of the per-job attempt log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub strategy: Strategy,
    /// `passed`, or the reason the attempt was rejected.
    pub outcome: String,
}

/// The structured answer published for a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlResult {
    pub job_id: JobId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub status: CrawlStatus,
    /// Only set on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<Strategy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headings: Vec<Heading>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Only set on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attempts: Vec<AttemptRecord>,
}

impl CrawlResult {
    /// A successful result carrying `page`.
    pub fn success(job: &CrawlJob, strategy: Strategy, page: PageContent) -> Self {
        Self {
            job_id: job.job_id,
            url: Some(job.url.clone()),
            status: CrawlStatus::Success,
            strategy: Some(strategy),
            title: None,
            description: None,
            headings: Vec::new(),
            content: None,
            error: None,
            attempts: Vec::new(),
        }
        .with_page(page)
    }

    /// A failed result with a human-readable reason.
    pub fn failure(job_id: JobId, url: Option<String>, error: impl Into<String>) -> Self {
        Self {
            job_id,
            url,
            status: CrawlStatus::Error,
            strategy: None,
            title: None,
            description: None,
            headings: Vec::new(),
            content: None,
            error: Some(error.into()),
            attempts: Vec::new(),
        }
    }

    /// The synthetic result returned when no answer arrived in time.
    ///
    /// `url` is echoed when the caller still knows what was submitted.
    pub fn timeout(job_id: JobId, url: Option<String>) -> Self {
        Self::failure(job_id, url, TIMEOUT_ERROR)
    }

    /// Attach extracted page fields.
    pub fn with_page(mut self, page: PageContent) -> Self {
        self.title = Some(page.title);
        self.description = Some(page.description);
        self.headings = page.headings;
        self.content = Some(page.content);
        self
    }

    /// Attach the attempt log.
    pub fn with_attempts(mut self, attempts: Vec<AttemptRecord>) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == CrawlStatus::Success
    }

    /// Whether this is the submitter's synthetic timeout result.
    pub fn is_timeout(&self) -> bool {
        self.status == CrawlStatus::Error && self.error.as_deref() == Some(TIMEOUT_ERROR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_page() -> PageContent {
        PageContent {
            title: "Pricing".into(),
            description: "Plans and prices".into(),
            headings: vec![
                Heading {
                    level: 1,
                    text: "Pricing".into(),
                },
                Heading {
                    level: 2,
                    text: "Enterprise".into(),
                },
            ],
            content: "Three plans are available.".into(),
        }
    }

    #[test]
    fn job_id_roundtrip() {
        let id = JobId::new();
        let parsed: JobId = id.to_string().parse().expect("parse JobId");
        assert_eq!(id, parsed);
    }

    #[test]
    fn job_ids_are_unique() {
        let a = JobId::new();
        let b = JobId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn validate_accepts_http_and_https() {
        assert!(validate_target_url("http://example.com").is_ok());
        assert!(validate_target_url("https://example.com/lien-he").is_ok());
        assert!(validate_target_url("HTTPS://Example.com/").is_ok());
    }

    #[test]
    fn validate_rejects_other_schemes() {
        for raw in [
            "example.com",
            "ftp://example.com/file",
            "file:///etc/passwd",
            "javascript:alert(1)",
            "",
            "//example.com/path",
        ] {
            let err = validate_target_url(raw).expect_err(raw);
            assert!(matches!(err, CrawlqError::InvalidUrl { .. }), "{raw}: {err}");
        }
    }

    #[test]
    fn validate_rejects_hostless_url() {
        let err = validate_target_url("http://").unwrap_err();
        assert!(matches!(err, CrawlqError::InvalidUrl { .. }));
    }

    #[test]
    fn crawl_job_new_validates() {
        let job = CrawlJob::new("https://example.com/about").unwrap();
        assert_eq!(job.url, "https://example.com/about");
        assert!(CrawlJob::new("mailto:someone@example.com").is_err());
    }

    #[test]
    fn strategy_ladder_order() {
        assert_eq!(Strategy::LADDER[0], Strategy::Direct);
        assert_eq!(Strategy::Direct.next(), Some(Strategy::SpaWithDelay));
        assert_eq!(
            Strategy::SpaWithDelay.next(),
            Some(Strategy::NavigateFromHome)
        );
        assert_eq!(Strategy::NavigateFromHome.next(), None);
    }

    #[test]
    fn strategy_wire_names() {
        let json = serde_json::to_string(&Strategy::SpaWithDelay).unwrap();
        assert_eq!(json, "\"spa_with_delay\"");
        assert_eq!(Strategy::NavigateFromHome.to_string(), "navigate_from_home");
    }

    #[test]
    fn success_result_serialization() {
        let job = CrawlJob::new("https://example.com/pricing").unwrap();
        let result = CrawlResult::success(&job, Strategy::Direct, sample_page());

        let value = serde_json::to_value(&result).expect("serialize");
        assert_eq!(value["status"], "success");
        assert_eq!(value["strategy"], "direct");
        assert_eq!(value["headings"][1]["level"], 2);
        assert!(value.get("error").is_none());

        let parsed: CrawlResult = serde_json::from_value(value).expect("deserialize");
        assert_eq!(parsed, result);
    }

    #[test]
    fn timeout_result_shape() {
        let result = CrawlResult::timeout(JobId::new(), None);
        assert!(result.is_timeout());
        assert!(!result.is_success());
        assert!(result.strategy.is_none());

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["status"], "error");
        assert_eq!(value["error"], "timeout");
        assert!(value.get("strategy").is_none());
        assert!(value.get("url").is_none());

        let echoed = CrawlResult::timeout(JobId::new(), Some("https://example.com/docs".into()));
        assert!(echoed.is_timeout());
        assert_eq!(echoed.url.as_deref(), Some("https://example.com/docs"));
    }

    #[test]
    fn content_chars_counts_characters_not_bytes() {
        let page = PageContent {
            content: "liên hệ".into(),
            ..Default::default()
        };
        assert_eq!(page.content_chars(), 7);
        assert!(page.content.len() > 7);
    }
}
