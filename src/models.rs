//! Core data models used throughout job-alert.
//!
//! These types represent the postings, per-source outcomes, and run
//! summaries that flow through the notification pipeline.

use chrono::{DateTime, SubsecRound, Utc};

/// One job listing scraped from a source board.
///
/// Identity for deduplication is the pair `(source, source_post_id)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posting {
    pub source: String,
    pub source_post_id: String,
    pub title: String,
    pub url: String,
    pub posted_at_raw: Option<String>,
    pub content_snippet: String,
    pub fetched_at: DateTime<Utc>,
}

impl Posting {
    /// Build a posting stamped with the current time (whole seconds).
    pub fn new(
        source: impl Into<String>,
        source_post_id: impl Into<String>,
        title: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            source_post_id: source_post_id.into(),
            title: title.into(),
            url: url.into(),
            posted_at_raw: None,
            content_snippet: String::new(),
            fetched_at: Utc::now().trunc_subsecs(0),
        }
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.content_snippet = snippet.into();
        self
    }

    /// Dedup key used by the sent-postings ledger.
    pub fn key(&self) -> (&str, &str) {
        (&self.source, &self.source_post_id)
    }
}

/// Outcome of fetching one source.
///
/// `error` present means the fetch failed; a source may succeed with
/// zero postings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteResult {
    pub source: String,
    pub postings: Vec<Posting>,
    pub error: Option<String>,
}

impl SiteResult {
    pub fn ok(source: impl Into<String>, postings: Vec<Posting>) -> Self {
        Self {
            source: source.into(),
            postings,
            error: None,
        }
    }

    pub fn failed(source: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            postings: Vec::new(),
            error: Some(error.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Summary of one pipeline run, returned to the CLI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineResult {
    pub total_collected: usize,
    pub keyword_matched: usize,
    pub new_count: usize,
    pub success_site_count: usize,
    pub failed_site_count: usize,
    pub error_messages: Vec<String>,
    pub message_sent: bool,
    pub summary_text: Option<String>,
}

impl PipelineResult {
    /// True when at least one source ran and none of them succeeded.
    pub fn all_sources_failed(&self) -> bool {
        self.failed_site_count > 0 && self.success_site_count == 0
    }
}
