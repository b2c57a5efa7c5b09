//! Capabilities the pipeline is built from.
//!
//! The orchestrator never names a concrete site, webhook, or clock. It is
//! handed an ordered [`SourceRegistry`], a [`Sender`], and a [`Clock`] at
//! construction time, which keeps every decision testable with fakes.
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │             SourceRegistry               │
//! │  ┌──────────┐ ┌─────────┐ ┌───────────┐  │
//! │  │ woorimel │ │ melbsky │ │ hojubada  │  │
//! │  └──────────┘ └─────────┘ └───────────┘  │
//! └──────────────┬───────────────────────────┘
//!                ▼
//!        Pipeline::run() ──▶ Sender (Slack)
//! ```

use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::Settings;
use crate::error::SendError;
use crate::models::SiteResult;

// ═══════════════════════════════════════════════════════════════════════
// Source Trait
// ═══════════════════════════════════════════════════════════════════════

/// A job board the pipeline scrapes.
///
/// # Contract
///
/// Ordinary network, parse, and authentication problems must be reported
/// through [`SiteResult::failed`], not as `Err`. An `Err` (or a panic) is
/// treated as an unexpected fault: the retry runner catches it and turns it
/// into a failed result so one broken source never aborts the run.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use anyhow::Result;
/// use job_alert::config::Settings;
/// use job_alert::models::{Posting, SiteResult};
/// use job_alert::traits::Source;
///
/// pub struct StaticBoard;
///
/// #[async_trait]
/// impl Source for StaticBoard {
///     fn name(&self) -> &str { "static" }
///     fn description(&self) -> &str { "Always returns one posting" }
///
///     async fn fetch(&self, _settings: &Settings) -> Result<SiteResult> {
///         let post = Posting::new("static", "1", "Casual labour", "https://example.com/1");
///         Ok(SiteResult::ok("static", vec![post]))
///     }
/// }
/// ```
#[async_trait]
pub trait Source: Send + Sync {
    /// Source identifier stored with every posting and failure streak.
    fn name(&self) -> &str;

    /// One-line description, shown by `job-alert status`.
    fn description(&self) -> &str;

    /// Fetch the current postings from the board.
    async fn fetch(&self, settings: &Settings) -> Result<SiteResult>;
}

// ═══════════════════════════════════════════════════════════════════════
// Sender Trait
// ═══════════════════════════════════════════════════════════════════════

/// Delivers a rendered summary to the notification channel.
///
/// Any non-success response must surface as `Err`: the pipeline only marks
/// postings as sent after `send` returns `Ok`.
#[async_trait]
pub trait Sender: Send + Sync {
    async fn send(&self, endpoint: &str, text: &str, timeout: Duration) -> Result<(), SendError>;
}

// ═══════════════════════════════════════════════════════════════════════
// Clock Trait
// ═══════════════════════════════════════════════════════════════════════

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that returns a settable instant.
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════════

/// Ordered list of sources. Results, and therefore the rendered message,
/// follow registration order.
pub struct SourceRegistry {
    sources: Vec<Box<dyn Source>>,
}

impl SourceRegistry {
    /// Create an empty source registry.
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
        }
    }

    /// Registry with the built-in boards: woorimel, melbsky, hojubada.
    pub fn with_builtins() -> Self {
        use crate::connector_hojubada::HojubadaConnector;
        use crate::connector_melbsky::MelbskyConnector;
        use crate::connector_woorimel::WoorimelConnector;

        let mut registry = Self::new();
        registry.register(Box::new(WoorimelConnector::new()));
        registry.register(Box::new(MelbskyConnector::new()));
        registry.register(Box::new(HojubadaConnector::new()));
        registry
    }

    /// Register a source.
    pub fn register(&mut self, source: Box<dyn Source>) {
        self.sources.push(source);
    }

    /// Get all registered sources.
    pub fn sources(&self) -> &[Box<dyn Source>] {
        &self.sources
    }

    /// Find a source by name.
    pub fn find(&self, name: &str) -> Option<&dyn Source> {
        self.sources
            .iter()
            .find(|s| s.name() == name)
            .map(|s| s.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
