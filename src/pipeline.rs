//! One end-to-end run: scrape, filter, dedupe, decide, notify, record.
//!
//! # Run Sequence
//!
//! ```text
//! prepare_session ─▶ sources (in order, with retry)
//!        ─▶ keyword + blacklist filter
//!        ─▶ open state store
//!        ─▶ unsent postings, failure streaks
//!        ─▶ send decision ─▶ render ─▶ Sender
//!        ─▶ mark sent / heartbeat (only after a successful send)
//!        ─▶ run log (best effort) ─▶ close store
//! ```
//!
//! # Send Decision
//!
//! Evaluated in order, first match wins:
//!
//! 1. unsent keyword-matched postings exist: send them;
//! 2. some failing source reached the alert threshold: send the errors;
//! 3. no source failed at all and the weekly heartbeat is due: send a
//!    heartbeat;
//! 4. otherwise nothing is sent.
//!
//! Postings are marked sent only after the sender returns `Ok`, so a
//! failed delivery re-sends the same postings on the next run.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::error::PipelineError;
use crate::keywords::{build_blacklist_set, build_keyword_set, is_relevant};
use crate::message::{render_summary, SummaryInput};
use crate::models::{PipelineResult, Posting, SiteResult};
use crate::retry::run_with_retry;
use crate::session;
use crate::store::StateStore;
use crate::traits::{Clock, Sender, SourceRegistry};

/// What a run decided to notify about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendDecision {
    Postings,
    Errors,
    Heartbeat,
    Skip,
}

impl SendDecision {
    pub fn decide(has_unsent: bool, has_notified_errors: bool, any_failure: bool, heartbeat_due: bool) -> Self {
        if has_unsent {
            Self::Postings
        } else if has_notified_errors {
            Self::Errors
        } else if !any_failure && heartbeat_due {
            Self::Heartbeat
        } else {
            Self::Skip
        }
    }

    pub fn sends(self) -> bool {
        self != Self::Skip
    }
}

/// Failed sources split by whether their streak reached `threshold`.
///
/// Returns `(notified, transient)` message lists in result order.
pub fn classify_failures(
    results: &[SiteResult],
    streaks: &BTreeMap<String, u32>,
    threshold: u32,
) -> (Vec<String>, Vec<String>) {
    let mut notified = Vec::new();
    let mut transient = Vec::new();

    for result in results {
        let Some(error) = &result.error else {
            continue;
        };
        let streak = streaks.get(&result.source).copied().unwrap_or(1);
        if streak >= threshold {
            notified.push(format!(
                "{}: {} (consecutive failures: {})",
                result.source, error, streak
            ));
        } else {
            transient.push(format!(
                "{}: consecutive failures: {} (below alert threshold {})",
                result.source, streak, threshold
            ));
        }
    }

    (notified, transient)
}

/// Append to the run log. A failed write is logged and does not change
/// the outcome of the run.
async fn record_run(store: &StateStore, run_at: DateTime<Utc>, new_count: usize, error_count: usize) {
    if let Err(e) = store.log_run(run_at, new_count, error_count).await {
        warn!(error = %e, "run log not written");
    }
}

/// Everything collected before the state store is opened.
struct Collected {
    site_results: Vec<SiteResult>,
    total_collected: usize,
    relevant: Vec<Posting>,
}

pub struct Pipeline {
    settings: Settings,
    sources: SourceRegistry,
    sender: Arc<dyn Sender>,
    clock: Arc<dyn Clock>,
}

impl Pipeline {
    pub fn new(
        settings: Settings,
        sources: SourceRegistry,
        sender: Arc<dyn Sender>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            settings,
            sources,
            sender,
            clock,
        }
    }

    /// Execute one run.
    ///
    /// The state store is closed before returning on every path, including
    /// storage and send failures.
    pub async fn run(&self) -> Result<PipelineResult, PipelineError> {
        let run_at = self.clock.now().trunc_subsecs(0);

        self.prepare_session();
        let collected = self.collect().await;

        let store = StateStore::open(&self.settings.sent_db_path).await?;
        let outcome = self.settle(&store, run_at, collected).await;
        store.close().await;

        if let Ok(result) = &outcome {
            info!(
                total_collected = result.total_collected,
                keyword_matched = result.keyword_matched,
                new_count = result.new_count,
                failed_sites = result.failed_site_count,
                message_sent = result.message_sent,
                "run finished"
            );
        }
        outcome
    }

    /// Materialize the hojubada session blob. Failure is not fatal: the
    /// connector then uses whatever session file already exists.
    fn prepare_session(&self) {
        match session::ensure_storage_state(&self.settings) {
            Ok(Some(path)) => debug!(path = %path.display(), "hojubada session prepared"),
            Ok(None) => debug!("no hojubada session blob configured"),
            Err(e) => warn!(error = %format!("{e:#}"), "hojubada session blob ignored"),
        }
    }

    async fn collect(&self) -> Collected {
        if self.sources.is_empty() {
            warn!("no sources registered; run will only report state");
        }
        let mut site_results = Vec::with_capacity(self.sources.len());
        for source in self.sources.sources() {
            let result = run_with_retry(
                source.as_ref(),
                &self.settings,
                self.settings.site_retry_attempts,
                self.settings.site_retry_delay,
            )
            .await;
            site_results.push(result);
        }

        let all: Vec<&Posting> = site_results.iter().flat_map(|r| r.postings.iter()).collect();
        let keywords = build_keyword_set(self.settings.keywords_csv.as_deref());
        let blacklist = build_blacklist_set(self.settings.blacklist_csv.as_deref());
        let relevant: Vec<Posting> = all
            .iter()
            .filter(|p| is_relevant(p, &keywords, &blacklist))
            .map(|p| (*p).clone())
            .collect();

        debug!(
            total = all.len(),
            relevant = relevant.len(),
            keywords = keywords.len(),
            blacklist = blacklist.len(),
            "postings filtered"
        );

        Collected {
            total_collected: all.len(),
            relevant,
            site_results,
        }
    }

    async fn settle(
        &self,
        store: &StateStore,
        run_at: DateTime<Utc>,
        collected: Collected,
    ) -> Result<PipelineResult, PipelineError> {
        let Collected {
            site_results,
            total_collected,
            relevant,
        } = collected;

        let error_messages: Vec<String> = site_results
            .iter()
            .filter_map(|r| r.error.as_ref().map(|e| format!("{}: {}", r.source, e)))
            .collect();
        let success_site_count = site_results.iter().filter(|r| r.is_ok()).count();
        let failed_site_count = site_results.len() - success_site_count;

        let unsent = store.get_unsent(&relevant).await?;
        let streaks = store.advance_failure_streaks(&site_results).await?;
        let (notified, transient) =
            classify_failures(&site_results, &streaks, self.settings.error_alert_threshold);

        let any_failure = !error_messages.is_empty();
        let heartbeat_due = if unsent.is_empty() && notified.is_empty() && !any_failure {
            store.heartbeat_due(run_at).await?
        } else {
            false
        };
        let decision =
            SendDecision::decide(!unsent.is_empty(), !notified.is_empty(), any_failure, heartbeat_due);
        debug!(?decision, unsent = unsent.len(), "send decision");

        let mut summary_text = None;
        if decision.sends() {
            let text = render_summary(&SummaryInput {
                tz: &self.settings.tz,
                run_at,
                new_postings: &unsent,
                keyword_matched: relevant.len(),
                site_results: &site_results,
                notified_errors: &notified,
                transient_failures: &transient,
                heartbeat_only: decision == SendDecision::Heartbeat,
            });

            if let Err(e) = self
                .sender
                .send(&self.settings.slack_webhook_url, &text, self.settings.request_timeout)
                .await
            {
                warn!(error = %e, "notification failed; postings stay unsent");
                record_run(store, run_at, unsent.len(), error_messages.len()).await;
                return Err(e.into());
            }

            if !unsent.is_empty() {
                store.mark_sent(&unsent, run_at).await?;
            }
            if decision == SendDecision::Heartbeat {
                store.set_heartbeat(run_at).await?;
            }
            summary_text = Some(text);
        }

        record_run(store, run_at, unsent.len(), error_messages.len()).await;

        Ok(PipelineResult {
            total_collected,
            keyword_matched: relevant.len(),
            new_count: unsent.len(),
            success_site_count,
            failed_site_count,
            error_messages,
            message_sent: decision.sends(),
            summary_text,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_order() {
        assert_eq!(SendDecision::decide(true, true, true, true), SendDecision::Postings);
        assert_eq!(SendDecision::decide(false, true, true, true), SendDecision::Errors);
        assert_eq!(SendDecision::decide(false, false, false, true), SendDecision::Heartbeat);
        assert_eq!(SendDecision::decide(false, false, true, true), SendDecision::Skip);
        assert_eq!(SendDecision::decide(false, false, false, false), SendDecision::Skip);
    }

    #[test]
    fn failures_split_on_threshold() {
        let results = vec![
            SiteResult::ok("woorimel", vec![]),
            SiteResult::failed("melbsky", "timeout"),
            SiteResult::failed("hojubada", "auth"),
        ];
        let streaks = BTreeMap::from([
            ("woorimel".to_string(), 0),
            ("melbsky".to_string(), 2),
            ("hojubada".to_string(), 1),
        ]);

        let (notified, transient) = classify_failures(&results, &streaks, 2);
        assert_eq!(notified, vec!["melbsky: timeout (consecutive failures: 2)"]);
        assert_eq!(
            transient,
            vec!["hojubada: consecutive failures: 1 (below alert threshold 2)"]
        );
    }

    #[test]
    fn missing_streak_counts_as_one() {
        let results = vec![SiteResult::failed("melbsky", "timeout")];
        let (notified, _) = classify_failures(&results, &BTreeMap::new(), 1);
        assert_eq!(notified, vec!["melbsky: timeout (consecutive failures: 1)"]);
    }
}
