//! End-to-end pipeline runs against fake sources, a recording sender, and a
//! fixed clock. Each test gets its own SQLite file in a temp directory.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use job_alert::config::Settings;
use job_alert::error::{PipelineError, SendError};
use job_alert::models::{Posting, SiteResult};
use job_alert::pipeline::Pipeline;
use job_alert::store::StateStore;
use job_alert::traits::{FixedClock, Sender, Source, SourceRegistry};
use sqlx::SqlitePool;
use tempfile::TempDir;

// ─── Fakes ──────────────────────────────────────────────────────────

/// Plays back queued results, then repeats the last one forever.
struct ScriptedSource {
    name: String,
    queue: Mutex<VecDeque<SiteResult>>,
    last: Mutex<Option<SiteResult>>,
}

impl ScriptedSource {
    fn new(name: &str, script: Vec<SiteResult>) -> Self {
        Self {
            name: name.to_string(),
            queue: Mutex::new(script.into()),
            last: Mutex::new(None),
        }
    }

    fn always(result: SiteResult) -> Self {
        let name = result.source.clone();
        Self::new(&name, vec![result])
    }
}

#[async_trait]
impl Source for ScriptedSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "scripted test source"
    }

    async fn fetch(&self, _settings: &Settings) -> Result<SiteResult> {
        let next = self.queue.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        if let Some(result) = next {
            *last = Some(result);
        }
        Ok(last.clone().expect("script must not be empty"))
    }
}

#[derive(Default)]
struct RecordingSender {
    messages: Mutex<Vec<String>>,
    fail: AtomicBool,
}

impl RecordingSender {
    fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sender for RecordingSender {
    async fn send(&self, endpoint: &str, text: &str, _timeout: Duration) -> Result<(), SendError> {
        assert_eq!(endpoint, WEBHOOK);
        if self.fail.load(Ordering::SeqCst) {
            return Err(SendError::Status {
                status: 500,
                body: "internal_error".to_string(),
            });
        }
        self.messages.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

/// Drops the `run_logs` table from a second connection while "sending",
/// so the run log write that follows fails.
struct RunLogBreakingSender {
    db_path: PathBuf,
    fail: bool,
    delivered: AtomicBool,
}

#[async_trait]
impl Sender for RunLogBreakingSender {
    async fn send(&self, _endpoint: &str, _text: &str, _timeout: Duration) -> Result<(), SendError> {
        let pool = SqlitePool::connect(&format!("sqlite:{}", self.db_path.display()))
            .await
            .unwrap();
        sqlx::query("DROP TABLE run_logs").execute(&pool).await.unwrap();
        pool.close().await;

        if self.fail {
            return Err(SendError::Other("webhook unreachable".to_string()));
        }
        self.delivered.store(true, Ordering::SeqCst);
        Ok(())
    }
}

// ─── Helpers ────────────────────────────────────────────────────────

const WEBHOOK: &str = "https://hooks.slack.com/services/T000/B000/XXXX";

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 19, 0, 0, 0).unwrap()
}

fn settings(tmp: &TempDir) -> Settings {
    Settings {
        slack_webhook_url: WEBHOOK.to_string(),
        sent_db_path: tmp.path().join("data/sent_posts.sqlite"),
        hojubada_storage_path: tmp.path().join("data/hojubada_storage_state.json"),
        site_retry_attempts: 2,
        site_retry_delay: Duration::ZERO,
        error_alert_threshold: 2,
        ..Settings::default()
    }
}

fn posting(source: &str, id: &str, title: &str) -> Posting {
    Posting::new(source, id, title, format!("https://{source}.example/{id}"))
}

struct Harness {
    _tmp: TempDir,
    settings: Settings,
    pipeline: Pipeline,
    sender: Arc<RecordingSender>,
    clock: Arc<FixedClock>,
}

fn harness(sources: Vec<ScriptedSource>) -> Harness {
    let tmp = TempDir::new().unwrap();
    let settings = settings(&tmp);
    let mut registry = SourceRegistry::new();
    for source in sources {
        registry.register(Box::new(source));
    }
    let sender = Arc::new(RecordingSender::default());
    let clock = Arc::new(FixedClock::new(t0()));
    let pipeline = Pipeline::new(settings.clone(), registry, sender.clone(), clock.clone());
    Harness {
        _tmp: tmp,
        settings,
        pipeline,
        sender,
        clock,
    }
}

async fn open_store(h: &Harness) -> StateStore {
    StateStore::open(&h.settings.sent_db_path).await.unwrap()
}

// ─── Scenarios ──────────────────────────────────────────────────────

#[tokio::test]
async fn same_posting_is_notified_once() {
    let h = harness(vec![ScriptedSource::always(SiteResult::ok(
        "woorimel",
        vec![posting("woorimel", "1", "건설 현장 잡부 구함")],
    ))]);

    let first = h.pipeline.run().await.unwrap();
    assert_eq!(first.new_count, 1);
    assert!(first.message_sent);

    h.clock.set(t0() + chrono::Duration::minutes(10));
    let second = h.pipeline.run().await.unwrap();
    assert_eq!(second.new_count, 0);
    assert_eq!(second.keyword_matched, 1);

    let store = open_store(&h).await;
    assert_eq!(store.count_sent().await.unwrap(), 1);
    assert_eq!(store.recent_runs(10).await.unwrap().len(), 2);
    store.close().await;

    let messages = h.sender.messages();
    assert!(messages[0].contains("- [woorimel] 건설 현장 잡부 구함 - https://woorimel.example/1"));
}

#[tokio::test]
async fn duplicate_keys_in_one_run_collapse() {
    let h = harness(vec![ScriptedSource::always(SiteResult::ok(
        "woorimel",
        vec![
            posting("woorimel", "7", "casual labour wanted"),
            posting("woorimel", "7", "casual labour wanted (bumped)"),
        ],
    ))]);

    let result = h.pipeline.run().await.unwrap();
    assert_eq!(result.total_collected, 2);
    assert_eq!(result.new_count, 1);
    assert!(!result.summary_text.unwrap().contains("(bumped)"));
}

#[tokio::test]
async fn first_failure_is_reported_as_transient() {
    let h = harness(vec![
        ScriptedSource::always(SiteResult::ok(
            "woorimel",
            vec![posting("woorimel", "1", "데몰리션 단기 인원")],
        )),
        ScriptedSource::always(SiteResult::failed("melbsky", "connection reset")),
    ]);

    let result = h.pipeline.run().await.unwrap();
    assert_eq!(result.success_site_count, 1);
    assert_eq!(result.failed_site_count, 1);
    assert_eq!(result.error_messages, vec!["melbsky: connection reset"]);
    assert!(!result.all_sources_failed());

    let text = result.summary_text.unwrap();
    assert!(text.contains("Transient failures (not yet escalated)"));
    assert!(text.contains("- melbsky: consecutive failures: 1 (below alert threshold 2)"));
    assert!(!text.contains("\nErrors\n"));
}

#[tokio::test]
async fn repeated_failure_alerts_once_on_second_run() {
    let h = harness(vec![
        ScriptedSource::always(SiteResult::ok("woorimel", vec![])),
        ScriptedSource::always(SiteResult::failed("melbsky", "HTTP 503")),
    ]);

    let first = h.pipeline.run().await.unwrap();
    assert!(!first.message_sent);
    assert!(h.sender.messages().is_empty());

    h.clock.set(t0() + chrono::Duration::minutes(10));
    let second = h.pipeline.run().await.unwrap();
    assert!(second.message_sent);

    let messages = h.sender.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("Errors\n- melbsky: HTTP 503 (consecutive failures: 2)"));

    let store = open_store(&h).await;
    assert_eq!(store.get_failure_streak("melbsky").await.unwrap(), 2);
    assert_eq!(store.get_failure_streak("woorimel").await.unwrap(), 0);
    store.close().await;
}

#[tokio::test]
async fn streak_resets_after_recovery() {
    let h = harness(vec![ScriptedSource::new(
        "melbsky",
        vec![
            SiteResult::failed("melbsky", "timeout"),
            SiteResult::failed("melbsky", "timeout"),
            SiteResult::failed("melbsky", "timeout"),
            SiteResult::failed("melbsky", "timeout"),
            SiteResult::ok("melbsky", vec![]),
        ],
    )]);

    // attempts=2: each run consumes two scripted results
    let first = h.pipeline.run().await.unwrap();
    assert!(first.all_sources_failed());
    h.pipeline.run().await.unwrap();
    let store = open_store(&h).await;
    assert_eq!(store.get_failure_streak("melbsky").await.unwrap(), 2);
    store.close().await;

    let third = h.pipeline.run().await.unwrap();
    assert_eq!(third.failed_site_count, 0);
    let store = open_store(&h).await;
    assert_eq!(store.get_failure_streak("melbsky").await.unwrap(), 0);
    store.close().await;
}

#[tokio::test]
async fn retry_recovers_within_one_run() {
    let h = harness(vec![ScriptedSource::new(
        "melbsky",
        vec![
            SiteResult::failed("melbsky", "timeout"),
            SiteResult::ok("melbsky", vec![posting("melbsky", "uid:5", "construction labourer")]),
        ],
    )]);

    let result = h.pipeline.run().await.unwrap();
    assert_eq!(result.failed_site_count, 0);
    assert_eq!(result.success_site_count, 1);
    assert!(result.error_messages.is_empty());
    assert_eq!(result.new_count, 1);
}

#[tokio::test]
async fn blacklisted_postings_never_reach_the_message() {
    let h = harness(vec![ScriptedSource::always(SiteResult::ok(
        "woorimel",
        vec![
            posting("woorimel", "1", "건설 현장 잡부"),
            posting("woorimel", "2", "casual kitchen hand"),
            posting("woorimel", "3", "IT developer"),
        ],
    ))]);

    let result = h.pipeline.run().await.unwrap();
    assert_eq!(result.total_collected, 3);
    assert_eq!(result.keyword_matched, 1);
    assert_eq!(result.new_count, 1);

    let text = result.summary_text.unwrap();
    assert!(!text.contains("kitchen"));
    assert!(!text.contains("IT developer"));

    let store = open_store(&h).await;
    assert_eq!(store.count_sent().await.unwrap(), 1);
    store.close().await;
}

#[tokio::test]
async fn quiet_runs_send_one_heartbeat_per_week() {
    let h = harness(vec![ScriptedSource::always(SiteResult::ok("woorimel", vec![]))]);

    let first = h.pipeline.run().await.unwrap();
    assert!(first.message_sent);
    assert!(first
        .summary_text
        .unwrap()
        .contains("Weekly check: no new postings this period"));

    h.clock.set(t0() + chrono::Duration::hours(1));
    let suppressed = h.pipeline.run().await.unwrap();
    assert!(!suppressed.message_sent);
    assert!(suppressed.summary_text.is_none());

    h.clock.set(t0() + chrono::Duration::days(7));
    let next_week = h.pipeline.run().await.unwrap();
    assert!(next_week.message_sent);
    assert_eq!(h.sender.messages().len(), 2);
}

#[tokio::test]
async fn failing_source_blocks_heartbeat() {
    let h = harness(vec![
        ScriptedSource::always(SiteResult::ok("woorimel", vec![])),
        ScriptedSource::always(SiteResult::failed("hojubada", "authentication required")),
    ]);

    let result = h.pipeline.run().await.unwrap();
    assert!(!result.message_sent);

    let store = open_store(&h).await;
    assert!(store.last_heartbeat().await.unwrap().is_none());
    store.close().await;
}

#[tokio::test]
async fn failed_delivery_keeps_postings_unsent() {
    let h = harness(vec![ScriptedSource::always(SiteResult::ok(
        "woorimel",
        vec![posting("woorimel", "1", "short term labour")],
    ))]);

    h.sender.fail.store(true, Ordering::SeqCst);
    let err = h.pipeline.run().await.unwrap_err();
    assert!(matches!(err, PipelineError::Send(SendError::Status { status: 500, .. })));

    let store = open_store(&h).await;
    assert_eq!(store.count_sent().await.unwrap(), 0);
    let runs = store.recent_runs(10).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].new_count, 1);
    store.close().await;

    h.sender.fail.store(false, Ordering::SeqCst);
    h.clock.set(t0() + chrono::Duration::minutes(10));
    let retry = h.pipeline.run().await.unwrap();
    assert_eq!(retry.new_count, 1);
    assert_eq!(h.sender.messages().len(), 1);
}

#[tokio::test]
async fn unusable_database_path_is_a_storage_error() {
    let tmp = TempDir::new().unwrap();
    let blocker = tmp.path().join("not-a-dir");
    std::fs::write(&blocker, "file").unwrap();

    let settings = Settings {
        sent_db_path: blocker.join("state.sqlite"),
        ..settings(&tmp)
    };
    let mut registry = SourceRegistry::new();
    registry.register(Box::new(ScriptedSource::always(SiteResult::ok("woorimel", vec![]))));
    let pipeline = Pipeline::new(
        settings,
        registry,
        Arc::new(RecordingSender::default()),
        Arc::new(FixedClock::new(t0())),
    );

    let err = pipeline.run().await.unwrap_err();
    assert!(matches!(err, PipelineError::Storage(_)));
}

#[tokio::test]
async fn failed_heartbeat_is_retried_next_run() {
    let h = harness(vec![ScriptedSource::always(SiteResult::ok("woorimel", vec![]))]);

    h.sender.fail.store(true, Ordering::SeqCst);
    let err = h.pipeline.run().await.unwrap_err();
    assert!(matches!(err, PipelineError::Send(_)));

    let store = open_store(&h).await;
    assert!(store.last_heartbeat().await.unwrap().is_none());
    store.close().await;

    h.sender.fail.store(false, Ordering::SeqCst);
    h.clock.set(t0() + chrono::Duration::minutes(10));
    let retry = h.pipeline.run().await.unwrap();
    assert!(retry.message_sent);
    assert!(retry
        .summary_text
        .unwrap()
        .contains("Weekly check: no new postings this period"));

    let store = open_store(&h).await;
    assert_eq!(
        store.last_heartbeat().await.unwrap(),
        Some(t0() + chrono::Duration::minutes(10))
    );
    store.close().await;
}

fn run_log_breaking_pipeline(fail: bool) -> (TempDir, Settings, Arc<RunLogBreakingSender>, Pipeline) {
    let tmp = TempDir::new().unwrap();
    let settings = settings(&tmp);
    let mut registry = SourceRegistry::new();
    registry.register(Box::new(ScriptedSource::always(SiteResult::ok(
        "woorimel",
        vec![posting("woorimel", "1", "건설 현장 잡부")],
    ))));
    let sender = Arc::new(RunLogBreakingSender {
        db_path: settings.sent_db_path.clone(),
        fail,
        delivered: AtomicBool::new(false),
    });
    let pipeline = Pipeline::new(
        settings.clone(),
        registry,
        sender.clone(),
        Arc::new(FixedClock::new(t0())),
    );
    (tmp, settings, sender, pipeline)
}

#[tokio::test]
async fn run_log_failure_does_not_fail_a_delivered_run() {
    let (_tmp, settings, sender, pipeline) = run_log_breaking_pipeline(false);

    let result = pipeline.run().await.unwrap();
    assert!(sender.delivered.load(Ordering::SeqCst));
    assert!(result.message_sent);
    assert_eq!(result.new_count, 1);

    let store = StateStore::open(&settings.sent_db_path).await.unwrap();
    assert_eq!(store.count_sent().await.unwrap(), 1);
    store.close().await;
}

#[tokio::test]
async fn run_log_failure_does_not_mask_send_error() {
    let (_tmp, settings, _sender, pipeline) = run_log_breaking_pipeline(true);

    let err = pipeline.run().await.unwrap_err();
    assert!(matches!(err, PipelineError::Send(SendError::Other(_))));

    let store = StateStore::open(&settings.sent_db_path).await.unwrap();
    assert_eq!(store.count_sent().await.unwrap(), 0);
    store.close().await;
}
