//! State-store overview for `job-alert status`.
//!
//! Shows how many postings have been notified, the failure streak of every
//! configured source, when the last "nothing new" heartbeat went out, and
//! the most recent runs.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::config::Settings;
use crate::store::{heartbeat_interval, parse_ts, RunLogEntry, StateStore};
use crate::traits::SourceRegistry;

const RECENT_RUNS: i64 = 10;

/// Snapshot of the state store.
pub struct StatusReport {
    pub db_path: PathBuf,
    pub db_size: u64,
    pub sent_count: i64,
    /// `(name, description, streak)` for every configured source, then any
    /// stored streak whose source is no longer configured.
    pub sources: Vec<(String, String, u32)>,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub recent_runs: Vec<RunLogEntry>,
    pub alert_threshold: u32,
}

impl StatusReport {
    pub async fn collect(settings: &Settings, registry: &SourceRegistry) -> Result<Self> {
        let store = StateStore::open(&settings.sent_db_path).await?;
        let gathered = Self::gather(&store, settings, registry).await;
        store.close().await;
        gathered
    }

    async fn gather(
        store: &StateStore,
        settings: &Settings,
        registry: &SourceRegistry,
    ) -> Result<Self> {
        let mut streaks: BTreeMap<String, u32> = store.failure_streaks().await?;
        let mut sources: Vec<(String, String, u32)> = registry
            .sources()
            .iter()
            .map(|s| {
                let streak = streaks.remove(s.name()).unwrap_or(0);
                (s.name().to_string(), s.description().to_string(), streak)
            })
            .collect();
        sources.extend(
            streaks
                .into_iter()
                .map(|(name, streak)| (name, "(not configured)".to_string(), streak)),
        );

        Ok(Self {
            db_path: settings.sent_db_path.clone(),
            db_size: std::fs::metadata(&settings.sent_db_path)
                .map(|m| m.len())
                .unwrap_or(0),
            sent_count: store.count_sent().await?,
            sources,
            last_heartbeat: store.last_heartbeat().await?,
            recent_runs: store.recent_runs(RECENT_RUNS).await?,
            alert_threshold: settings.error_alert_threshold,
        })
    }

    pub fn render(&self, now: DateTime<Utc>) -> Result<String, fmt::Error> {
        let mut out = String::new();
        self.write_to(&mut out, now)?;
        Ok(out)
    }

    fn write_to(&self, out: &mut impl fmt::Write, now: DateTime<Utc>) -> fmt::Result {
        writeln!(out, "Job Alert — State")?;
        writeln!(out, "=================")?;
        writeln!(out)?;
        writeln!(out, "  Database:    {}", self.db_path.display())?;
        writeln!(out, "  Size:        {}", format_bytes(self.db_size))?;
        writeln!(out, "  Notified:    {}", self.sent_count)?;

        let heartbeat = match self.last_heartbeat {
            Some(at) => {
                let next = at + heartbeat_interval();
                format!(
                    "{} (next due {})",
                    format_relative(at, now),
                    next.format("%Y-%m-%d %H:%M UTC")
                )
            }
            None => "never (due on next quiet run)".to_string(),
        };
        writeln!(out, "  Heartbeat:   {heartbeat}")?;

        if !self.sources.is_empty() {
            writeln!(out)?;
            writeln!(out, "  Sources (alert after {} consecutive failures):", self.alert_threshold)?;
            writeln!(out, "  {:<12} {:>7}   {}", "SOURCE", "STREAK", "DESCRIPTION")?;
            writeln!(out, "  {}", "-".repeat(60))?;
            for (name, description, streak) in &self.sources {
                let marker = if *streak >= self.alert_threshold { " !" } else { "" };
                writeln!(out, "  {name:<12} {streak:>7}{marker:<2} {description}")?;
            }
        }

        writeln!(out)?;
        if self.recent_runs.is_empty() {
            writeln!(out, "  No runs recorded.")?;
        } else {
            writeln!(out, "  Recent runs:")?;
            writeln!(out, "  {:<20} {:>5} {:>7}", "RUN", "NEW", "ERRORS")?;
            writeln!(out, "  {}", "-".repeat(34))?;
            for run in &self.recent_runs {
                let when = parse_ts(&run.run_at)
                    .map(|at| format_relative(at, now))
                    .unwrap_or_else(|| run.run_at.clone());
                writeln!(out, "  {:<20} {:>5} {:>7}", when, run.new_count, run.error_count)?;
            }
        }

        Ok(())
    }
}

/// Run the status command: read the state store and print a summary.
pub async fn run_status(settings: &Settings, registry: &SourceRegistry) -> Result<()> {
    let report = StatusReport::collect(settings, registry).await?;
    println!("{}", report.render(Utc::now())?);
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

/// Relative time ("3 hours ago") for the last 30 days, absolute otherwise.
fn format_relative(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let delta = (now - at).num_seconds();

    if delta < 0 || delta >= 86400 * 30 {
        at.format("%Y-%m-%d %H:%M").to_string()
    } else if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    }
}
