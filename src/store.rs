//! Persistent state for the notification pipeline.
//!
//! The store keeps three records in one SQLite file:
//!
//! | Record | Table | Key |
//! |--------|-------|-----|
//! | Sent-postings ledger | `sent_posts` | `(source, source_post_id)` |
//! | Failure streaks, heartbeat | `meta` | `site_failure_streak:{source}`, `last_no_new_heartbeat_utc` |
//! | Run log | `run_logs` | `run_at` |
//!
//! The ledger is append-only: once a key is present the posting is never
//! reported as unsent again.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::db;
use crate::error::StorageError;
use crate::migrate;
use crate::models::{Posting, SiteResult};

pub const HEARTBEAT_META_KEY: &str = "last_no_new_heartbeat_utc";
pub const FAILURE_STREAK_META_PREFIX: &str = "site_failure_streak:";

/// Minimum spacing between two "nothing new" heartbeats.
pub fn heartbeat_interval() -> Duration {
    Duration::days(7)
}

/// One row of the run log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLogEntry {
    pub run_at: String,
    pub new_count: i64,
    pub error_count: i64,
}

pub struct StateStore {
    pool: SqlitePool,
}

impl StateStore {
    /// Open (creating if needed) the state database and its schema.
    pub async fn open(path: &Path) -> Result<Self, StorageError> {
        let pool = db::connect(path).await?;
        if let Err(e) = migrate::run_migrations(&pool).await {
            pool.close().await;
            return Err(e);
        }
        Ok(Self { pool })
    }

    pub async fn close(self) {
        self.pool.close().await;
    }

    pub async fn is_sent(&self, posting: &Posting) -> Result<bool, StorageError> {
        let row: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM sent_posts WHERE source = ? AND source_post_id = ? LIMIT 1",
        )
        .bind(&posting.source)
        .bind(&posting.source_post_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    /// Postings whose key is not in the ledger, in input order.
    ///
    /// Duplicate keys inside `postings` collapse to the first occurrence.
    pub async fn get_unsent(&self, postings: &[Posting]) -> Result<Vec<Posting>, StorageError> {
        let mut seen_in_batch: HashSet<(&str, &str)> = HashSet::new();
        let mut unsent = Vec::new();
        for posting in postings {
            if !seen_in_batch.insert(posting.key()) {
                continue;
            }
            if !self.is_sent(posting).await? {
                unsent.push(posting.clone());
            }
        }
        Ok(unsent)
    }

    /// Record `postings` as sent. Keys already present keep their
    /// original `first_sent_at`.
    pub async fn mark_sent(
        &self,
        postings: &[Posting],
        sent_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let sent_at = format_ts(sent_at);
        let mut tx = self.pool.begin().await?;
        for posting in postings {
            insert_sent(&mut *tx, posting, &sent_at).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Insert one posting; returns `true` when the key was new.
    pub async fn mark_sent_if_new(
        &self,
        posting: &Posting,
        sent_at: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let affected = insert_sent(&self.pool, posting, &format_ts(sent_at)).await?;
        Ok(affected == 1)
    }

    pub async fn count_sent(&self) -> Result<i64, StorageError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sent_posts")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn get_meta(&self, key: &str) -> Result<Option<String>, StorageError> {
        select_meta(&self.pool, key).await
    }

    pub async fn set_meta(&self, key: &str, value: &str) -> Result<(), StorageError> {
        upsert_meta(&self.pool, key, value).await
    }

    /// Stored streak for `source`; missing or unparsable values read as 0.
    pub async fn get_failure_streak(&self, source: &str) -> Result<u32, StorageError> {
        let raw = self.get_meta(&failure_streak_key(source)).await?;
        Ok(parse_streak(raw))
    }

    /// Increment the streak of every failed source in `results`, reset the
    /// streak of every successful one. Sources not in `results` are untouched.
    /// All updates commit together or not at all.
    pub async fn advance_failure_streaks(
        &self,
        results: &[SiteResult],
    ) -> Result<BTreeMap<String, u32>, StorageError> {
        let mut streaks = BTreeMap::new();
        let mut tx = self.pool.begin().await?;
        for result in results {
            let key = failure_streak_key(&result.source);
            let previous = parse_streak(select_meta(&mut *tx, &key).await?);
            let current = if result.is_ok() {
                0
            } else {
                previous.saturating_add(1)
            };
            upsert_meta(&mut *tx, &key, &current.to_string()).await?;
            streaks.insert(result.source.clone(), current);
        }
        tx.commit().await?;
        Ok(streaks)
    }

    /// All stored streaks, keyed by source.
    pub async fn failure_streaks(&self) -> Result<BTreeMap<String, u32>, StorageError> {
        let rows = sqlx::query("SELECT key, value FROM meta WHERE key LIKE ? ORDER BY key")
            .bind(format!("{FAILURE_STREAK_META_PREFIX}%"))
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .filter_map(|row| {
                let key: String = row.get("key");
                let value: String = row.get("value");
                let source = key.strip_prefix(FAILURE_STREAK_META_PREFIX)?.to_string();
                Some((source, value.trim().parse().unwrap_or(0)))
            })
            .collect())
    }

    pub async fn last_heartbeat(&self) -> Result<Option<DateTime<Utc>>, StorageError> {
        Ok(self
            .get_meta(HEARTBEAT_META_KEY)
            .await?
            .and_then(|raw| parse_ts(&raw)))
    }

    /// True when no heartbeat is stored, the stored value is unparsable, or
    /// at least seven days have passed since it.
    pub async fn heartbeat_due(&self, now: DateTime<Utc>) -> Result<bool, StorageError> {
        Ok(match self.last_heartbeat().await? {
            None => true,
            Some(previous) => now - previous >= heartbeat_interval(),
        })
    }

    pub async fn set_heartbeat(&self, now: DateTime<Utc>) -> Result<(), StorageError> {
        self.set_meta(HEARTBEAT_META_KEY, &format_ts(now)).await
    }

    pub async fn log_run(
        &self,
        run_at: DateTime<Utc>,
        new_count: usize,
        error_count: usize,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO run_logs (run_at, new_count, error_count) VALUES (?, ?, ?)
            ON CONFLICT(run_at) DO UPDATE SET
                new_count = excluded.new_count,
                error_count = excluded.error_count
            "#,
        )
        .bind(format_ts(run_at))
        .bind(new_count as i64)
        .bind(error_count as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Most recent runs first.
    pub async fn recent_runs(&self, limit: i64) -> Result<Vec<RunLogEntry>, StorageError> {
        let rows = sqlx::query(
            "SELECT run_at, new_count, error_count FROM run_logs ORDER BY run_at DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| RunLogEntry {
                run_at: row.get("run_at"),
                new_count: row.get("new_count"),
                error_count: row.get("error_count"),
            })
            .collect())
    }
}

async fn insert_sent<'e, E>(executor: E, posting: &Posting, sent_at: &str) -> Result<u64, StorageError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let result = sqlx::query(
        r#"
        INSERT OR IGNORE INTO sent_posts (source, source_post_id, url, first_sent_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(&posting.source)
    .bind(&posting.source_post_id)
    .bind(&posting.url)
    .bind(sent_at)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

async fn select_meta<'e, E>(executor: E, key: &str) -> Result<Option<String>, StorageError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM meta WHERE key = ?")
        .bind(key)
        .fetch_optional(executor)
        .await?;
    Ok(value)
}

async fn upsert_meta<'e, E>(executor: E, key: &str, value: &str) -> Result<(), StorageError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO meta (key, value) VALUES (?, ?)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value
        "#,
    )
    .bind(key)
    .bind(value)
    .execute(executor)
    .await?;
    Ok(())
}

/// Missing or unparsable streak values read as 0.
fn parse_streak(raw: Option<String>) -> u32 {
    raw.and_then(|v| v.trim().parse().ok()).unwrap_or(0)
}

fn failure_streak_key(source: &str) -> String {
    format!("{FAILURE_STREAK_META_PREFIX}{source}")
}

fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Secs, false)
}

/// Parse a stored timestamp. Values without an offset are taken as UTC.
pub(crate) fn parse_ts(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}
