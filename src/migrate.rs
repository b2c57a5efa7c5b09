use sqlx::SqlitePool;

use crate::error::StorageError;

/// Create the state tables if they do not exist. Safe to run on every open.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), StorageError> {
    // Ledger of postings that have been notified
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sent_posts (
            source TEXT NOT NULL,
            source_post_id TEXT NOT NULL,
            url TEXT NOT NULL,
            first_sent_at TEXT NOT NULL,
            PRIMARY KEY (source, source_post_id)
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(StorageError::Schema)?;

    // One row per run, keyed by run timestamp
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS run_logs (
            run_at TEXT PRIMARY KEY,
            new_count INTEGER NOT NULL,
            error_count INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(StorageError::Schema)?;

    // Failure streaks and heartbeat timestamp
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(StorageError::Schema)?;

    Ok(())
}
