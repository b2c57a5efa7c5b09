use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

use crate::error::StorageError;

pub async fn connect(db_path: &Path) -> Result<SqlitePool, StorageError> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| StorageError::Directory {
            path: parent.display().to_string(),
            source,
        })?;
    }

    let open_err = |source| StorageError::Open {
        path: db_path.display().to_string(),
        source,
    };

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))
        .map_err(open_err)?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    // One run owns the store; a single connection keeps writes serialized.
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .map_err(open_err)
}
