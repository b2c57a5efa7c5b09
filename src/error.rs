//! Typed errors for the notification pipeline.
//!
//! Source fetch failures never appear here: they travel as the `error`
//! string of a [`SiteResult`](crate::models::SiteResult). Only the faults
//! that end a run (or prevent one from starting) get an error type.

use thiserror::Error;

/// Settings could not be loaded or failed validation.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variables: {0}")]
    Missing(String),

    #[error("Invalid value for {key}: {message}")]
    Invalid { key: String, message: String },
}

impl ConfigError {
    pub fn invalid(key: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Invalid {
            key: key.into(),
            message: message.to_string(),
        }
    }
}

/// The state database could not be opened, migrated, or queried.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("cannot open state database {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("cannot prepare state directory {path}: {source}")]
    Directory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("schema creation failed: {0}")]
    Schema(#[source] sqlx::Error),

    #[error("state query failed: {0}")]
    Query(#[from] sqlx::Error),
}

/// The webhook did not accept the message.
#[derive(Error, Debug)]
pub enum SendError {
    #[error("webhook request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("webhook returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("sender failed: {0}")]
    Other(String),
}

/// A fatal fault during one pipeline run.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("notification was not delivered: {0}")]
    Send(#[from] SendError),
}
