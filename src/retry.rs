//! Bounded retries around a single source, with a fault boundary.
//!
//! A source that returns `Err` or panics is converted into a failed
//! [`SiteResult`]; nothing a source does can abort the whole run.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use tracing::{debug, warn};

use crate::config::Settings;
use crate::models::SiteResult;
use crate::traits::Source;

/// Fetch `source` up to `attempts` times (at least once), sleeping `delay`
/// between a failed attempt and the next. Returns the first success or the
/// last failure.
pub async fn run_with_retry(
    source: &dyn Source,
    settings: &Settings,
    attempts: u32,
    delay: Duration,
) -> SiteResult {
    let attempts = attempts.max(1);
    let mut last_result: Option<SiteResult> = None;

    for attempt in 1..=attempts {
        let result = safe_fetch(source, settings).await;
        if result.is_ok() {
            debug!(
                source = source.name(),
                attempt,
                postings = result.postings.len(),
                "source fetched"
            );
            return result;
        }

        warn!(
            source = source.name(),
            attempt,
            attempts,
            error = result.error.as_deref().unwrap_or_default(),
            "source attempt failed"
        );
        last_result = Some(result);

        if attempt < attempts && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    last_result.unwrap_or_else(|| SiteResult::failed(source.name(), "unknown error"))
}

async fn safe_fetch(source: &dyn Source, settings: &Settings) -> SiteResult {
    match AssertUnwindSafe(source.fetch(settings)).catch_unwind().await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => SiteResult::failed(source.name(), format!("unexpected error: {e:#}")),
        Err(panic) => SiteResult::failed(
            source.name(),
            format!("unexpected error: {}", panic_message(&panic)),
        ),
    }
}

fn panic_message(panic: &Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
