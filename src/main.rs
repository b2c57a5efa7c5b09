//! # Job Alert CLI (`job-alert`)
//!
//! Scrapes the configured job boards, filters postings by keyword, and
//! posts anything new to a Slack channel. Meant to be run from a scheduler
//! (cron, GitHub Actions) every few minutes.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `job-alert run` | One full scrape → filter → notify run |
//! | `job-alert healthcheck` | Check required settings and the state database |
//! | `job-alert status` | Show notified count, failure streaks, recent runs |
//! | `job-alert encode-session` | Print a session file as base64 for `HOJUBADA_STORAGE_STATE_B64` |
//!
//! ## Exit Codes
//!
//! `run` exits with 1 when every source failed, when the state database
//! or the webhook fails, or when settings are missing or invalid.
//! `healthcheck` exits with 1 on missing settings or an unusable database.
//!
//! ## Environment
//!
//! Settings are read from the environment; a `.env` file in the working
//! directory is loaded first. Log verbosity follows `RUST_LOG` (default
//! `job_alert=info`); logs go to stderr, summaries to stdout.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use job_alert::config::{self, Settings, RUN_REQUIRED_ENVS};
use job_alert::notify::SlackSender;
use job_alert::pipeline::Pipeline;
use job_alert::session;
use job_alert::status;
use job_alert::store::StateStore;
use job_alert::traits::{SourceRegistry, SystemClock};

/// Job Alert: construction and casual job notifications for Melbourne
/// community boards.
#[derive(Parser)]
#[command(
    name = "job-alert",
    about = "Scrape job boards, filter by keyword, and notify Slack about new postings",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scrape → filter → notify pipeline once.
    Run,

    /// Validate settings and local runtime readiness.
    ///
    /// Checks required environment variables, opens the state database,
    /// and materializes the hojubada session blob if one is configured.
    Healthcheck,

    /// Show the state database: notified postings, failure streaks,
    /// heartbeat, recent runs.
    Status,

    /// Print a captured session file as base64.
    ///
    /// Paste the output into the `HOJUBADA_STORAGE_STATE_B64` secret.
    EncodeSession {
        /// Session file to encode. Defaults to `HOJUBADA_STORAGE_PATH`.
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("job_alert=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();

    let outcome = match cli.command {
        Commands::Run => cmd_run().await,
        Commands::Healthcheck => cmd_healthcheck().await,
        Commands::Status => cmd_status().await,
        Commands::EncodeSession { path } => cmd_encode_session(path),
    };

    match outcome {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn cmd_run() -> Result<ExitCode> {
    let vars: HashMap<String, String> = std::env::vars().collect();
    let settings = Settings::from_vars(&vars)?;
    config::assert_required_envs(RUN_REQUIRED_ENVS, &vars)?;

    tracing::info!(
        webhook = %config::mask_secret(&settings.slack_webhook_url),
        db = %settings.sent_db_path.display(),
        "starting run"
    );

    let pipeline = Pipeline::new(
        settings,
        SourceRegistry::with_builtins(),
        Arc::new(SlackSender::new()),
        Arc::new(SystemClock),
    );
    let result = pipeline.run().await?;

    println!(
        "run summary: total_collected={} keyword_matched={} new_count={} failed_sites={} message_sent={}",
        result.total_collected,
        result.keyword_matched,
        result.new_count,
        result.failed_site_count,
        result.message_sent
    );
    for error in &result.error_messages {
        println!("  failed: {error}");
    }

    if result.all_sources_failed() {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

async fn cmd_healthcheck() -> Result<ExitCode> {
    let vars: HashMap<String, String> = std::env::vars().collect();
    let settings = Settings::from_vars(&vars)?;

    let missing = config::missing_envs(RUN_REQUIRED_ENVS, &vars);
    if !missing.is_empty() {
        println!("missing required env vars: {}", missing.join(", "));
        return Ok(ExitCode::FAILURE);
    }

    match StateStore::open(&settings.sent_db_path).await {
        Ok(store) => store.close().await,
        Err(e) => {
            println!("state db check failed: {e}");
            return Ok(ExitCode::FAILURE);
        }
    }
    println!("state db ready: {}", settings.sent_db_path.display());

    match session::ensure_storage_state(&settings) {
        Ok(Some(path)) => println!("hojubada session ready: {}", path.display()),
        Ok(None) if settings.hojubada_storage_path.exists() => println!(
            "hojubada session blob not set; using existing file {}",
            settings.hojubada_storage_path.display()
        ),
        Ok(None) => println!("hojubada session not provided; hojubada will report authentication errors"),
        Err(e) => println!("hojubada session blob could not be decoded: {e:#}"),
    }

    println!("healthcheck passed");
    Ok(ExitCode::SUCCESS)
}

async fn cmd_status() -> Result<ExitCode> {
    let settings = Settings::from_env()?;
    status::run_status(&settings, &SourceRegistry::with_builtins()).await?;
    Ok(ExitCode::SUCCESS)
}

fn cmd_encode_session(path: Option<PathBuf>) -> Result<ExitCode> {
    let path = match path {
        Some(path) => path,
        None => Settings::from_env()?.hojubada_storage_path,
    };
    println!("{}", session::encode_storage_state_b64(&path)?);
    Ok(ExitCode::SUCCESS)
}
