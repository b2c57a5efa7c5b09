//! Settings loaded from environment variables.
//!
//! `.env` files are read by the binary (via `dotenvy`) before
//! [`Settings::from_env`] runs. Tests build settings from an explicit map
//! with [`Settings::from_vars`] so they never touch the process environment.

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::error::ConfigError;

pub const DEFAULT_SENT_DB_PATH: &str = "data/sent_posts.sqlite";
pub const DEFAULT_HOJUBADA_STATE_PATH: &str = "data/hojubada_storage_state.json";
pub const DEFAULT_TZ: &str = "Australia/Melbourne";
pub const DEFAULT_USER_AGENT: &str = "job-alert-bot/0.1";

/// Variables that must be present before `job-alert run` starts.
///
/// `HOJUBADA_STORAGE_STATE_B64` is optional; without it the hojubada
/// connector uses whatever session file is on disk.
pub const RUN_REQUIRED_ENVS: &[&str] = &[
    "SLACK_WEBHOOK_URL",
    "WOORIMEL_ID",
    "WOORIMEL_PW",
    "MELBSKY_ID",
    "MELBSKY_PW",
    "HOJUBADA_ID",
    "HOJUBADA_PW",
];

#[derive(Debug, Clone)]
pub struct Settings {
    pub slack_webhook_url: String,
    pub woorimel_id: String,
    pub woorimel_pw: String,
    pub melbsky_id: String,
    pub melbsky_pw: String,
    pub hojubada_id: String,
    pub hojubada_pw: String,
    pub hojubada_storage_state_b64: String,
    pub keywords_csv: Option<String>,
    pub blacklist_csv: Option<String>,
    pub tz: String,
    pub request_timeout: Duration,
    pub user_agent: String,
    pub site_retry_attempts: u32,
    pub site_retry_delay: Duration,
    pub error_alert_threshold: u32,
    pub sent_db_path: PathBuf,
    pub hojubada_storage_path: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            slack_webhook_url: String::new(),
            woorimel_id: String::new(),
            woorimel_pw: String::new(),
            melbsky_id: String::new(),
            melbsky_pw: String::new(),
            hojubada_id: String::new(),
            hojubada_pw: String::new(),
            hojubada_storage_state_b64: String::new(),
            keywords_csv: None,
            blacklist_csv: None,
            tz: DEFAULT_TZ.to_string(),
            request_timeout: Duration::from_secs(20),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            site_retry_attempts: 2,
            site_retry_delay: Duration::from_secs(1),
            error_alert_threshold: 2,
            sent_db_path: PathBuf::from(DEFAULT_SENT_DB_PATH),
            hojubada_storage_path: PathBuf::from(DEFAULT_HOJUBADA_STATE_PATH),
        }
    }
}

impl Settings {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_vars(&vars)
    }

    /// Load from an explicit variable map and validate.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let get = |key: &str| env_value(vars, key);
        let optional = |key: &str| Some(get(key)).filter(|v| !v.is_empty());

        let settings = Self {
            slack_webhook_url: get("SLACK_WEBHOOK_URL"),
            woorimel_id: get("WOORIMEL_ID"),
            woorimel_pw: get("WOORIMEL_PW"),
            melbsky_id: get("MELBSKY_ID"),
            melbsky_pw: get("MELBSKY_PW"),
            hojubada_id: get("HOJUBADA_ID"),
            hojubada_pw: get("HOJUBADA_PW"),
            hojubada_storage_state_b64: get("HOJUBADA_STORAGE_STATE_B64"),
            keywords_csv: optional("KEYWORDS_CSV"),
            blacklist_csv: optional("BLACKLIST_CSV"),
            tz: optional("TZ").unwrap_or(defaults.tz),
            request_timeout: match optional("REQUEST_TIMEOUT_SECONDS") {
                Some(raw) => seconds("REQUEST_TIMEOUT_SECONDS", &raw)?,
                None => defaults.request_timeout,
            },
            user_agent: optional("USER_AGENT").unwrap_or(defaults.user_agent),
            site_retry_attempts: match optional("SITE_RETRY_ATTEMPTS") {
                Some(raw) => parse("SITE_RETRY_ATTEMPTS", &raw)?,
                None => defaults.site_retry_attempts,
            },
            site_retry_delay: match optional("SITE_RETRY_DELAY_SECONDS") {
                Some(raw) => seconds("SITE_RETRY_DELAY_SECONDS", &raw)?,
                None => defaults.site_retry_delay,
            },
            error_alert_threshold: match optional("ERROR_ALERT_THRESHOLD") {
                Some(raw) => parse("ERROR_ALERT_THRESHOLD", &raw)?,
                None => defaults.error_alert_threshold,
            },
            sent_db_path: optional("SENT_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.sent_db_path),
            hojubada_storage_path: optional("HOJUBADA_STORAGE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.hojubada_storage_path),
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Range and scheme checks. An empty webhook URL passes here; its
    /// presence is enforced by [`assert_required_envs`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.slack_webhook_url.is_empty() {
            let parsed = Url::parse(&self.slack_webhook_url)
                .map_err(|e| ConfigError::invalid("SLACK_WEBHOOK_URL", e))?;
            if parsed.scheme() != "https" {
                return Err(ConfigError::invalid(
                    "SLACK_WEBHOOK_URL",
                    "must use https://",
                ));
            }
        }
        if self.site_retry_attempts < 1 {
            return Err(ConfigError::invalid("SITE_RETRY_ATTEMPTS", "must be >= 1"));
        }
        if self.error_alert_threshold < 1 {
            return Err(ConfigError::invalid("ERROR_ALERT_THRESHOLD", "must be >= 1"));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::invalid("REQUEST_TIMEOUT_SECONDS", "must be > 0"));
        }
        Ok(())
    }
}

fn env_value(vars: &HashMap<String, String>, key: &str) -> String {
    vars.get(key).map(|v| v.trim().to_string()).unwrap_or_default()
}

fn parse<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>().map_err(|e| ConfigError::invalid(key, e))
}

fn seconds(key: &str, raw: &str) -> Result<Duration, ConfigError> {
    let value: f64 = parse(key, raw)?;
    Duration::try_from_secs_f64(value).map_err(|e| ConfigError::invalid(key, e))
}

/// Names from `required` that are absent or blank in `vars`.
pub fn missing_envs(required: &[&str], vars: &HashMap<String, String>) -> Vec<String> {
    required
        .iter()
        .filter(|key| env_value(vars, key).is_empty())
        .map(|key| key.to_string())
        .collect()
}

pub fn assert_required_envs(
    required: &[&str],
    vars: &HashMap<String, String>,
) -> Result<(), ConfigError> {
    let missing = missing_envs(required, vars);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Missing(missing.join(", ")))
    }
}

/// Hide the middle of a secret for log output: `abcdefgh` → `abc***gh`.
pub fn mask_secret(value: &str) -> String {
    const PREFIX: usize = 3;
    const SUFFIX: usize = 2;

    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= PREFIX + SUFFIX {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..PREFIX].iter().collect();
    let tail: String = chars[chars.len() - SUFFIX..].iter().collect();
    format!("{head}{}{tail}", "*".repeat(chars.len() - PREFIX - SUFFIX))
}
