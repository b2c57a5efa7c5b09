//! Captured browser session for hojubada.
//!
//! The session file uses the Playwright `storage_state` JSON layout. It is
//! shipped to the runner as a base64 blob (`HOJUBADA_STORAGE_STATE_B64`),
//! written to `HOJUBADA_STORAGE_PATH` before each run, and its cookies are
//! replayed on the board request.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use tracing::debug;

use crate::config::Settings;

#[derive(Debug, Default, Deserialize)]
pub struct StorageState {
    #[serde(default)]
    pub cookies: Vec<Cookie>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub path: String,
    /// Unix seconds; `-1` marks a session cookie.
    #[serde(default)]
    pub expires: Option<f64>,
}

impl Cookie {
    fn matches_host(&self, host: &str) -> bool {
        let domain = self.domain.trim_start_matches('.').to_ascii_lowercase();
        let host = host.to_ascii_lowercase();
        domain.is_empty() || host == domain || host.ends_with(&format!(".{domain}"))
    }

    fn is_expired(&self, now_unix: f64) -> bool {
        matches!(self.expires, Some(e) if e > 0.0 && e < now_unix)
    }
}

impl StorageState {
    pub fn parse(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("session file is not valid storage-state JSON")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read session file {}", path.display()))?;
        Self::parse(&raw)
    }

    /// `Cookie` header value for `host`, or `None` if no live cookie applies.
    pub fn cookie_header(&self, host: &str, now_unix: f64) -> Option<String> {
        let pairs: Vec<String> = self
            .cookies
            .iter()
            .filter(|c| c.matches_host(host) && !c.is_expired(now_unix))
            .map(|c| format!("{}={}", c.name, c.value))
            .collect();
        (!pairs.is_empty()).then(|| pairs.join("; "))
    }
}

/// Write the base64 session blob from settings to the session path.
///
/// Returns `Ok(None)` when no blob is configured, `Ok(Some(path))` after
/// writing. Decoding or filesystem failures are errors.
pub fn ensure_storage_state(settings: &Settings) -> Result<Option<PathBuf>> {
    let blob = settings.hojubada_storage_state_b64.trim();
    if blob.is_empty() {
        return Ok(None);
    }

    let decoded = STANDARD
        .decode(blob)
        .context("HOJUBADA_STORAGE_STATE_B64 is not valid base64")?;
    let path = settings.hojubada_storage_path.clone();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(&path, decoded)
        .with_context(|| format!("failed to write session file {}", path.display()))?;

    debug!(path = %path.display(), "session file written");
    Ok(Some(path))
}

/// Base64 of a session file, for pasting into `HOJUBADA_STORAGE_STATE_B64`.
pub fn encode_storage_state_b64(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read session file {}", path.display()))?;
    Ok(STANDARD.encode(bytes))
}
