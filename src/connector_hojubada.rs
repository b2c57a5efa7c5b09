//! hojubada.com job board (`bo_table=genguin`).
//!
//! The board only lists postings to logged-in members. Login goes through
//! Kakao and cannot be scripted here, so the connector replays the cookies
//! of a previously captured session (see [`crate::session`]). When the board
//! answers with a login page instead of postings the source fails with an
//! authentication error.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::COOKIE;
use tracing::{debug, warn};
use url::Url;

use crate::config::Settings;
use crate::models::SiteResult;
use crate::scrape::{build_client, dedupe_posts, parse_board_posts, DEFAULT_POST_LIMIT};
use crate::session::StorageState;
use crate::traits::Source;

pub const SOURCE_NAME: &str = "hojubada";
pub const BOARD_URL: &str = "http://hojubada.com/bbs/board.php?bo_table=genguin";

const ALLOW_URL_TOKENS: &[&str] = &["bo_table=genguin", "wr_id=", "board.php"];

pub const AUTH_REQUIRED_ERROR: &str =
    "authentication required; refresh the saved session (HOJUBADA_STORAGE_STATE_B64)";

/// A page with no postings that points at a login flow.
pub fn needs_authentication(current_url: &str, html: &str, posts_count: usize) -> bool {
    if posts_count > 0 {
        return false;
    }
    let url = current_url.to_lowercase();
    let html = html.to_lowercase();
    url.contains("accounts.kakao.com")
        || url.contains("login")
        || html.contains("카카오")
        || html.contains("로그인")
}

/// Turn a fetched board page into a result.
pub fn board_result(current_url: &str, html: &str) -> Result<SiteResult> {
    let postings = dedupe_posts(parse_board_posts(
        html,
        BOARD_URL,
        SOURCE_NAME,
        ALLOW_URL_TOKENS,
        DEFAULT_POST_LIMIT,
    )?);
    if needs_authentication(current_url, html, postings.len()) {
        return Ok(SiteResult::failed(SOURCE_NAME, AUTH_REQUIRED_ERROR));
    }
    Ok(SiteResult::ok(SOURCE_NAME, postings))
}

#[derive(Debug, Default)]
pub struct HojubadaConnector;

impl HojubadaConnector {
    pub fn new() -> Self {
        Self
    }

    fn session_cookies(settings: &Settings) -> Option<String> {
        let path = &settings.hojubada_storage_path;
        if !path.exists() {
            debug!(path = %path.display(), "no saved hojubada session");
            return None;
        }
        let host = Url::parse(BOARD_URL).ok()?.host_str()?.to_string();
        match StorageState::load(path) {
            Ok(state) => state.cookie_header(&host, Utc::now().timestamp() as f64),
            Err(e) => {
                warn!(error = %format!("{e:#}"), "ignoring unreadable hojubada session");
                None
            }
        }
    }

    async fn scrape(&self, settings: &Settings) -> Result<SiteResult> {
        let client = build_client(settings)?;
        let mut request = client.get(BOARD_URL);
        if let Some(cookies) = Self::session_cookies(settings) {
            request = request.header(COOKIE, cookies);
        }

        let response = request.send().await?.error_for_status()?;
        let current_url = response.url().to_string();
        let html = response.text().await?;
        board_result(&current_url, &html)
    }
}

#[async_trait]
impl Source for HojubadaConnector {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    fn description(&self) -> &str {
        "hojubada.com job board (saved member session)"
    }

    async fn fetch(&self, settings: &Settings) -> Result<SiteResult> {
        Ok(self
            .scrape(settings)
            .await
            .unwrap_or_else(|e| SiteResult::failed(SOURCE_NAME, format!("{e:#}"))))
    }
}
