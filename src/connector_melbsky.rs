//! melbsky.com job board (`gid=004`).

use anyhow::Result;
use async_trait::async_trait;

use crate::config::Settings;
use crate::models::SiteResult;
use crate::scrape::{build_client, dedupe_posts, fetch_html, parse_board_posts, DEFAULT_POST_LIMIT};
use crate::traits::Source;

pub const SOURCE_NAME: &str = "melbsky";
pub const BOARD_URL: &str = "https://melbsky.com/bbs/main.php?gid=004";

const ALLOW_URL_TOKENS: &[&str] = &["gid=004", "uid=", "main.php", "wr_id="];

#[derive(Debug, Default)]
pub struct MelbskyConnector;

impl MelbskyConnector {
    pub fn new() -> Self {
        Self
    }

    async fn scrape(&self, settings: &Settings) -> Result<SiteResult> {
        let client = build_client(settings)?;
        let html = fetch_html(&client, BOARD_URL).await?;
        let postings = parse_board_posts(&html, BOARD_URL, SOURCE_NAME, ALLOW_URL_TOKENS, DEFAULT_POST_LIMIT)?;
        Ok(SiteResult::ok(SOURCE_NAME, dedupe_posts(postings)))
    }
}

#[async_trait]
impl Source for MelbskyConnector {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    fn description(&self) -> &str {
        "melbsky.com job board"
    }

    async fn fetch(&self, settings: &Settings) -> Result<SiteResult> {
        Ok(self
            .scrape(settings)
            .await
            .unwrap_or_else(|e| SiteResult::failed(SOURCE_NAME, format!("{e:#}"))))
    }
}
