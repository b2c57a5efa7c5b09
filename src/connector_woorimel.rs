//! woorimel.com Melbourne jobs board.
//!
//! Scrapes the first two list pages. Postings from a page that loaded are
//! kept even when the other page fails; the result then carries both the
//! postings and one error string joining every page failure with `"; "`.

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use crate::config::Settings;
use crate::models::SiteResult;
use crate::scrape::{build_client, dedupe_posts, fetch_html, parse_board_posts, DEFAULT_POST_LIMIT};
use crate::traits::Source;

pub const SOURCE_NAME: &str = "woorimel";

pub const BOARD_URLS: &[&str] = &[
    "https://woorimel.com/board/melbourne-jobs",
    "https://woorimel.com/board/melbourne-jobs?category_id=&findex=post_datetime+desc&page=2",
];

const ALLOW_URL_TOKENS: &[&str] = &["melbourne-jobs", "wr_id=", "document_srl="];

#[derive(Debug, Default)]
pub struct WoorimelConnector;

impl WoorimelConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Source for WoorimelConnector {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    fn description(&self) -> &str {
        "woorimel.com Melbourne jobs board (pages 1-2)"
    }

    async fn fetch(&self, settings: &Settings) -> Result<SiteResult> {
        let client = match build_client(settings) {
            Ok(client) => client,
            Err(e) => return Ok(SiteResult::failed(SOURCE_NAME, format!("{e:#}"))),
        };

        let mut postings = Vec::new();
        let mut errors = Vec::new();

        for url in BOARD_URLS {
            let page = match fetch_html(&client, url).await {
                Ok(html) => parse_board_posts(&html, url, SOURCE_NAME, ALLOW_URL_TOKENS, DEFAULT_POST_LIMIT),
                Err(e) => Err(e),
            };
            match page {
                Ok(found) => {
                    debug!(url, count = found.len(), "woorimel page parsed");
                    postings.extend(found);
                }
                Err(e) => errors.push(format!("{url}: {e:#}")),
            }
        }

        let postings = dedupe_posts(postings);
        if errors.is_empty() {
            Ok(SiteResult::ok(SOURCE_NAME, postings))
        } else {
            Ok(SiteResult {
                source: SOURCE_NAME.to_string(),
                postings,
                error: Some(errors.join("; ")),
            })
        }
    }
}
