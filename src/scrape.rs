//! Shared board-scraping helpers.
//!
//! All three boards are classic PHP bulletin boards: a list page whose
//! post links carry an id in the query string (`wr_id`, `document_srl`,
//! `uid`, ...) or as the last numeric path segment. [`parse_board_posts`]
//! walks every `<a href>` on the page and keeps the ones that look like
//! posts; connectors only supply the URL tokens that identify their board.

use std::collections::HashSet;

use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use sha2::{Digest, Sha256};
use url::Url;

use crate::config::Settings;
use crate::models::Posting;

/// Query keys that identify a single post, in lookup order.
pub const POST_QUERY_KEYS: &[&str] = &["wr_id", "document_srl", "no", "idx", "article_no", "uid"];

/// Link texts that are board chrome rather than postings (compared lower-cased).
const NAV_LINK_TEXTS: &[&str] = &[
    "login", "logout", "register", "회원가입", "로그인", "공지", "목록", "이전", "다음",
];

const SNIPPET_CHARS: usize = 200;

/// Default cap on postings taken from one page.
pub const DEFAULT_POST_LIMIT: usize = 80;

/// HTTP client carrying the configured user agent and timeout.
pub fn build_client(settings: &Settings) -> Result<Client> {
    Client::builder()
        .user_agent(settings.user_agent.clone())
        .timeout(settings.request_timeout)
        .build()
        .context("failed to build HTTP client")
}

/// GET `url` and return the body; non-2xx statuses are errors.
pub async fn fetch_html(client: &Client, url: &str) -> Result<String> {
    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("request to {url} failed"))?
        .error_for_status()?;
    Ok(response.text().await?)
}

/// Collapse whitespace runs into single spaces and trim.
pub fn clean_spaces(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Stable per-board id for a post URL.
///
/// First match wins: a known query key (`"wr_id:123"`), a trailing numeric
/// path segment of at least three digits (`"path:12345"`), otherwise the
/// first 16 hex chars of the URL's SHA-256 (`"hash:…"`).
pub fn infer_post_id(url: &str) -> String {
    if let Ok(parsed) = Url::parse(url) {
        let pairs = non_empty_query_pairs(&parsed);
        for key in POST_QUERY_KEYS {
            if let Some((_, value)) = pairs.iter().find(|(k, _)| k == key) {
                return format!("{key}:{value}");
            }
        }

        if let Some(number) = trailing_number(parsed.path()) {
            return format!("path:{number}");
        }
    }

    let digest = Sha256::digest(url.as_bytes());
    format!("hash:{}", &hex::encode(digest)[..16])
}

/// Query pairs with blank values dropped and values trimmed.
fn non_empty_query_pairs(url: &Url) -> Vec<(String, String)> {
    url.query_pairs()
        .filter_map(|(k, v)| {
            let v = v.trim();
            (!v.is_empty()).then(|| (k.into_owned(), v.to_string()))
        })
        .collect()
}

fn trailing_number(path: &str) -> Option<&str> {
    let trimmed = path.strip_suffix('/').unwrap_or(path);
    let (_, last) = trimmed.rsplit_once('/')?;
    (last.len() >= 3 && last.bytes().all(|b| b.is_ascii_digit())).then_some(last)
}

/// Pagination, sort, and category links: no post key, and either a
/// `page`/`findex` parameter or a directory-style path.
fn is_probable_index_link(url: &Url) -> bool {
    let pairs = non_empty_query_pairs(url);
    if pairs.iter().any(|(k, _)| POST_QUERY_KEYS.contains(&k.as_str())) {
        return false;
    }
    if pairs.iter().any(|(k, _)| k == "page" || k == "findex") {
        return true;
    }
    url.path().ends_with('/')
}

/// Text of the nearest enclosing row, list item, div, or article.
fn extract_snippet(anchor: &ElementRef<'_>) -> String {
    let container = anchor
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|el| matches!(el.value().name(), "tr" | "li" | "div" | "article"));

    match container {
        Some(el) => {
            let text = clean_spaces(&el.text().collect::<Vec<_>>().join(" "));
            text.chars().take(SNIPPET_CHARS).collect()
        }
        None => String::new(),
    }
}

/// Extract postings from a board list page.
///
/// A link is kept when its text is at least two characters and not a
/// navigation label, it resolves to an http(s) URL containing one of
/// `allow_url_tokens` (any URL if the list is empty), it is not an index
/// link, and neither its URL nor its `(source, id)` pair was seen earlier
/// on the page. At most `limit` postings are returned, in document order.
pub fn parse_board_posts(
    html: &str,
    base_url: &str,
    source: &str,
    allow_url_tokens: &[&str],
    limit: usize,
) -> Result<Vec<Posting>> {
    let base = Url::parse(base_url).with_context(|| format!("invalid board URL {base_url}"))?;
    let selector = Selector::parse("a[href]").map_err(|e| anyhow!("bad selector: {e}"))?;
    let document = Html::parse_document(html);

    let mut posts = Vec::new();
    let mut seen_urls: HashSet<String> = HashSet::new();
    let mut seen_ids: HashSet<String> = HashSet::new();

    for anchor in document.select(&selector) {
        let title = clean_spaces(&anchor.text().collect::<Vec<_>>().join(" "));
        if title.chars().count() < 2 || NAV_LINK_TEXTS.contains(&title.to_lowercase().as_str()) {
            continue;
        }

        let href = anchor.value().attr("href").unwrap_or_default();
        let Ok(resolved) = base.join(href) else {
            continue;
        };
        if !matches!(resolved.scheme(), "http" | "https") {
            continue;
        }
        let url = resolved.to_string();
        if !allow_url_tokens.is_empty() && !allow_url_tokens.iter().any(|t| url.contains(t)) {
            continue;
        }
        if is_probable_index_link(&resolved) || seen_urls.contains(&url) {
            continue;
        }

        let post_id = infer_post_id(&url);
        if seen_ids.contains(&post_id) {
            continue;
        }

        let mut snippet = extract_snippet(&anchor);
        if snippet == title {
            snippet.clear();
        }

        seen_ids.insert(post_id.clone());
        seen_urls.insert(url.clone());
        posts.push(Posting::new(source, post_id, title, url).with_snippet(snippet));

        if posts.len() >= limit {
            break;
        }
    }

    Ok(posts)
}

/// Drop later postings whose `(source, id)` was already seen.
pub fn dedupe_posts(posts: Vec<Posting>) -> Vec<Posting> {
    let mut seen: HashSet<(String, String)> = HashSet::new();
    posts
        .into_iter()
        .filter(|p| seen.insert((p.source.clone(), p.source_post_id.clone())))
        .collect()
}
