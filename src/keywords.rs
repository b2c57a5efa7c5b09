//! Text normalization and keyword / blacklist term sets.
//!
//! Matching is a plain substring test over normalized text. There is no
//! tokenization or stemming, so a term can match inside a longer word.

use std::collections::BTreeSet;

use unicode_normalization::UnicodeNormalization;

use crate::models::Posting;

/// Built-in inclusion terms (Korean and English).
pub const DEFAULT_KEYWORDS: &[&str] = &[
    "건설",
    "잡부",
    "데몰리션",
    "현장",
    "컨스트럭션",
    "construction",
    "demolition",
    "labour",
    "labor",
    "casual",
    "short term",
    "day job",
    "단기",
    "단기 알바",
    "단기알바",
    "캐주얼",
];

/// Built-in exclusion terms for kitchen work.
pub const DEFAULT_BLACKLIST: &[&str] = &[
    "키친",
    "키친핸드",
    "주방",
    "kitchen",
    "kitchen hand",
    "쿡",
    "cook",
    "셰프",
    "chef",
    "디시워셔",
    "dishwasher",
];

/// Normalized, deduplicated, sorted matching terms.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TermSet {
    terms: Vec<String>,
}

impl TermSet {
    pub fn contains(&self, term: &str) -> bool {
        self.terms.binary_search_by(|t| t.as_str().cmp(term)).is_ok()
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

/// NFKC-fold, lower-case, and collapse every non-alphanumeric run
/// (underscore included) into a single space.
pub fn normalize_text(value: &str) -> String {
    let folded: String = value.nfkc().flat_map(char::to_lowercase).collect();

    let mut out = String::with_capacity(folded.len());
    let mut pending_space = false;
    for c in folded.chars() {
        if c.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(c);
        } else {
            pending_space = true;
        }
    }
    out
}

/// Split a comma-separated override list, trimming and dropping empties.
pub fn parse_terms_csv(value: Option<&str>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Union of `defaults` and the CSV overrides, normalized and sorted.
pub fn build_term_set(defaults: &[&str], overrides_csv: Option<&str>) -> TermSet {
    let overrides = parse_terms_csv(overrides_csv);
    let terms: BTreeSet<String> = defaults
        .iter()
        .copied()
        .chain(overrides.iter().map(String::as_str))
        .map(normalize_text)
        .filter(|term| !term.is_empty())
        .collect();

    TermSet {
        terms: terms.into_iter().collect(),
    }
}

pub fn build_keyword_set(extra_csv: Option<&str>) -> TermSet {
    build_term_set(DEFAULT_KEYWORDS, extra_csv)
}

pub fn build_blacklist_set(extra_csv: Option<&str>) -> TermSet {
    build_term_set(DEFAULT_BLACKLIST, extra_csv)
}

pub fn matches_terms(title: &str, snippet: &str, terms: &TermSet) -> bool {
    let haystack = normalize_text(&format!("{title} {snippet}"));
    terms
        .terms()
        .iter()
        .any(|term| haystack.contains(term.as_str()))
}

/// A posting is relevant when it hits a keyword and no blacklist term.
pub fn is_relevant(posting: &Posting, keywords: &TermSet, blacklist: &TermSet) -> bool {
    matches_terms(&posting.title, &posting.content_snippet, keywords)
        && !matches_terms(&posting.title, &posting.content_snippet, blacklist)
}
