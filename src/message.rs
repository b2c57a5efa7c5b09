//! Rendering of the Slack summary text.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::models::{Posting, SiteResult};

/// Postings listed individually before the remainder is summarized.
pub const MAX_LISTED_POSTINGS: usize = 30;

/// Everything the formatter needs for one message.
pub struct SummaryInput<'a> {
    pub tz: &'a str,
    pub run_at: DateTime<Utc>,
    pub new_postings: &'a [Posting],
    pub keyword_matched: usize,
    pub site_results: &'a [SiteResult],
    pub notified_errors: &'a [String],
    pub transient_failures: &'a [String],
    pub heartbeat_only: bool,
}

/// Format `run_at` in `tz`; an unknown zone falls back to UTC.
pub fn local_timestamp(run_at: DateTime<Utc>, tz: &str) -> String {
    const FORMAT: &str = "%Y-%m-%d %H:%M";
    match tz.parse::<Tz>() {
        Ok(zone) => run_at.with_timezone(&zone).format(FORMAT).to_string(),
        Err(_) => run_at.format(FORMAT).to_string(),
    }
}

pub fn render_summary(input: &SummaryInput<'_>) -> String {
    let success_count = input.site_results.iter().filter(|r| r.is_ok()).count();
    let failed_count = input.site_results.len() - success_count;

    let mut lines = vec![
        format!(
            "[Construction/Casual Job Alert] {} ({})",
            local_timestamp(input.run_at, input.tz),
            input.tz
        ),
        format!(
            "New {} | Keyword matches {} | Sites ok {} / failed {}",
            input.new_postings.len(),
            input.keyword_matched,
            success_count,
            failed_count
        ),
    ];

    if !input.new_postings.is_empty() {
        lines.push(String::new());
        lines.push("New postings".to_string());
        for posting in input.new_postings.iter().take(MAX_LISTED_POSTINGS) {
            lines.push(format!(
                "- [{}] {} - {}",
                posting.source, posting.title, posting.url
            ));
        }
        if input.new_postings.len() > MAX_LISTED_POSTINGS {
            lines.push(format!(
                "- ... and {} more",
                input.new_postings.len() - MAX_LISTED_POSTINGS
            ));
        }
    } else if input.heartbeat_only {
        lines.push(String::new());
        lines.push("Weekly check: no new postings this period".to_string());
    }

    if !input.notified_errors.is_empty() {
        lines.push(String::new());
        lines.push("Errors".to_string());
        lines.extend(input.notified_errors.iter().map(|e| format!("- {e}")));
    } else if !input.transient_failures.is_empty() {
        lines.push(String::new());
        lines.push("Transient failures (not yet escalated)".to_string());
        lines.extend(input.transient_failures.iter().map(|w| format!("- {w}")));
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn run_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 19, 0, 0, 0).unwrap()
    }

    fn postings(n: usize) -> Vec<Posting> {
        (0..n)
            .map(|i| {
                Posting::new(
                    "woorimel",
                    i.to_string(),
                    format!("건설 잡부 {i}"),
                    format!("https://example.com/{i}"),
                )
            })
            .collect()
    }

    fn input<'a>(
        new_postings: &'a [Posting],
        results: &'a [SiteResult],
        notified: &'a [String],
        transient: &'a [String],
        heartbeat_only: bool,
    ) -> SummaryInput<'a> {
        SummaryInput {
            tz: "Australia/Melbourne",
            run_at: run_at(),
            new_postings,
            keyword_matched: new_postings.len(),
            site_results: results,
            notified_errors: notified,
            transient_failures: transient,
            heartbeat_only,
        }
    }

    #[test]
    fn header_uses_local_time() {
        let results = vec![SiteResult::ok("woorimel", vec![])];
        let text = render_summary(&input(&[], &results, &[], &[], true));
        // Melbourne is UTC+11 in February (daylight saving)
        assert!(text.starts_with("[Construction/Casual Job Alert] 2026-02-19 11:00 (Australia/Melbourne)"));
        assert!(text.contains("Sites ok 1 / failed 0"));
    }

    #[test]
    fn unknown_zone_falls_back_to_utc() {
        assert_eq!(local_timestamp(run_at(), "Mars/Olympus"), "2026-02-19 00:00");
    }

    #[test]
    fn lists_postings_and_truncates_after_thirty() {
        let new = postings(32);
        let text = render_summary(&input(&new, &[], &[], &[], false));
        assert!(text.contains("New postings"));
        assert!(text.contains("- [woorimel] 건설 잡부 0 - https://example.com/0"));
        assert!(text.contains("- [woorimel] 건설 잡부 29 - https://example.com/29"));
        assert!(!text.contains("건설 잡부 30 "));
        assert!(text.contains("- ... and 2 more"));
    }

    #[test]
    fn exactly_thirty_has_no_truncation_line() {
        let new = postings(30);
        let text = render_summary(&input(&new, &[], &[], &[], false));
        assert!(!text.contains("more"));
    }

    #[test]
    fn heartbeat_only_line() {
        let text = render_summary(&input(&[], &[], &[], &[], true));
        assert!(text.contains("Weekly check: no new postings this period"));
        assert!(!text.contains("New postings"));
    }

    #[test]
    fn notified_errors_hide_transient_section() {
        let notified = vec!["melbsky: timeout (consecutive failures: 2)".to_string()];
        let transient = vec!["hojubada: consecutive failures: 1".to_string()];
        let text = render_summary(&input(&[], &[], &notified, &transient, false));
        assert!(text.contains("Errors\n- melbsky: timeout (consecutive failures: 2)"));
        assert!(!text.contains("not yet escalated"));
    }

    #[test]
    fn transient_section_when_nothing_escalated() {
        let transient = vec!["melbsky: consecutive failures: 1".to_string()];
        let results = vec![
            SiteResult::ok("woorimel", vec![]),
            SiteResult::failed("melbsky", "timeout"),
        ];
        let new = postings(1);
        let text = render_summary(&input(&new, &results, &[], &transient, false));
        assert!(text.contains("Transient failures (not yet escalated)"));
        assert!(text.contains("Sites ok 1 / failed 1"));
        assert!(!text.contains("\nErrors\n"));
    }
}
