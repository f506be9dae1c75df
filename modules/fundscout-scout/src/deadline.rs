//! Deadline normalization with a deterministic synthetic fallback.
//!
//! Extracted deadline strings arrive in every format imaginable, or not at
//! all. A parsed date is accepted only inside [-1 year, +5 years] of now.
//! Anything else gets a synthetic deadline derived from a hash of the URL,
//! mapped into [30, 365) days out — so re-extracting the same URL always
//! converges to the same fallback date.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use tracing::debug;

/// Earliest synthetic deadline offset, in days from now.
const MIN_FALLBACK_DAYS: i64 = 30;

/// Width of the synthetic window: offsets land in [30, 365).
const FALLBACK_SPAN_DAYS: u64 = 335;

/// Date formats we attempt, in order.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%B %d, %Y",
    "%b %d, %Y",
    "%B %d %Y",
    "%d %B %Y",
    "%m/%d/%Y",
    "%Y/%m/%d",
];

/// Normalize a raw deadline string against the clock. Returns a calendar
/// date formatted as YYYY-MM-DD.
pub fn normalize_deadline(raw: Option<&str>, url: &str) -> String {
    normalize_deadline_at(raw, url, Utc::now())
}

/// Pure core, testable with a pinned `now`.
pub fn normalize_deadline_at(raw: Option<&str>, url: &str, now: DateTime<Utc>) -> String {
    if let Some(raw) = raw {
        if let Some(date) = parse_date(raw.trim()) {
            let min = (now - Duration::days(365)).date_naive();
            let max = (now + Duration::days(5 * 365)).date_naive();
            if date >= min && date <= max {
                return date.format("%Y-%m-%d").to_string();
            }
            debug!(raw, %date, "Extracted deadline outside accepted range, synthesizing");
        }
    }
    synthetic_deadline(url, now)
}

/// Deterministic fallback: hash the URL's characters into [30, 365) days out.
pub fn synthetic_deadline(url: &str, now: DateTime<Utc>) -> String {
    let offset = MIN_FALLBACK_DAYS + (char_hash(url) % FALLBACK_SPAN_DAYS) as i64;
    (now + Duration::days(offset))
        .date_naive()
        .format("%Y-%m-%d")
        .to_string()
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return Some(date);
        }
    }
    None
}

/// Polynomial rolling hash over the URL's characters. Not cryptographic —
/// only stability matters.
fn char_hash(url: &str) -> u64 {
    url.chars()
        .fold(0u64, |h, c| h.wrapping_mul(31).wrapping_add(c as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const URL: &str = "https://scholarships.example.org/stem-award";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn valid_iso_deadline_passes_through() {
        let d = normalize_deadline_at(Some("2026-10-01"), URL, now());
        assert_eq!(d, "2026-10-01");
    }

    #[test]
    fn human_formats_are_normalized() {
        assert_eq!(
            normalize_deadline_at(Some("October 1, 2026"), URL, now()),
            "2026-10-01"
        );
        assert_eq!(
            normalize_deadline_at(Some("Oct 1, 2026"), URL, now()),
            "2026-10-01"
        );
        assert_eq!(
            normalize_deadline_at(Some("10/01/2026"), URL, now()),
            "2026-10-01"
        );
    }

    #[test]
    fn recent_past_deadline_is_kept() {
        // Within the -1 year acceptance window.
        assert_eq!(
            normalize_deadline_at(Some("2025-12-01"), URL, now()),
            "2025-12-01"
        );
    }

    #[test]
    fn ancient_deadline_gets_synthetic_fallback() {
        let d = normalize_deadline_at(Some("2019-01-01"), URL, now());
        assert_eq!(d, synthetic_deadline(URL, now()));
    }

    #[test]
    fn far_future_deadline_gets_synthetic_fallback() {
        let d = normalize_deadline_at(Some("2099-01-01"), URL, now());
        assert_eq!(d, synthetic_deadline(URL, now()));
    }

    #[test]
    fn garbage_and_absent_deadlines_fall_back() {
        let from_garbage = normalize_deadline_at(Some("rolling admissions"), URL, now());
        let from_absent = normalize_deadline_at(None, URL, now());
        assert_eq!(from_garbage, from_absent);
        assert_eq!(from_absent, synthetic_deadline(URL, now()));
    }

    #[test]
    fn synthetic_fallback_is_deterministic() {
        let a = normalize_deadline_at(None, URL, now());
        let b = normalize_deadline_at(None, URL, now());
        let c = normalize_deadline_at(Some("TBD"), URL, now());
        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn synthetic_fallback_lands_in_window() {
        for url in [
            "https://a.example.org",
            "https://b.example.org/path?q=1",
            "https://c.example.edu/very/long/path/to/an/award/page",
            "",
        ] {
            let date = NaiveDate::parse_from_str(&synthetic_deadline(url, now()), "%Y-%m-%d")
                .expect("synthetic deadline parses");
            let offset = (date - now().date_naive()).num_days();
            assert!((30..365).contains(&offset), "offset {offset} for {url:?}");
        }
    }

    #[test]
    fn different_urls_usually_differ() {
        let a = synthetic_deadline("https://a.example.org/award", now());
        let b = synthetic_deadline("https://b.example.org/other", now());
        assert_ne!(a, b);
    }
}
