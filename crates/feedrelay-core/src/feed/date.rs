//! Normalization of feed-supplied date strings.
//!
//! Feeds disagree on how they write dates. Three shapes are accepted, tried in
//! this order:
//!
//! 1. RFC 1123 with a zone name: `Tue, 05 Mar 2024 09:30:00 GMT`
//! 2. RFC 1123 with a numeric zone: `Tue, 05 Mar 2024 18:30:00 +0900`
//! 3. ISO 8601 with a numeric offset: `2024-03-05T18:30:00+09:00`
//!
//! Anything else normalizes to the current time so the entry is treated as
//! freshly published instead of silently dropped.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};

/// Format used for markers this program writes itself (new checkpoints)
pub const CANONICAL_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

const RFC1123_BODY: &str = "%d %b %Y %H:%M:%S";
const RFC1123_NUMERIC: &str = "%d %b %Y %H:%M:%S %z";
const ISO8601_OFFSET: &str = "%Y-%m-%dT%H:%M:%S%z";

/// Render an instant in the canonical marker format
pub fn format_marker(at: DateTime<Utc>) -> String {
    at.format(CANONICAL_FORMAT).to_string()
}

/// Parse `raw`, falling back to now (with a warning) when no format matches
pub fn parse(raw: &str) -> DateTime<Utc> {
    try_parse(raw).unwrap_or_else(|| {
        tracing::warn!(input = raw, "Failed to parse feed date, substituting current time");
        Utc::now()
    })
}

/// Parse `raw` with the accepted formats, in priority order
pub fn try_parse(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    parse_named_zone(raw)
        .or_else(|| parse_numeric_zone(raw))
        .or_else(|| parse_iso_offset(raw))
}

/// The weekday is informational and frequently wrong in real feeds
fn strip_weekday(raw: &str) -> &str {
    match raw.split_once(',') {
        Some((day, rest)) if day.len() == 3 && day.chars().all(|c| c.is_ascii_alphabetic()) => {
            rest.trim_start()
        }
        _ => raw,
    }
}

fn parse_named_zone(raw: &str) -> Option<DateTime<Utc>> {
    let (stamp, zone) = strip_weekday(raw).rsplit_once(' ')?;
    let offset = zone_offset(zone)?;
    let naive = NaiveDateTime::parse_from_str(stamp, RFC1123_BODY).ok()?;

    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_numeric_zone(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(strip_weekday(raw), RFC1123_NUMERIC)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_iso_offset(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(raw, ISO8601_OFFSET)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Zone names from RFC 822 plus JST, which Japanese feeds commonly emit
fn zone_offset(name: &str) -> Option<FixedOffset> {
    let hours = match name.to_ascii_uppercase().as_str() {
        "GMT" | "UT" | "UTC" | "Z" => 0,
        "EST" => -5,
        "EDT" => -4,
        "CST" => -6,
        "CDT" => -5,
        "MST" => -7,
        "MDT" => -6,
        "PST" => -8,
        "PDT" => -7,
        "JST" => 9,
        _ => return None,
    };
    FixedOffset::east_opt(hours * 3600)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    #[test]
    fn test_named_zone() {
        assert_eq!(
            try_parse("Tue, 05 Mar 2024 09:30:00 GMT"),
            Some(utc(2024, 3, 5, 9, 30, 0))
        );
        assert_eq!(
            try_parse("Tue, 05 Mar 2024 18:30:00 JST"),
            Some(utc(2024, 3, 5, 9, 30, 0))
        );
        assert_eq!(
            try_parse("Tue, 05 Mar 2024 04:30:00 EST"),
            Some(utc(2024, 3, 5, 9, 30, 0))
        );
    }

    #[test]
    fn test_numeric_zone() {
        assert_eq!(
            try_parse("Tue, 05 Mar 2024 18:30:00 +0900"),
            Some(utc(2024, 3, 5, 9, 30, 0))
        );
        assert_eq!(
            try_parse("Tue, 05 Mar 2024 09:30:00 +0000"),
            Some(utc(2024, 3, 5, 9, 30, 0))
        );
    }

    #[test]
    fn test_iso_offset() {
        assert_eq!(
            try_parse("2024-03-05T18:30:00+0900"),
            Some(utc(2024, 3, 5, 9, 30, 0))
        );
        assert_eq!(
            try_parse("2024-03-05T18:30:00+09:00"),
            Some(utc(2024, 3, 5, 9, 30, 0))
        );
        assert_eq!(
            try_parse("2024-03-05T09:30:00Z"),
            Some(utc(2024, 3, 5, 9, 30, 0))
        );
    }

    #[test]
    fn test_wrong_weekday_is_tolerated() {
        assert_eq!(
            try_parse("Mon, 05 Mar 2024 09:30:00 GMT"),
            Some(utc(2024, 3, 5, 9, 30, 0))
        );
    }

    #[test]
    fn test_unknown_zone_name_is_rejected() {
        assert_eq!(try_parse("Tue, 05 Mar 2024 09:30:00 XYZ"), None);
    }

    #[test]
    fn test_bare_date_fails_open_to_now() {
        assert_eq!(try_parse("2024-03-05"), None);

        let before = Utc::now();
        let parsed = parse("2024-03-05");
        let after = Utc::now();
        assert!(parsed >= before && parsed <= after);
    }

    #[test]
    fn test_empty_fails_open_to_now() {
        let before = Utc::now();
        assert!(parse("   ") >= before);
    }

    #[test]
    fn test_canonical_format_round_trips() {
        let at = utc(2024, 3, 5, 9, 30, 0);
        let marker = format_marker(at);
        assert_eq!(marker, "Tue, 05 Mar 2024 09:30:00 GMT");
        assert_eq!(try_parse(&marker), Some(at));
    }

    #[test]
    fn test_parse_is_idempotent() {
        let raw = "Tue, 05 Mar 2024 18:30:00 +0900";
        assert_eq!(parse(raw), parse(raw));
    }
}
