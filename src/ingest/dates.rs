// src/ingest/dates.rs
//! Tolerant publish-date parsing.
//!
//! Attempt order: ISO-8601 instant, `YYYY-MM-DD HH:MM:SS` (UTC),
//! `DD/MM/YYYY hh:mm:ss AM|PM` (UTC), then generic forms (RFC 2822, bare date,
//! unix seconds/millis). Anything unparseable or more than a year ahead
//! resolves to the processing instant.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use time::{format_description::well_known::Rfc2822, OffsetDateTime};
use tracing::{debug, warn};

/// Upper bound for how far in the future a publish date may lie.
pub const MAX_FUTURE_DAYS: i64 = 365;

/// Parse a raw date string without any clamping. `None` if no format matches.
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    parse_iso(s)
        .or_else(|| parse_space_delimited(s))
        .or_else(|| parse_day_first_12h(s))
        .or_else(|| parse_generic(s))
}

/// Resolve the publish instant of a record relative to `now`.
pub fn resolve_publish_instant(raw: Option<&str>, now: DateTime<Utc>) -> DateTime<Utc> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        debug!(target: "ingest", "no publish date; using processing instant");
        return now;
    };
    match parse_date(raw) {
        Some(dt) if dt > now + Duration::days(MAX_FUTURE_DAYS) => {
            warn!(target: "ingest", raw, "publish date more than a year ahead; clamped to now");
            now
        }
        Some(dt) => dt,
        None => {
            warn!(target: "ingest", raw, "unparseable publish date; using processing instant");
            now
        }
    }
}

fn parse_iso(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Offsets without a colon, e.g. `2025-01-02T10:00:00+0000`.
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(dt.with_timezone(&Utc));
    }
    // Naive ISO is read as UTC.
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|n| n.and_utc())
}

fn parse_space_delimited(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|n| n.and_utc())
}

fn parse_day_first_12h(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, "%d/%m/%Y %I:%M:%S %p")
        .ok()
        .map(|n| n.and_utc())
}

fn parse_generic(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(odt) = OffsetDateTime::parse(s, &Rfc2822) {
        return DateTime::from_timestamp(odt.unix_timestamp(), odt.nanosecond());
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0).map(|n| n.and_utc());
    }
    if let Ok(n) = s.parse::<i64>() {
        // 13-digit values are milliseconds.
        return if n.unsigned_abs() >= 100_000_000_000 {
            DateTime::from_timestamp_millis(n)
        } else {
            DateTime::from_timestamp(n, 0)
        };
    }
    None
}
