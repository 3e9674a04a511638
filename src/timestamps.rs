//! Time-label recognition, parsing and display formatting.
//!
//! Reader firmware writes event times as object keys rather than values, in
//! both ISO-like (`2025-12-07 18:49:15`) and underscore-separated
//! (`2025-12-07_18-49-15`) spellings. Everything here is total: malformed
//! labels yield `None`, never an error.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static DATE_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^20\d{2}[-_ ]\d{2}[-_ ]\d{2}").expect("valid date prefix regex"));

static FIRMWARE_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(20\d{2})[-_ ](\d{2})[-_ ](\d{2})(?:[T_ ](\d{2})[-:_ ](\d{2})(?:[-:_ ](\d{2}))?)?$",
    )
    .expect("valid firmware label regex")
});

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%dT%H-%M-%S",
];

/// Format used for every user-facing date-time string.
const DISPLAY_FORMAT: &str = "%-m/%-d/%Y, %-I:%M:%S %p";
const DISPLAY_PARSE_FORMAT: &str = "%m/%d/%Y, %I:%M:%S %p";

/// Decides whether a property name is a disguised timestamp.
pub fn is_timestamp_key(key: &str) -> bool {
    if key.is_empty() {
        return false;
    }
    if DATE_PREFIX.is_match(key) {
        return true;
    }
    parse_time_label(key).is_some()
}

/// Parses a time label to epoch milliseconds. Naive times are local.
pub fn parse_time_label(label: &str) -> Option<i64> {
    let trimmed = label.trim();
    if trimmed.is_empty() {
        return None;
    }

    let normalized = trimmed.replace('_', " ").replacen(' ', "T", 1);
    if let Ok(parsed) = DateTime::parse_from_rfc3339(&normalized) {
        return Some(parsed.timestamp_millis());
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&normalized, format) {
            return Some(local_millis(&naive));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(&normalized, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| local_millis(&naive));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, DISPLAY_PARSE_FORMAT) {
        return Some(local_millis(&naive));
    }
    parse_firmware_label(trimmed)
}

/// Renders epoch milliseconds in the local zone.
pub fn format_local(millis: i64) -> String {
    match Local.timestamp_millis_opt(millis).single() {
        Some(moment) => moment.format(DISPLAY_FORMAT).to_string(),
        None => millis.to_string(),
    }
}

/// Parses the label and renders it, or returns it verbatim.
pub fn display_label(label: &str) -> String {
    parse_time_label(label)
        .map(format_local)
        .unwrap_or_else(|| label.to_string())
}

fn parse_firmware_label(label: &str) -> Option<i64> {
    let captures = FIRMWARE_LABEL.captures(label)?;
    let number = |index: usize| -> Option<u32> {
        captures
            .get(index)
            .map_or(Some(0), |m| m.as_str().parse::<u32>().ok())
    };
    let year = captures.get(1)?.as_str().parse::<i32>().ok()?;
    let date = NaiveDate::from_ymd_opt(year, number(2)?, number(3)?)?;
    let naive = date.and_hms_opt(number(4)?, number(5)?, number(6)?)?;
    Some(local_millis(&naive))
}

fn local_millis(naive: &NaiveDateTime) -> i64 {
    match Local.from_local_datetime(naive).earliest() {
        Some(moment) => moment.timestamp_millis(),
        None => Utc.from_utc_datetime(naive).timestamp_millis(),
    }
}
