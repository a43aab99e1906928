//! Defensive accessors over untrusted carrier JSON.
//!
//! Carrier payloads are frequently incomplete or reshaped without notice, so
//! every accessor here answers `None` instead of failing.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

/// Naive layouts carriers use without an offset. Interpreted as UTC.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// Walk a dotted path such as `events.0.status.code`.
///
/// Numeric segments index into arrays.
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Read a string or number at `path`. Blank strings count as absent.
pub fn string_at(value: &Value, path: &str) -> Option<String> {
    match lookup(value, path)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// First non-blank string found among `paths`, in order.
pub fn first_string_at(value: &Value, paths: &[&str]) -> Option<String> {
    paths.iter().find_map(|path| string_at(value, path))
}

/// Array at `path`, or an empty slice when absent or not an array.
pub fn array_at<'a>(value: &'a Value, path: &str) -> &'a [Value] {
    match lookup(value, path) {
        Some(Value::Array(items)) => items,
        _ => &[],
    }
}

/// Timestamp at `path`, parsed permissively.
pub fn timestamp_at(value: &Value, path: &str) -> Option<DateTime<Utc>> {
    lookup(value, path).and_then(parse_timestamp)
}

/// True when the carrier sent nothing usable.
pub fn is_empty_payload(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// True when `path` holds a non-empty value.
pub fn is_present(value: &Value, path: &str) -> bool {
    lookup(value, path).is_some_and(|v| !is_empty_payload(v))
}

/// Parse RFC 3339, common naive layouts, plain dates and unix timestamps
/// (seconds or milliseconds). Anything else is `None`.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_timestamp_str(s.trim()),
        Value::Number(n) => n.as_i64().and_then(from_unix),
        _ => None,
    }
}

fn parse_timestamp_str(s: &str) -> Option<DateTime<Utc>> {
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%z") {
        return Some(dt.with_timezone(&Utc));
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
    }

    s.parse::<i64>().ok().and_then(from_unix)
}

fn from_unix(n: i64) -> Option<DateTime<Utc>> {
    // Values this large are milliseconds.
    if n.abs() >= 100_000_000_000 {
        Utc.timestamp_millis_opt(n).single()
    } else {
        Utc.timestamp_opt(n, 0).single()
    }
}
