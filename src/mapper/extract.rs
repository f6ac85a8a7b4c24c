//! Tolerant field extraction over raw source payloads.
//!
//! The source system exposes both PascalCase and camelCase variants of every
//! field depending on endpoint and API vintage, so all payload access goes
//! through "first non-empty of N candidate keys" accessors instead of
//! per-field fallback chains.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value as JsonValue;

/// First non-null, non-empty value among the candidate keys.
pub fn first_value<'a>(payload: &'a JsonValue, keys: &[&str]) -> Option<&'a JsonValue> {
    let obj = payload.as_object()?;
    for key in keys {
        match obj.get(*key) {
            Some(JsonValue::Null) | None => continue,
            Some(JsonValue::String(s)) if s.trim().is_empty() => continue,
            Some(value) => return Some(value),
        }
    }
    None
}

/// First candidate key resolving to a non-empty string. Numbers are
/// stringified since the source is inconsistent about numeric ids.
pub fn first_string(payload: &JsonValue, keys: &[&str]) -> Option<String> {
    match first_value(payload, keys)? {
        JsonValue::String(s) => Some(s.trim().to_string()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// First candidate key resolving to a boolean. Accepts real booleans plus
/// the "true"/"false"/"1"/"0" strings some endpoints emit.
pub fn first_bool(payload: &JsonValue, keys: &[&str]) -> Option<bool> {
    match first_value(payload, keys)? {
        JsonValue::Bool(b) => Some(*b),
        JsonValue::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        },
        JsonValue::Number(n) => n.as_i64().map(|v| v != 0),
        _ => None,
    }
}

/// First candidate key resolving to an array.
pub fn first_array<'a>(payload: &'a JsonValue, keys: &[&str]) -> Option<&'a Vec<JsonValue>> {
    first_value(payload, keys).and_then(JsonValue::as_array)
}

/// Interpret a response body as a list, tolerating the wrapper objects
/// some endpoints put around their arrays.
pub fn unwrap_list(value: &JsonValue) -> Option<&Vec<JsonValue>> {
    if let Some(items) = value.as_array() {
        return Some(items);
    }
    first_value(value, &["Items", "items", "Data", "data", "value", "results"])
        .and_then(JsonValue::as_array)
}

/// First candidate key resolving to a parseable calendar date.
pub fn first_date(payload: &JsonValue, keys: &[&str]) -> Option<NaiveDate> {
    first_string(payload, keys).and_then(|raw| date_only(&raw))
}

/// Coerce a raw timestamp or date string to its calendar date, tolerating
/// the formats the source system emits.
pub fn date_only(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt.date());
    }
    if let Ok(d) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Some(d);
    }
    if let Ok(d) = NaiveDate::parse_from_str(trimmed, "%m/%d/%Y") {
        return Some(d);
    }
    None
}

/// Render a calendar date in the sink's `YYYY-MM-DD` column format.
pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}
