//! Date normalization for parsed response bodies.
//!
//! Server JSON carries timestamps as ISO-8601 strings. `normalize` walks the
//! value tree and turns every such string into a `DateTime<Utc>`, leaving
//! all other leaves untouched. Input is assumed acyclic.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};

/// A JSON value whose date-like strings have been converted to dates.
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    Date(DateTime<Utc>),
    Array(Vec<Normalized>),
    Object(Vec<(String, Normalized)>),
}

pub fn normalize(value: serde_json::Value) -> Normalized {
    match value {
        serde_json::Value::Null => Normalized::Null,
        serde_json::Value::Bool(b) => Normalized::Bool(b),
        serde_json::Value::Number(n) => Normalized::Number(n),
        serde_json::Value::String(s) => match parse_date(&s) {
            Some(date) => Normalized::Date(date),
            None => Normalized::String(s),
        },
        serde_json::Value::Array(items) => {
            Normalized::Array(items.into_iter().map(normalize).collect())
        }
        serde_json::Value::Object(map) => Normalized::Object(
            map.into_iter()
                .map(|(key, value)| (key, normalize(value)))
                .collect(),
        ),
    }
}

/// Parse `YYYY-MM-DDTHH:MM:SS[.fff][Z|±HH:MM]`. Strings without a zone are
/// taken as UTC.
pub fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    // Cheap shape check before handing to chrono.
    let bytes = s.as_bytes();
    if bytes.len() < 19 || bytes[4] != b'-' || bytes[7] != b'-' || bytes[10] != b'T' {
        return None;
    }
    if let Ok(date) = DateTime::parse_from_rfc3339(s) {
        return Some(date.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

impl Normalized {
    pub fn get(&self, key: &str) -> Option<&Normalized> {
        match self {
            Normalized::Object(fields) => fields
                .iter()
                .find(|(name, _)| name == key)
                .map(|(_, value)| value),
            _ => None,
        }
    }

    pub fn index(&self, i: usize) -> Option<&Normalized> {
        match self {
            Normalized::Array(items) => items.get(i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Normalized::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            Normalized::Date(date) => Some(*date),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Normalized]> {
        match self {
            Normalized::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Back to plain JSON; dates are rendered as RFC 3339 with milliseconds.
    pub fn into_json(self) -> serde_json::Value {
        match self {
            Normalized::Null => serde_json::Value::Null,
            Normalized::Bool(b) => serde_json::Value::Bool(b),
            Normalized::Number(n) => serde_json::Value::Number(n),
            Normalized::String(s) => serde_json::Value::String(s),
            Normalized::Date(date) => serde_json::Value::String(render_date(&date)),
            Normalized::Array(items) => {
                serde_json::Value::Array(items.into_iter().map(Normalized::into_json).collect())
            }
            Normalized::Object(fields) => serde_json::Value::Object(
                fields
                    .into_iter()
                    .map(|(key, value)| (key, value.into_json()))
                    .collect(),
            ),
        }
    }
}

fn render_date(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl Serialize for Normalized {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.clone().into_json().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn iso_string_becomes_date() {
        let normalized = normalize(json!({"createdAt": "2024-01-01T00:00:00.000Z"}));
        let expected = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(normalized.get("createdAt").and_then(Normalized::as_date), Some(expected));
    }

    #[test]
    fn non_date_strings_are_untouched() {
        let normalized = normalize(json!({"caption": "Grand opening!", "day": "2024-01-01"}));
        assert_eq!(normalized.get("caption").and_then(Normalized::as_str), Some("Grand opening!"));
        assert_eq!(normalized.get("day").and_then(Normalized::as_str), Some("2024-01-01"));
    }

    #[test]
    fn nested_objects_and_arrays_are_walked() {
        let normalized = normalize(json!({
            "posts": [
                {"scheduledAt": "2024-03-05T10:30:00+02:00", "tags": ["a", "b"]},
                {"scheduledAt": null}
            ]
        }));
        let first = normalized.get("posts").and_then(|p| p.index(0)).unwrap();
        let expected = Utc.with_ymd_and_hms(2024, 3, 5, 8, 30, 0).unwrap();
        assert_eq!(first.get("scheduledAt").and_then(Normalized::as_date), Some(expected));
        assert_eq!(first.get("tags").and_then(Normalized::as_array).map(<[_]>::len), Some(2));
        let second = normalized.get("posts").and_then(|p| p.index(1)).unwrap();
        assert_eq!(second.get("scheduledAt"), Some(&Normalized::Null));
    }

    #[test]
    fn zoneless_timestamp_is_utc() {
        let date = parse_date("2024-06-01T12:00:00").unwrap();
        assert_eq!(date, Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap());
    }

    #[test]
    fn almost_dates_are_rejected() {
        assert!(parse_date("2024-13-01T00:00:00Z").is_none());
        assert!(parse_date("2024-01-01 00:00:00").is_none());
        assert!(parse_date("hello").is_none());
    }

    #[test]
    fn into_json_renders_dates_with_millis() {
        let normalized = normalize(json!({"at": "2024-01-01T00:00:00Z", "n": 3}));
        assert_eq!(
            normalized.into_json(),
            json!({"at": "2024-01-01T00:00:00.000Z", "n": 3})
        );
    }
}
