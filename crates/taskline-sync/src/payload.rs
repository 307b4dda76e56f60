//! Typed extractors over the dynamic operation payload.
//!
//! Sync clients send payloads as free-form JSON objects. Rather than
//! scattering type assertions through the engine, this module exposes a
//! small set of typed accessors that tolerate the formats real clients
//! produce and drop silently on type mismatch:
//!
//! - strings via [`Payload::string`]
//! - timestamps via [`Payload::timestamp`] (RFC 3339 or Unix milliseconds)
//! - string lists via [`Payload::string_list`]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A string-keyed operation payload with typed, tolerant accessors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(Map<String, Value>);

impl Payload {
    /// Creates an empty payload.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the string value for `key`, or `None` when the key is absent
    /// or holds a non-string value.
    #[must_use]
    pub fn string(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Returns the timestamp value for `key`.
    ///
    /// Accepts either an RFC 3339 string or a numeric Unix-millisecond
    /// value; anything else (including unparseable strings) yields `None`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn timestamp(&self, key: &str) -> Option<DateTime<Utc>> {
        match self.0.get(key)? {
            Value::String(s) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
            Value::Number(n) => {
                let millis = n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?;
                DateTime::from_timestamp_millis(millis)
            }
            _ => None,
        }
    }

    /// Returns the list of non-empty strings for `key`, or `None` when the
    /// key is absent or holds a non-array value.
    ///
    /// Non-string and empty elements are skipped, so `Some(vec![])` is a
    /// meaningful result distinct from `None`.
    #[must_use]
    pub fn string_list(&self, key: &str) -> Option<Vec<String>> {
        let items = self.0.get(key)?.as_array()?;
        Some(
            items
                .iter()
                .filter_map(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    /// Inserts a value under `key`, replacing any previous value.
    ///
    /// Primarily a convenience for constructing payloads in tests and
    /// internal tooling.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }
}

impl From<Map<String, Value>> for Payload {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: Value) -> Payload {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn string_ignores_wrong_types() {
        let p = payload(json!({"title": "A", "status": 7}));
        assert_eq!(p.string("title"), Some("A"));
        assert_eq!(p.string("status"), None);
        assert_eq!(p.string("missing"), None);
    }

    #[test]
    fn timestamp_accepts_rfc3339() {
        let p = payload(json!({"due_at": "2025-01-01T00:00:00Z"}));
        let ts = p.timestamp("due_at").unwrap();
        assert_eq!(ts.timestamp(), 1_735_689_600);
    }

    #[test]
    fn timestamp_accepts_unix_millis() {
        let p = payload(json!({"due_at": 1_735_689_600_000_i64}));
        let ts = p.timestamp("due_at").unwrap();
        assert_eq!(ts.timestamp(), 1_735_689_600);
    }

    #[test]
    fn timestamp_drops_garbage() {
        let p = payload(json!({"due_at": "tomorrow-ish", "other": true}));
        assert_eq!(p.timestamp("due_at"), None);
        assert_eq!(p.timestamp("other"), None);
    }

    #[test]
    fn string_list_distinguishes_empty_from_absent() {
        let p = payload(json!({"attachment_ids": []}));
        assert_eq!(p.string_list("attachment_ids"), Some(vec![]));
        assert_eq!(p.string_list("missing"), None);
    }

    #[test]
    fn string_list_skips_non_string_and_empty_elements() {
        let p = payload(json!({"attachment_ids": ["f1", "", 3, "f2"]}));
        assert_eq!(
            p.string_list("attachment_ids"),
            Some(vec!["f1".to_string(), "f2".to_string()])
        );
    }

    #[test]
    fn string_list_rejects_non_arrays() {
        let p = payload(json!({"attachment_ids": "f1"}));
        assert_eq!(p.string_list("attachment_ids"), None);
    }
}
