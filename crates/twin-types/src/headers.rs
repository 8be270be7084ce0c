//! # Header Bag
//!
//! Ordered key/value metadata carried by every signal and response.
//!
//! Keys are unique and case-insensitive (stored lower-case). Insertion order
//! is preserved so that headers render the way the caller sent them.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};

/// Reserved header keys.
pub mod keys {
    /// Identifier correlating logs and replies of one logical request.
    pub const CORRELATION_ID: &str = "correlation-id";
    /// W3C trace context parent.
    pub const TRACE_PARENT: &str = "traceparent";
    /// W3C trace context vendor state.
    pub const TRACE_STATE: &str = "tracestate";
    /// Comma separated authorization subjects of the requester.
    pub const AUTHORIZATION_SUBJECTS: &str = "authorization-subjects";
}

/// Ordered, case-insensitive header map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DittoHeaders {
    entries: IndexMap<String, String>,
}

impl DittoHeaders {
    /// Create an empty header bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a copy with `key` set to `value`.
    #[must_use]
    pub fn with(mut self, key: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Return a copy carrying the given correlation id.
    #[must_use]
    pub fn with_correlation_id(self, correlation_id: impl Into<String>) -> Self {
        self.with(keys::CORRELATION_ID, correlation_id)
    }

    /// Return a copy carrying the given trace-parent.
    #[must_use]
    pub fn with_trace_parent(self, trace_parent: impl Into<String>) -> Self {
        self.with(keys::TRACE_PARENT, trace_parent)
    }

    /// Return a copy carrying the given authorization subjects.
    #[must_use]
    pub fn with_authorization_subjects<I, S>(self, subjects: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = subjects
            .into_iter()
            .map(|s| s.as_ref().trim().to_string())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(",");
        self.with(keys::AUTHORIZATION_SUBJECTS, joined)
    }

    /// Set `key` to `value`, replacing any previous value in place.
    pub fn insert(&mut self, key: impl AsRef<str>, value: impl Into<String>) -> Option<String> {
        self.entries
            .insert(key.as_ref().to_ascii_lowercase(), value.into())
    }

    /// Remove `key`, keeping the order of the remaining entries.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.entries.shift_remove(&key.to_ascii_lowercase())
    }

    /// Look up a header value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .get(&key.to_ascii_lowercase())
            .map(String::as_str)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(&key.to_ascii_lowercase())
    }

    #[must_use]
    pub fn correlation_id(&self) -> Option<&str> {
        self.get(keys::CORRELATION_ID)
    }

    #[must_use]
    pub fn trace_parent(&self) -> Option<&str> {
        self.get(keys::TRACE_PARENT)
    }

    /// Authorization subjects of the requester, in header order.
    #[must_use]
    pub fn authorization_subjects(&self) -> Vec<String> {
        self.get(keys::AUTHORIZATION_SUBJECTS)
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Iterate over entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Header keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for DittoHeaders
where
    K: AsRef<str>,
    V: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut headers = Self::new();
        for (key, value) in iter {
            headers.insert(key, value);
        }
        headers
    }
}

// keys go through `insert` so deserialized headers are lower-cased too
impl<'de> Deserialize<'de> for DittoHeaders {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        IndexMap::<String, String>::deserialize(deserializer).map(Self::from_iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_case_insensitive() {
        let headers = DittoHeaders::new().with("Correlation-ID", "c1");
        assert_eq!(headers.correlation_id(), Some("c1"));
        assert!(headers.contains_key("CORRELATION-ID"));
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn test_insertion_order_is_preserved() {
        let headers: DittoHeaders = [("b", "2"), ("a", "1"), ("c", "3")].into_iter().collect();
        let keys: Vec<_> = headers.keys().collect();
        assert_eq!(keys, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_overwrite_keeps_position() {
        let headers = DittoHeaders::new()
            .with("first", "1")
            .with("second", "2")
            .with("first", "one");
        let entries: Vec<_> = headers.iter().collect();
        assert_eq!(entries, vec![("first", "one"), ("second", "2")]);
    }

    #[test]
    fn test_with_leaves_original_untouched() {
        let original = DittoHeaders::new().with_correlation_id("c1");
        let modified = original.clone().with_trace_parent("tp-A");

        assert_eq!(original.trace_parent(), None);
        assert_eq!(modified.trace_parent(), Some("tp-A"));
        assert_eq!(modified.correlation_id(), Some("c1"));
    }

    #[test]
    fn test_authorization_subjects_roundtrip() {
        let headers =
            DittoHeaders::new().with_authorization_subjects(["nginx:alice", " ", "nginx:bob "]);
        assert_eq!(
            headers.authorization_subjects(),
            vec!["nginx:alice".to_string(), "nginx:bob".to_string()]
        );
        assert!(DittoHeaders::new().authorization_subjects().is_empty());
    }

    #[test]
    fn test_remove_keeps_remaining_order() {
        let mut headers: DittoHeaders =
            [("a", "1"), ("b", "2"), ("c", "3")].into_iter().collect();
        assert_eq!(headers.remove("B"), Some("2".to_string()));
        let keys: Vec<_> = headers.keys().collect();
        assert_eq!(keys, vec!["a", "c"]);
    }

    #[test]
    fn test_serializes_as_plain_object() {
        let headers = DittoHeaders::new().with_correlation_id("c1");
        let json = serde_json::to_value(&headers).unwrap();
        assert_eq!(json, serde_json::json!({ "correlation-id": "c1" }));
    }

    #[test]
    fn test_deserialized_keys_are_case_insensitive() {
        let headers: DittoHeaders = serde_json::from_value(serde_json::json!({
            "Correlation-Id": "c1",
            "TraceParent": "tp-A",
        }))
        .unwrap();

        assert_eq!(headers.correlation_id(), Some("c1"));
        assert_eq!(headers.trace_parent(), Some("tp-A"));
        let keys: Vec<_> = headers.keys().collect();
        assert_eq!(keys, vec!["correlation-id", "traceparent"]);
    }
}
