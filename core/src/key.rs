//! Request identity used for de-duplication.
//!
//! A key is `METHOD:URL:serialized-body`. Bodies are serialized through
//! `serde_json::Value`, whose object map is ordered by key, so two payloads
//! with the same fields in a different order produce the same key.

use std::fmt;

use crate::http::HttpMethod;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey(String);

impl RequestKey {
    pub fn derive(method: HttpMethod, url: &str, body: Option<&serde_json::Value>) -> Self {
        let body = body.map(canonical_json).unwrap_or_default();
        Self(format!("{}:{url}:{body}", method.as_str()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn canonical_json(value: &serde_json::Value) -> String {
    // Display on Value cannot fail.
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_without_body_has_empty_segment() {
        let key = RequestKey::derive(HttpMethod::Get, "http://api/posts", None);
        assert_eq!(key.as_str(), "GET:http://api/posts:");
    }

    #[test]
    fn identical_descriptors_yield_identical_keys() {
        let body = json!({"caption": "hi", "platform": "instagram"});
        let a = RequestKey::derive(HttpMethod::Post, "http://api/posts", Some(&body));
        let b = RequestKey::derive(HttpMethod::Post, "http://api/posts", Some(&body.clone()));
        assert_eq!(a, b);
    }

    #[test]
    fn field_order_does_not_change_the_key() {
        let a: serde_json::Value = serde_json::from_str(r#"{"a":1,"b":2}"#).unwrap();
        let b: serde_json::Value = serde_json::from_str(r#"{"b":2,"a":1}"#).unwrap();
        assert_eq!(
            RequestKey::derive(HttpMethod::Get, "u", Some(&a)),
            RequestKey::derive(HttpMethod::Get, "u", Some(&b))
        );
    }

    #[test]
    fn distinct_bodies_yield_distinct_keys() {
        let a = RequestKey::derive(HttpMethod::Post, "u", Some(&json!({"n": 1})));
        let b = RequestKey::derive(HttpMethod::Post, "u", Some(&json!({"n": 2})));
        assert_ne!(a, b);
    }

    #[test]
    fn method_is_part_of_the_key() {
        let get = RequestKey::derive(HttpMethod::Get, "u", None);
        let head = RequestKey::derive(HttpMethod::Head, "u", None);
        assert_ne!(get, head);
    }
}
