//! Error types for the studio API client.
//!
//! # Design
//! Every failed call surfaces as a `StructuredError` carrying the HTTP
//! status, the raw response payload and an ordered list of human-readable
//! messages. Transport failures without a response are reported with
//! status 500. `ApiError` is `Clone` because a de-duplicated call hands the
//! same settled result to every waiter.

use serde::Serialize;
use thiserror::Error;

use crate::http::HttpResponse;

/// Status reported when the transport produced no response.
pub const TRANSPORT_FAILURE_STATUS: u16 = 500;

/// Message used when a transport failure carries no text of its own.
pub const GENERIC_ERROR_MESSAGE: &str = "Network Error";

/// Normalized error shape surfaced to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructuredError {
    pub status: u16,
    pub data: serde_json::Value,
    pub messages: Vec<String>,
}

impl StructuredError {
    /// Translate a non-2xx response.
    pub fn from_response(response: &HttpResponse) -> Self {
        let data = serde_json::from_str(&response.body)
            .unwrap_or_else(|_| raw_payload(&response.body));
        let fallback = format!("Request failed with status code {}", response.status);
        let messages = ServerMessage::from_payload(&data).into_messages(fallback);
        Self {
            status: response.status,
            data,
            messages,
        }
    }

    /// Translate a failure that produced no response at all.
    pub fn from_transport(err: &TransportError) -> Self {
        let text = if err.message.is_empty() {
            GENERIC_ERROR_MESSAGE.to_string()
        } else {
            err.message.clone()
        };
        Self {
            status: TRANSPORT_FAILURE_STATUS,
            data: serde_json::Value::Null,
            messages: vec![text],
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }
}

fn raw_payload(body: &str) -> serde_json::Value {
    if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::Value::String(body.to_string())
    }
}

/// Shape of the `message` field in a server error payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    Many(Vec<String>),
    One(String),
    Missing,
}

impl ServerMessage {
    pub fn from_payload(payload: &serde_json::Value) -> Self {
        match payload.get("message") {
            Some(serde_json::Value::Array(items)) => ServerMessage::Many(
                items
                    .iter()
                    .map(|item| match item {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect(),
            ),
            Some(serde_json::Value::String(s)) => ServerMessage::One(s.clone()),
            Some(serde_json::Value::Null) | None => ServerMessage::Missing,
            Some(other) => ServerMessage::One(other.to_string()),
        }
    }

    pub fn into_messages(self, fallback: String) -> Vec<String> {
        match self {
            ServerMessage::Many(messages) => messages,
            ServerMessage::One(message) => vec![message],
            ServerMessage::Missing => vec![fallback],
        }
    }
}

/// Failure reported by a `Transport` when no response was received.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("transport failed: {message}")]
pub struct TransportError {
    pub message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Errors returned by `StudioClient` and the `api::parse_*` functions.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The call failed at the transport or HTTP level.
    #[error("HTTP {}: {}", .0.status, .0.messages.join("; "))]
    Status(StructuredError),

    /// The call was cancelled before it settled.
    #[error("request cancelled")]
    Cancelled,

    /// The response body could not be deserialized into the expected type.
    #[error("deserialization failed: {0}")]
    DeserializationError(String),

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    SerializationError(String),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status(err) => Some(err.status),
            _ => None,
        }
    }

    pub fn structured(&self) -> Option<&StructuredError> {
        match self {
            ApiError::Status(err) => Some(err),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

impl From<StructuredError> for ApiError {
    fn from(err: StructuredError) -> Self {
        ApiError::Status(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: Vec::new(),
            body: body.to_string(),
        }
    }

    #[test]
    fn array_message_is_kept_in_order() {
        let err = StructuredError::from_response(&response(400, r#"{"message":["A","B"]}"#));
        assert_eq!(err.status, 400);
        assert_eq!(err.messages, vec!["A", "B"]);
        assert_eq!(err.data, json!({"message": ["A", "B"]}));
    }

    #[test]
    fn scalar_message_becomes_single_entry() {
        let err = StructuredError::from_response(&response(404, r#"{"message":"A"}"#));
        assert_eq!(err.messages, vec!["A"]);
    }

    #[test]
    fn missing_message_uses_generic_text() {
        let err = StructuredError::from_response(&response(503, r#"{"error":"down"}"#));
        assert_eq!(err.messages, vec!["Request failed with status code 503"]);
    }

    #[test]
    fn non_json_body_is_kept_as_raw_string() {
        let err = StructuredError::from_response(&response(502, "bad gateway"));
        assert_eq!(err.data, json!("bad gateway"));
        assert_eq!(err.messages, vec!["Request failed with status code 502"]);
    }

    #[test]
    fn empty_body_is_null_payload() {
        let err = StructuredError::from_response(&response(500, ""));
        assert_eq!(err.data, serde_json::Value::Null);
    }

    #[test]
    fn transport_failure_defaults_to_500() {
        let err = StructuredError::from_transport(&TransportError::new("connection refused"));
        assert_eq!(err.status, 500);
        assert_eq!(err.data, serde_json::Value::Null);
        assert_eq!(err.messages, vec!["connection refused"]);

        let err = StructuredError::from_transport(&TransportError::new(""));
        assert_eq!(err.messages, vec![GENERIC_ERROR_MESSAGE]);
    }

    #[test]
    fn server_message_variants() {
        assert_eq!(
            ServerMessage::from_payload(&json!({"message": ["x"]})),
            ServerMessage::Many(vec!["x".to_string()])
        );
        assert_eq!(
            ServerMessage::from_payload(&json!({"message": "x"})),
            ServerMessage::One("x".to_string())
        );
        assert_eq!(ServerMessage::from_payload(&json!({})), ServerMessage::Missing);
        assert_eq!(ServerMessage::from_payload(&json!("text")), ServerMessage::Missing);
    }

    #[test]
    fn api_error_display_joins_messages() {
        let err = ApiError::from(StructuredError {
            status: 400,
            data: serde_json::Value::Null,
            messages: vec!["A".to_string(), "B".to_string()],
        });
        assert_eq!(err.to_string(), "HTTP 400: A; B");
        assert_eq!(err.status(), Some(400));
    }
}
