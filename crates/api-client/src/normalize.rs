//! Response body parsing and error message extraction
//!
//! Error bodies arrive in several shapes depending on which server layer
//! rejected the request. The human message is taken from the first extractor
//! in `MESSAGE_EXTRACTORS` that yields a non-blank string:
//!
//! 1. `{"error": "..."}`
//! 2. `{"message": "..."}`
//! 3. `[{"message": ...}, ...]`, a non-string message is rendered as JSON
//! 4. a bare string body (non-JSON text)
//!
//! Messages are returned verbatim; only empty strings are skipped.
//!
//! With none of those, the message falls back to `HTTP <status> <reason>`.

use std::borrow::Cow;

use reqwest::StatusCode;
use serde_json::Value;

use crate::error::AppError;

type Extractor = fn(&Value) -> Option<Cow<'_, str>>;

const MESSAGE_EXTRACTORS: &[Extractor] = &[
    error_field,
    message_field,
    first_error_message,
    raw_text,
];

fn error_field(body: &Value) -> Option<Cow<'_, str>> {
    body.get("error")?.as_str().map(Cow::Borrowed)
}

fn message_field(body: &Value) -> Option<Cow<'_, str>> {
    body.as_object()?.get("message")?.as_str().map(Cow::Borrowed)
}

fn first_error_message(body: &Value) -> Option<Cow<'_, str>> {
    match body.as_array()?.first()?.as_object()?.get("message")? {
        Value::String(message) => Some(Cow::Borrowed(message.as_str())),
        other => Some(Cow::Owned(other.to_string())),
    }
}

fn raw_text(body: &Value) -> Option<Cow<'_, str>> {
    body.as_str().map(Cow::Borrowed)
}

/// Parse a body read as text. Invalid JSON degrades to the raw text; an
/// empty body is `Null`.
pub fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

/// First non-empty message from the body, in precedence order.
pub fn extract_message(body: &Value) -> Option<String> {
    MESSAGE_EXTRACTORS
        .iter()
        .filter_map(|extract| extract(body))
        .find(|msg| !msg.is_empty())
        .map(Cow::into_owned)
}

/// Turn a non-2xx response into an `AppError` carrying the whole body.
pub fn normalize(status: StatusCode, body: Value) -> AppError {
    let message = extract_message(&body).unwrap_or_else(|| fallback_message(status));
    AppError::http(status.as_u16(), message, body)
}

fn fallback_message(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("HTTP {} {reason}", status.as_u16()),
        None => format!("HTTP {}", status.as_u16()),
    }
}
