//! Uniform error value for every failure path of the client
//!
//! Callers branch on `status()` (or the derived `kind()`), render `message()`
//! directly and log `details()` / `source()` for diagnostics.

use serde_json::{Value, json};

/// Status of failures where no HTTP response was ever received.
pub const TRANSPORT_STATUS: u16 = 0;

/// Sentinel status for "the session cannot be recovered, log in again".
pub const REAUTH_REQUIRED_STATUS: u16 = 440;

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The single error type surfaced by the client. Immutable once built.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct AppError {
    status: u16,
    message: String,
    details: Option<Value>,
    #[source]
    cause: Option<BoxError>,
}

/// Failure classes, derived from `status` and the `details.kind` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No response obtained (connection refused, TLS, reset)
    Network,
    /// The per-request deadline fired first
    Timeout,
    /// 401/403 from the server
    Authorization,
    /// Retry after refresh still unauthorized, or the refresh itself failed
    ReauthRequired,
    /// Any other non-2xx status
    Http,
    /// A success body that could not be decoded
    InvalidBody,
}

impl ErrorKind {
    /// Tag stored under `details.kind`.
    pub fn label(&self) -> &'static str {
        match self {
            ErrorKind::Network => "network",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Authorization => "authorization",
            ErrorKind::ReauthRequired => "reauth_required",
            ErrorKind::Http => "http",
            ErrorKind::InvalidBody => "invalid_body",
        }
    }
}

impl AppError {
    /// A server-rejected response. `details` is the full parsed body.
    pub fn http(status: u16, message: impl Into<String>, details: Value) -> Self {
        Self {
            status,
            message: message.into(),
            details: Some(details),
            cause: None,
        }
    }

    pub fn network(message: impl Into<String>, details: Value, cause: reqwest::Error) -> Self {
        let cause = Box::new(cause) as BoxError;
        Self::tagged(TRANSPORT_STATUS, ErrorKind::Network, message, details, Some(cause))
    }

    pub fn timeout(message: impl Into<String>, details: Value, cause: reqwest::Error) -> Self {
        let cause = Box::new(cause) as BoxError;
        Self::tagged(TRANSPORT_STATUS, ErrorKind::Timeout, message, details, Some(cause))
    }

    pub fn invalid_body(
        message: impl Into<String>,
        details: Value,
        cause: Option<BoxError>,
    ) -> Self {
        Self::tagged(TRANSPORT_STATUS, ErrorKind::InvalidBody, message, details, cause)
    }

    /// A success body that does not match the expected shape.
    pub fn decode(context: &str, err: serde_json::Error) -> Self {
        let message = format!("{context}: {err}");
        Self::invalid_body(message, Value::Null, Some(Box::new(err) as BoxError))
    }

    pub fn reauth_required(
        message: impl Into<String>,
        details: Value,
        cause: Option<AppError>,
    ) -> Self {
        Self::tagged(
            REAUTH_REQUIRED_STATUS,
            ErrorKind::ReauthRequired,
            message,
            details,
            cause.map(|e| Box::new(e) as BoxError),
        )
    }

    /// Build an error whose `details` object carries a `kind` tag.
    fn tagged(
        status: u16,
        kind: ErrorKind,
        message: impl Into<String>,
        details: Value,
        cause: Option<BoxError>,
    ) -> Self {
        let details = match details {
            Value::Object(mut map) => {
                map.insert("kind".into(), Value::from(kind.label()));
                Value::Object(map)
            }
            Value::Null => json!({ "kind": kind.label() }),
            other => json!({ "kind": kind.label(), "body": other }),
        };
        Self {
            status,
            message: message.into(),
            details: Some(details),
            cause,
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> Option<&Value> {
        self.details.as_ref()
    }

    pub fn kind(&self) -> ErrorKind {
        let tag = self
            .details
            .as_ref()
            .and_then(|d| d.get("kind"))
            .and_then(Value::as_str);
        match self.status {
            TRANSPORT_STATUS => match tag {
                Some("timeout") => ErrorKind::Timeout,
                Some("invalid_body") => ErrorKind::InvalidBody,
                _ => ErrorKind::Network,
            },
            REAUTH_REQUIRED_STATUS if tag == Some("reauth_required") => ErrorKind::ReauthRequired,
            401 | 403 => ErrorKind::Authorization,
            _ => ErrorKind::Http,
        }
    }

    /// True for the 401 that triggers a token refresh.
    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }
}

/// Result alias for client operations.
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn http_error_keeps_body_verbatim() {
        let body = json!({"error": "bad input", "field": "email"});
        let err = AppError::http(422, "bad input", body.clone());
        assert_eq!(err.status(), 422);
        assert_eq!(err.message(), "bad input");
        assert_eq!(err.details(), Some(&body));
        assert_eq!(err.kind(), ErrorKind::Http);
        assert_eq!(err.to_string(), "bad input");
        assert!(err.source().is_none());
    }

    #[test]
    fn auth_statuses_classify_as_authorization() {
        for status in [401, 403] {
            let err = AppError::http(status, "nope", json!({}));
            assert_eq!(err.kind(), ErrorKind::Authorization);
        }
        assert!(AppError::http(401, "x", json!({})).is_unauthorized());
        assert!(!AppError::http(403, "x", json!({})).is_unauthorized());
    }

    #[test]
    fn reauth_required_wraps_cause() {
        let inner = AppError::http(401, "token expired", json!({"error": "token expired"}));
        let err = AppError::reauth_required(
            "Session expired, please log in again",
            json!({"reason": "still_unauthorized"}),
            Some(inner),
        );
        assert_eq!(err.status(), REAUTH_REQUIRED_STATUS);
        assert_eq!(err.kind(), ErrorKind::ReauthRequired);
        assert_eq!(err.details().unwrap()["kind"], "reauth_required");
        assert_eq!(err.details().unwrap()["reason"], "still_unauthorized");
        assert_eq!(err.source().unwrap().to_string(), "token expired");
    }

    #[test]
    fn server_status_440_without_tag_is_plain_http() {
        let err = AppError::http(REAUTH_REQUIRED_STATUS, "login timeout", json!({"kind": "x"}));
        assert_eq!(err.kind(), ErrorKind::Http);
    }

    #[test]
    fn invalid_body_is_tagged() {
        let err = AppError::invalid_body("Invalid JSON: <html>", Value::Null, None);
        assert_eq!(err.status(), TRANSPORT_STATUS);
        assert_eq!(err.kind(), ErrorKind::InvalidBody);
        assert_eq!(err.details(), Some(&json!({"kind": "invalid_body"})));
    }

    #[test]
    fn decode_errors_keep_serde_cause() {
        let serde_err = serde_json::from_str::<u32>("\"x\"").unwrap_err();
        let err = AppError::decode("invalid login response", serde_err);
        assert_eq!(err.kind(), ErrorKind::InvalidBody);
        assert!(err.message().starts_with("invalid login response: "));
        assert!(err.source().is_some());
    }

    #[test]
    fn non_object_details_are_nested_under_body() {
        let err = AppError::invalid_body("bad", json!("raw text"), None);
        assert_eq!(err.details(), Some(&json!({"kind": "invalid_body", "body": "raw text"})));
    }
}
