//! One request, fully described and reusable across the retry attempt

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::Method;
use reqwest::header::{AUTHORIZATION, HeaderValue};
use serde::Serialize;
use serde_json::Value;

/// Everything needed to send one attempt. The client sends the same
/// descriptor again after a token refresh; only the bearer header changes.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    /// Absolute URL, or a path resolved against the configured base URL
    pub path: String,
    pub method: Method,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Value>,
    /// Overrides the configured default timeout
    pub timeout: Option<Duration>,
}

impl RequestDescriptor {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method,
            headers: BTreeMap::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn json<T: Serialize + ?Sized>(self, body: &T) -> serde_json::Result<Self> {
        Ok(self.body(serde_json::to_value(body)?))
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Whether the caller supplied its own usable `Authorization` header.
    ///
    /// A value that cannot be sent as a header does not count; the stored
    /// bearer token is used instead.
    pub fn has_authorization(&self) -> bool {
        self.headers.iter().any(|(name, value)| {
            name.eq_ignore_ascii_case(AUTHORIZATION.as_str()) && HeaderValue::from_str(value).is_ok()
        })
    }
}
