//! Single-attempt request execution
//!
//! Builds one HTTP request from a `RequestDescriptor`, attaches the bearer
//! token, enforces the deadline and turns every outcome into either the
//! parsed success body or an `AppError`. No retries happen here; the client
//! decides whether a second attempt is warranted.

use std::str::FromStr;
use std::time::{Duration, Instant};

use common::Secret;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{StatusCode, Url};
use serde_json::{Value, json};
use session::TokenStore;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::descriptor::RequestDescriptor;
use crate::error::{AppError, BoxError, Result};
use crate::metrics;
use crate::normalize::{normalize, parse_body};

/// Leading characters of an unparsable body quoted in the error message.
const INVALID_BODY_PREVIEW: usize = 200;

/// Sends single attempts. Reads the token store, never writes it.
pub struct RequestExecutor {
    http: reqwest::Client,
    config: ClientConfig,
    tokens: TokenStore,
}

impl RequestExecutor {
    /// Validate `config` and build an executor with a fresh HTTP client.
    pub fn new(config: ClientConfig, tokens: TokenStore) -> common::Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| common::Error::HttpClient(e.to_string()))?;
        Self::with_http_client(http, config, tokens)
    }

    /// Like `new`, but shares an existing connection pool.
    pub fn with_http_client(
        http: reqwest::Client,
        config: ClientConfig,
        tokens: TokenStore,
    ) -> common::Result<Self> {
        config.validate()?;
        Ok(Self {
            http,
            config,
            tokens,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    /// Send one attempt with whatever token is currently stored.
    pub async fn execute(&self, descriptor: &RequestDescriptor) -> Result<Value> {
        let token = self.tokens.token();
        self.execute_with(descriptor, token.as_ref()).await
    }

    /// Send one attempt with an explicit bearer token (or none).
    ///
    /// A caller-supplied `Authorization` header always wins over `token`.
    pub async fn execute_with(
        &self,
        descriptor: &RequestDescriptor,
        token: Option<&Secret<String>>,
    ) -> Result<Value> {
        let url = self.config.resolve_url(&descriptor.path);
        let timeout = descriptor
            .timeout
            .unwrap_or_else(|| self.config.default_timeout());
        let method = descriptor.method.clone();

        let mut request = self
            .http
            .request(method.clone(), &url)
            .headers(build_headers(descriptor, token))
            .timeout(timeout);
        if let Some(body) = &descriptor.body {
            request = request.body(body.to_string());
        }

        debug!(%method, %url, timeout_ms = timeout.as_millis() as u64, "sending request");
        let started = Instant::now();

        // The deadline covers the body read too, so both steps share one error path
        let outcome = async {
            let response = request.send().await?;
            let status = response.status();
            let text = response.text().await?;
            Ok::<_, reqwest::Error>((status, text))
        }
        .await;
        let elapsed = started.elapsed().as_secs_f64();

        let (status, text) = match outcome {
            Ok(received) => received,
            Err(e) => {
                metrics::record_attempt(method.as_str(), 0, elapsed);
                return Err(transport_error(e, descriptor, &url, timeout));
            }
        };
        metrics::record_attempt(method.as_str(), status.as_u16(), elapsed);

        if !status.is_success() {
            let err = normalize(status, parse_body(&text));
            debug!(status = status.as_u16(), error = %err, "request rejected");
            return Err(err);
        }

        debug!(status = status.as_u16(), bytes = text.len(), "request succeeded");
        self.decode_success(status, &url, &text)
    }

    fn decode_success(&self, status: StatusCode, url: &str, text: &str) -> Result<Value> {
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }

        let body = match serde_json::from_str::<Value>(text) {
            Ok(body) => body,
            Err(e) if self.config.strict_json => {
                let preview: String = text.chars().take(INVALID_BODY_PREVIEW).collect();
                return Err(AppError::invalid_body(
                    format!("Invalid JSON: {preview}"),
                    json!({ "url": url, "status": status.as_u16() }),
                    Some(Box::new(e) as BoxError),
                ));
            }
            Err(_) => Value::String(text.to_string()),
        };

        if self.config.unwrap_data {
            if let Some(data) = body.get("data").filter(|data| !data.is_null()) {
                return Ok(data.clone());
            }
        }
        Ok(body)
    }
}

/// `Content-Type: application/json`, the bearer token unless the caller set
/// its own, then the caller's headers on top.
fn build_headers(descriptor: &RequestDescriptor, token: Option<&Secret<String>>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    if let Some(token) = token.filter(|_| !descriptor.has_authorization()) {
        match HeaderValue::from_str(&format!("Bearer {}", token.expose())) {
            Ok(mut value) => {
                value.set_sensitive(true);
                headers.insert(AUTHORIZATION, value);
            }
            Err(_) => warn!("stored token is not a valid header value, sending unauthenticated"),
        }
    }

    for (name, value) in &descriptor.headers {
        let name = match HeaderName::from_str(name) {
            Ok(n) => n,
            Err(e) => {
                warn!(header = %name, error = %e, "skipping invalid header name");
                continue;
            }
        };
        let value = match HeaderValue::from_str(value) {
            Ok(v) => v,
            Err(e) => {
                warn!(header = name.as_str(), error = %e, "skipping invalid header value");
                continue;
            }
        };
        headers.insert(name, value);
    }

    headers
}

/// Map a failure with no usable response to Timeout or Network.
///
/// Connection failures get their own message: they mean the API is down or
/// unreachable, whereas other transport errors (TLS, protocol, reset) point
/// at the request or the network path.
fn transport_error(
    err: reqwest::Error,
    descriptor: &RequestDescriptor,
    url: &str,
    timeout: Duration,
) -> AppError {
    let timeout_ms = timeout.as_millis() as u64;
    let origin = origin_of(url);

    if err.is_timeout() {
        warn!(%url, timeout_ms, "request timed out");
        return AppError::timeout(
            format!(
                "Request timed out after {timeout_ms} ms. Check that the API at {origin} is running and reachable."
            ),
            json!({
                "url": url,
                "method": descriptor.method.as_str(),
                "timeout_ms": timeout_ms,
            }),
            err,
        );
    }

    let connect = err.is_connect();
    warn!(%url, connect, error = %err, "request failed without a response");
    let message = if connect {
        format!("Cannot connect to API at {origin}. Please ensure the server is running.")
    } else {
        format!("Request to {url} failed: {err}")
    };
    AppError::network(
        message,
        json!({
            "url": url,
            "method": descriptor.method.as_str(),
            "connect": connect,
            "error": err.to_string(),
        }),
        err,
    )
}

fn origin_of(url: &str) -> String {
    Url::parse(url)
        .map(|u| u.origin().ascii_serialization())
        .unwrap_or_else(|_| url.to_string())
}
