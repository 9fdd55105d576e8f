//! Client configuration and URL resolution
//!
//! Precedence: env vars > config file > defaults. Only the base URL and the
//! default timeout are overridable from the environment; everything else
//! comes from the `[api]` table of the embedding application's config.

use std::time::Duration;

use serde::Deserialize;
use session::{DEFAULT_LOGIN_PATH, DEFAULT_REFRESH_PATH};

/// Settings shared by every request the client sends.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    /// Default per-request deadline in milliseconds
    pub timeout_ms: u64,
    pub login_path: String,
    pub refresh_path: String,
    pub proxy: Option<ProxyRoute>,
    /// Fail on unparsable success bodies instead of returning the raw text
    pub strict_json: bool,
    /// Resolve `{"data": X}` success bodies to `X`
    pub unwrap_data: bool,
}

/// Same-origin rewrite: paths under `prefix` go to `origin` instead of
/// `base_url`, which forwards them to the API.
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyRoute {
    #[serde(default = "default_proxy_prefix")]
    pub prefix: String,
    pub origin: String,
}

fn default_proxy_prefix() -> String {
    "/api".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            timeout_ms: 10_000,
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            refresh_path: DEFAULT_REFRESH_PATH.to_string(),
            proxy: None,
            strict_json: false,
            unwrap_data: false,
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Overlay `API_BASE_URL` (or legacy `API_BASE`) and `API_TIMEOUT_MS`.
    pub fn apply_env(&mut self) -> common::Result<()> {
        if let Ok(url) = std::env::var("API_BASE_URL").or_else(|_| std::env::var("API_BASE")) {
            let url = url.trim();
            if !url.is_empty() {
                self.base_url = url.to_string();
            }
        }
        if let Ok(raw) = std::env::var("API_TIMEOUT_MS") {
            self.timeout_ms = raw.trim().parse().map_err(|e| {
                common::Error::Config(format!("API_TIMEOUT_MS must be an integer, got {raw:?}: {e}"))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> common::Result<()> {
        if !is_http_url(&self.base_url) {
            return Err(common::Error::Config(format!(
                "base_url must start with http:// or https://, got: {:?} \
                 (set API_BASE_URL, e.g. API_BASE_URL=http://127.0.0.1:8080)",
                self.base_url
            )));
        }

        if self.timeout_ms == 0 {
            return Err(common::Error::Config(
                "timeout_ms must be greater than 0".into(),
            ));
        }

        if let Some(proxy) = &self.proxy {
            if !is_http_url(&proxy.origin) {
                return Err(common::Error::Config(format!(
                    "proxy.origin must start with http:// or https://, got: {:?}",
                    proxy.origin
                )));
            }
            if !proxy.prefix.starts_with('/') {
                return Err(common::Error::Config(format!(
                    "proxy.prefix must start with '/', got: {:?}",
                    proxy.prefix
                )));
            }
        }

        Ok(())
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Resolve a descriptor path to the URL actually requested.
    ///
    /// - absolute `http(s)://` URLs are used as-is
    /// - paths under the proxy prefix go to the proxy origin
    /// - everything else is joined onto `base_url`
    pub fn resolve_url(&self, path: &str) -> String {
        if is_http_url(path) {
            return path.to_string();
        }
        match &self.proxy {
            Some(proxy) if has_prefix(path, &proxy.prefix) => join(&proxy.origin, path),
            _ => join(&self.base_url, path),
        }
    }
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// `/api` matches `/api` and `/api/...`, never `/apiary`.
fn has_prefix(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || rest.starts_with('?'),
        None => false,
    }
}

fn join(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
