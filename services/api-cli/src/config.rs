//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! A missing config file is not an error; every field has a default so the
//! CLI works against a local API out of the box.

use api_client::ClientConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Root configuration
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ClientConfig,
    pub session: SessionConfig,
}

/// Where the session survives between invocations
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub file: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            file: PathBuf::from("session.json"),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Environment overrides:
    /// - `API_BASE_URL` (or `API_BASE`) and `API_TIMEOUT_MS` for `[api]`
    /// - `SESSION_FILE` for `[session] file`
    pub fn load(path: &Path) -> common::Result<Self> {
        let mut config: Config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str(&contents)?
        } else {
            debug!(path = %path.display(), "config file not found, using defaults");
            Config::default()
        };

        config.api.apply_env()?;
        if let Ok(file) = std::env::var("SESSION_FILE") {
            let file = file.trim();
            if !file.is_empty() {
                config.session.file = PathBuf::from(file);
            }
        }

        config.api.validate()?;
        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&Path>) -> PathBuf {
        if let Some(p) = cli_path {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("api-cli.toml")
    }
}
