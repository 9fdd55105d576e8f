//! api-cli
//!
//! Command-line front end for the authenticated API client:
//! 1. Loads configuration (file, env, defaults)
//! 2. Keeps the session in a JSON file between invocations
//! 3. Sends requests with automatic token refresh and a single retry
//! 4. Prints the response body as pretty JSON on stdout

mod config;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use api_client::{AppError, Client, RequestDescriptor};
use clap::{Parser, Subcommand};
use reqwest::Method;
use serde_json::{Value, json};
use session::{FileStore, TokenStore};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

#[derive(Debug, Parser)]
#[command(name = "api-cli")]
#[command(about = "Call the API with a persisted, self-refreshing session", long_about = None)]
struct Cli {
    /// Config file (falls back to CONFIG_PATH, then ./api-cli.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Log in and store the session
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "API_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Forget the stored session
    Logout,
    /// Show the stored user profile
    Whoami,
    /// Send an authenticated request
    Request {
        /// HTTP method, e.g. GET or POST
        method: String,
        /// Path relative to the base URL, or an absolute URL
        path: String,
        /// JSON request body
        #[arg(long)]
        body: Option<String>,
        /// Per-request deadline overriding the configured default
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr so stdout stays pure JSON
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}", render_error(&err));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = Config::resolve_path(cli.config.as_deref());
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    info!(
        base_url = %config.api.base_url,
        timeout_ms = config.api.timeout_ms,
        session_file = %config.session.file.display(),
        "configuration loaded"
    );

    let store = FileStore::load(config.session.file.clone()).with_context(|| {
        format!(
            "failed to open session file {}",
            config.session.file.display()
        )
    })?;
    let tokens = TokenStore::new(Arc::new(store));
    let client = Client::new(config.api, tokens).context("invalid client configuration")?;

    let output = match cli.command {
        Command::Login { email, password } => {
            let record = client.login(&email, &password).await?;
            json!({ "logged_in": true, "user": record.user })
        }
        Command::Logout => {
            client.logout().context("failed to clear session")?;
            json!({ "logged_in": false })
        }
        Command::Whoami => match client.session() {
            Some(record) => json!({ "logged_in": true, "user": record.user }),
            None => json!({ "logged_in": false }),
        },
        Command::Request {
            method,
            path,
            body,
            timeout_ms,
        } => {
            let descriptor = build_descriptor(&method, path, body.as_deref(), timeout_ms)?;
            client.request(&descriptor).await?
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn build_descriptor(
    method: &str,
    path: String,
    body: Option<&str>,
    timeout_ms: Option<u64>,
) -> Result<RequestDescriptor> {
    let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .with_context(|| format!("invalid HTTP method: {method}"))?;
    let mut descriptor = RequestDescriptor::new(method, path);

    if let Some(raw) = body {
        let body: Value = serde_json::from_str(raw).context("--body must be valid JSON")?;
        descriptor = descriptor.body(body);
    }
    if let Some(ms) = timeout_ms {
        anyhow::ensure!(ms > 0, "--timeout-ms must be greater than 0");
        descriptor = descriptor.timeout(Duration::from_millis(ms));
    }
    Ok(descriptor)
}

fn render_error(err: &anyhow::Error) -> String {
    match err.downcast_ref::<AppError>() {
        Some(app) => format!(
            "error (status {}, kind {}): {}",
            app.status(),
            app.kind().label(),
            app.message()
        ),
        None => format!("error: {err:#}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use api_client::REAUTH_REQUIRED_STATUS;

    #[test]
    fn test_parse_request_command() {
        let cli = Cli::try_parse_from([
            "api-cli",
            "--config",
            "/etc/api-cli.toml",
            "request",
            "post",
            "/api/v1/applications",
            "--body",
            r#"{"program":"cs"}"#,
            "--timeout-ms",
            "500",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("/etc/api-cli.toml")));
        match cli.command {
            Command::Request {
                method,
                path,
                body,
                timeout_ms,
            } => {
                assert_eq!(method, "post");
                assert_eq!(path, "/api/v1/applications");
                assert_eq!(body.as_deref(), Some(r#"{"program":"cs"}"#));
                assert_eq!(timeout_ms, Some(500));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_login_with_password_flag() {
        let cli = Cli::try_parse_from([
            "api-cli",
            "login",
            "--email",
            "ada@example.com",
            "--password",
            "correct-horse",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Command::Login { ref email, ref password }
                if email == "ada@example.com" && password == "correct-horse"
        ));
    }

    #[test]
    fn test_login_requires_email() {
        assert!(Cli::try_parse_from(["api-cli", "login", "--password", "x"]).is_err());
    }

    #[test]
    fn test_build_descriptor() {
        let descriptor = build_descriptor(
            "put",
            "/api/v1/profile".into(),
            Some(r#"{"name":"Ada"}"#),
            Some(250),
        )
        .unwrap();
        assert_eq!(descriptor.method, Method::PUT);
        assert_eq!(descriptor.path, "/api/v1/profile");
        assert_eq!(descriptor.body, Some(json!({"name": "Ada"})));
        assert_eq!(descriptor.timeout, Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_build_descriptor_rejects_bad_input() {
        assert!(build_descriptor("GET", "/x".into(), Some("{nope"), None).is_err());
        assert!(build_descriptor("GET", "/x".into(), None, Some(0)).is_err());
        assert!(build_descriptor("NOT A METHOD", "/x".into(), None, None).is_err());
    }

    #[test]
    fn test_render_app_error() {
        let err = anyhow::Error::new(AppError::http(
            403,
            "admin role required",
            json!({"message": "admin role required"}),
        ));
        assert_eq!(
            render_error(&err),
            "error (status 403, kind authorization): admin role required"
        );

        let err = anyhow::Error::new(AppError::reauth_required(
            "Your session has expired. Please log in again.",
            Value::Null,
            None,
        ));
        assert_eq!(
            render_error(&err),
            format!(
                "error (status {REAUTH_REQUIRED_STATUS}, kind reauth_required): \
                 Your session has expired. Please log in again."
            )
        );
    }

    #[test]
    fn test_render_other_error() {
        let err = anyhow::anyhow!("boom").context("failed to load config from x.toml");
        assert_eq!(
            render_error(&err),
            "error: failed to load config from x.toml: boom"
        );
    }
}
