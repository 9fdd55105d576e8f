//! Resilient authenticated request layer
//!
//! Sends JSON requests to an HTTP API with a bearer token, enforces a
//! per-request deadline, normalizes every failure into an `AppError`, and on
//! an expired token performs a single-flight refresh followed by exactly one
//! retry.
//!
//! Layering:
//! - `RequestExecutor` sends one attempt and normalizes its outcome
//! - `RefreshCoordinator` makes sure concurrent 401s share one refresh call
//! - `Client` ties both together and owns login/logout
//!
//! ```no_run
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! use std::sync::Arc;
//! use api_client::{Client, ClientConfig};
//! use session::{MemoryStore, TokenStore};
//!
//! let tokens = TokenStore::new(Arc::new(MemoryStore::new()));
//! let client = Client::new(ClientConfig::new("http://localhost:8080"), tokens)?;
//! client.login("ada@example.com", "correct-horse").await?;
//! let _apps: serde_json::Value = client.get("/api/v1/applications").await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod executor;
pub mod metrics;
pub mod normalize;
pub mod refresh;

#[cfg(test)]
mod testutil;

pub use client::{Client, REQUEST_ID_HEADER};
pub use config::{ClientConfig, ProxyRoute};
pub use descriptor::RequestDescriptor;
pub use error::{AppError, ErrorKind, REAUTH_REQUIRED_STATUS, Result, TRANSPORT_STATUS};
pub use executor::RequestExecutor;
pub use refresh::{HttpRefresher, RefreshCoordinator, RefreshFailure, RefreshFuture, RefreshOutcome, TokenRefresher};
