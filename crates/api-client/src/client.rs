//! The public entry point: authenticated requests with one refresh-and-retry
//!
//! Request flow for a logical call:
//! 1. Attempt 1 with the stored token
//! 2. On 401, join (or lead) the single-flight refresh
//! 3. Refresh failed: `ReauthRequired`, no second attempt
//! 4. Refresh succeeded: attempt 2 with the new token; a second 401 is
//!    `ReauthRequired`, anything else is returned as-is
//!
//! Every other failure (timeouts, 403, 5xx, invalid bodies) is returned from
//! attempt 1 untouched.

use std::sync::Arc;

use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use session::{LoginRequest, TokenRecord, TokenStore};
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::descriptor::RequestDescriptor;
use crate::error::{AppError, Result};
use crate::executor::RequestExecutor;
use crate::metrics;
use crate::refresh::{HttpRefresher, RefreshCoordinator, RefreshOutcome, token_record};

/// Header carrying the per-call correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

const REAUTH_MESSAGE: &str = "Your session has expired. Please log in again.";

/// Authenticated API client. Cheap to clone; clones share the token store
/// and the refresh coordinator.
#[derive(Clone)]
pub struct Client {
    executor: Arc<RequestExecutor>,
    coordinator: Arc<RefreshCoordinator>,
    tokens: TokenStore,
}

impl Client {
    /// Wire an executor, an HTTP refresher and a coordinator over `tokens`.
    pub fn new(config: ClientConfig, tokens: TokenStore) -> common::Result<Self> {
        let executor = Arc::new(RequestExecutor::new(config, tokens.clone())?);
        let refresher = Arc::new(HttpRefresher::new(executor.clone()));
        let coordinator = Arc::new(RefreshCoordinator::new(refresher, tokens));
        Ok(Self::from_parts(executor, coordinator))
    }

    /// Assemble from pre-built parts, e.g. with a custom `TokenRefresher`.
    pub fn from_parts(executor: Arc<RequestExecutor>, coordinator: Arc<RefreshCoordinator>) -> Self {
        let tokens = executor.tokens().clone();
        Self {
            executor,
            coordinator,
            tokens,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        self.executor.config()
    }

    /// Current session, if logged in.
    pub fn session(&self) -> Option<TokenRecord> {
        self.tokens.get()
    }

    /// Exchange credentials for a session and store it.
    ///
    /// Sent without a bearer header; a rejected login is returned as the
    /// normalized error and never triggers a refresh.
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenRecord> {
        let descriptor = RequestDescriptor::post(self.config().login_path.clone())
            .json(&LoginRequest { email, password })
            .map_err(|e| AppError::decode("invalid login request", e))?;

        let body = self
            .executor
            .execute_with(&descriptor, None)
            .instrument(info_span!("api_login"))
            .await?;
        let record = token_record(body, "invalid login response")?;

        if let Err(e) = self.tokens.set(&record) {
            warn!(error = %e, "failed to persist session after login");
        }
        info!("logged in");
        Ok(record)
    }

    pub fn logout(&self) -> session::Result<()> {
        self.tokens.clear()?;
        info!("logged out");
        Ok(())
    }

    /// Run one logical call: at most two attempts, at most one refresh.
    pub async fn request(&self, descriptor: &RequestDescriptor) -> Result<Value> {
        let mut descriptor = descriptor.clone();
        let request_id = match descriptor
            .headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(REQUEST_ID_HEADER))
        {
            Some((_, id)) => id.clone(),
            None => {
                let id = Uuid::new_v4().to_string();
                descriptor
                    .headers
                    .insert(REQUEST_ID_HEADER.to_string(), id.clone());
                id
            }
        };

        let span = info_span!(
            "api_request",
            %request_id,
            method = %descriptor.method,
            path = %descriptor.path,
        );
        self.run(&descriptor).instrument(span).await
    }

    async fn run(&self, descriptor: &RequestDescriptor) -> Result<Value> {
        let used = self.tokens.token();
        debug!(attempt = 1, "sending attempt");
        let first = match self.executor.execute_with(descriptor, used.as_ref()).await {
            // A caller-supplied Authorization header is never ours to refresh
            Err(err) if err.is_unauthorized() && !descriptor.has_authorization() => err,
            other => return other,
        };

        debug!("attempt 1 unauthorized, refreshing token");
        if let RefreshOutcome::Failed(failure) = self.coordinator.refresh_or_join(used.as_ref()).await
        {
            metrics::record_reauth_required();
            return Err(AppError::reauth_required(
                REAUTH_MESSAGE,
                json!({
                    "reason": "refresh_failed",
                    "refresh_status": failure.status,
                    "refresh_message": failure.message,
                }),
                Some(first),
            ));
        }

        let token = self.tokens.token();
        debug!(attempt = 2, "retrying with refreshed token");
        match self.executor.execute_with(descriptor, token.as_ref()).await {
            Err(err) if err.is_unauthorized() => {
                warn!("still unauthorized after token refresh");
                metrics::record_reauth_required();
                Err(AppError::reauth_required(
                    REAUTH_MESSAGE,
                    json!({ "reason": "still_unauthorized" }),
                    Some(err),
                ))
            }
            other => other,
        }
    }

    /// `request`, then decode the success body into `T`.
    pub async fn request_json<T: DeserializeOwned>(&self, descriptor: &RequestDescriptor) -> Result<T> {
        let body = self.request(descriptor).await?;
        serde_json::from_value(body).map_err(|e| AppError::decode("unexpected response shape", e))
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.request_json(&RequestDescriptor::get(path)).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<T> {
        self.request_json(&with_body(Method::POST, path, body)?).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<T> {
        self.request_json(&with_body(Method::PUT, path, body)?).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.request_json(&RequestDescriptor::delete(path)).await
    }
}

fn with_body<B: Serialize + ?Sized>(method: Method, path: &str, body: &B) -> Result<RequestDescriptor> {
    RequestDescriptor::new(method, path)
        .json(body)
        .map_err(|e| AppError::decode("invalid request body", e))
}
