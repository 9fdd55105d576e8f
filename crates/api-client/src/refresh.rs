//! Single-flight bearer token refresh
//!
//! When many requests hit a 401 at once, exactly one of them (the leader)
//! calls the refresh endpoint; the rest join a FIFO queue of waiters and are
//! released with the leader's outcome once the refresh settles.
//!
//! State machine:
//! - Idle → Refreshing: first caller while idle becomes the leader
//! - Refreshing → Refreshing: later callers are queued, no second network call
//! - Refreshing → Idle: the leader stores the new token (on success), empties
//!   the queue and sends every waiter the outcome in arrival order
//!
//! The state mutex is only held for the check-and-set and the queue drain,
//! never across an `.await`, so two callers can never both observe Idle.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};

use common::Secret;
use serde_json::Value;
use session::{TokenRecord, TokenResponse, TokenStore};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::descriptor::RequestDescriptor;
use crate::error::{AppError, ErrorKind, Result};
use crate::executor::RequestExecutor;
use crate::metrics;

/// Boxed refresh future, keeps `TokenRefresher` dyn-compatible.
pub type RefreshFuture<'a> = Pin<Box<dyn Future<Output = Result<TokenRecord>> + Send + 'a>>;

/// Exchanges the current token for a new one.
pub trait TokenRefresher: Send + Sync {
    fn refresh<'a>(&'a self, token: &'a Secret<String>) -> RefreshFuture<'a>;
}

/// Calls the bearer-authenticated refresh endpoint through the executor, so
/// the refresh gets the same timeout and error normalization as any request.
pub struct HttpRefresher {
    executor: Arc<RequestExecutor>,
}

impl HttpRefresher {
    pub fn new(executor: Arc<RequestExecutor>) -> Self {
        Self { executor }
    }
}

impl TokenRefresher for HttpRefresher {
    fn refresh<'a>(&'a self, token: &'a Secret<String>) -> RefreshFuture<'a> {
        Box::pin(async move {
            let descriptor = RequestDescriptor::post(self.executor.config().refresh_path.clone());
            let body = self.executor.execute_with(&descriptor, Some(token)).await?;
            token_record(body, "invalid refresh response")
        })
    }
}

/// Decode a login or refresh response. A blank token is never a session.
pub(crate) fn token_record(body: Value, context: &str) -> Result<TokenRecord> {
    let response: TokenResponse =
        serde_json::from_value(body).map_err(|e| AppError::decode(context, e))?;
    if response.token.trim().is_empty() {
        return Err(AppError::invalid_body(
            format!("{context}: empty token"),
            Value::Null,
            None,
        ));
    }
    Ok(response.into())
}

/// What every participant of a refresh cycle learns when it settles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A newer token is in the store; retry with it
    Refreshed,
    /// The session could not be refreshed; do not retry
    Failed(RefreshFailure),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshFailure {
    /// Status of the refresh response, `0` when none was received
    pub status: u16,
    pub message: String,
}

impl RefreshFailure {
    fn no_session() -> Self {
        Self {
            status: 0,
            message: "no stored session to refresh".into(),
        }
    }

    fn abandoned() -> Self {
        Self {
            status: 0,
            message: "token refresh was cancelled before it completed".into(),
        }
    }

    fn session_changed() -> Self {
        Self {
            status: 0,
            message: "session was cleared while the token was being refreshed".into(),
        }
    }

    fn blank_token() -> Self {
        Self {
            status: 0,
            message: "refresh returned an empty token".into(),
        }
    }

    fn from_error(err: &AppError) -> Self {
        Self {
            status: err.status(),
            message: err.message().to_string(),
        }
    }
}

enum RefreshState {
    Idle,
    Refreshing {
        waiters: VecDeque<oneshot::Sender<RefreshOutcome>>,
    },
}

/// Owns the refresh state; one instance per token store.
pub struct RefreshCoordinator {
    state: Mutex<RefreshState>,
    refresher: Arc<dyn TokenRefresher>,
    tokens: TokenStore,
}

impl RefreshCoordinator {
    pub fn new(refresher: Arc<dyn TokenRefresher>, tokens: TokenStore) -> Self {
        Self {
            state: Mutex::new(RefreshState::Idle),
            refresher,
            tokens,
        }
    }

    pub fn is_refreshing(&self) -> bool {
        matches!(*self.lock_state(), RefreshState::Refreshing { .. })
    }

    /// Callers currently queued behind the leader.
    pub fn waiter_count(&self) -> usize {
        match &*self.lock_state() {
            RefreshState::Refreshing { waiters } => waiters.len(),
            RefreshState::Idle => 0,
        }
    }

    /// Start a refresh, or wait for the one already in flight.
    ///
    /// `used` is the token the failed attempt was sent with. If the store
    /// already holds a different token, a refresh settled after that attempt
    /// went out, so this returns `Refreshed` without touching the network.
    pub async fn refresh_or_join(&self, used: Option<&Secret<String>>) -> RefreshOutcome {
        let waiter = {
            let mut state = self.lock_state();

            if self.token_rotated(used) {
                debug!("token already rotated since the failed attempt");
                return RefreshOutcome::Refreshed;
            }

            match &mut *state {
                RefreshState::Refreshing { waiters } => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push_back(tx);
                    debug!(position = waiters.len(), "joining in-flight token refresh");
                    Some(rx)
                }
                RefreshState::Idle => {
                    *state = RefreshState::Refreshing {
                        waiters: VecDeque::new(),
                    };
                    None
                }
            }
        };

        match waiter {
            Some(rx) => rx
                .await
                .unwrap_or_else(|_| RefreshOutcome::Failed(RefreshFailure::abandoned())),
            None => self.lead().await,
        }
    }

    async fn lead(&self) -> RefreshOutcome {
        let mut cycle = Cycle {
            coordinator: self,
            settled: false,
        };
        let outcome = self.run_refresh().await;
        cycle.settle(&outcome);
        outcome
    }

    async fn run_refresh(&self) -> RefreshOutcome {
        let Some(current) = self.tokens.get() else {
            warn!("token refresh requested without a stored session");
            return RefreshOutcome::Failed(RefreshFailure::no_session());
        };

        info!("refreshing bearer token");
        let result = self.refresher.refresh(&current.token).await;

        // Logout or login may have replaced the session during the call
        match self.tokens.token() {
            None => {
                warn!("session cleared during token refresh, discarding result");
                return RefreshOutcome::Failed(RefreshFailure::session_changed());
            }
            Some(stored) if !stored.same_as(&current.token) => {
                info!("session replaced during token refresh, keeping the newer one");
                return RefreshOutcome::Refreshed;
            }
            Some(_) => {}
        }

        match result {
            Ok(record) if record.token.expose().trim().is_empty() => {
                warn!("refresh returned an empty token, session kept");
                RefreshOutcome::Failed(RefreshFailure::blank_token())
            }
            Ok(mut record) => {
                if record.user.is_none() {
                    record.user = current.user;
                }
                if let Err(e) = self.tokens.set(&record) {
                    warn!(error = %e, "failed to persist refreshed token");
                }
                info!("token refresh succeeded");
                RefreshOutcome::Refreshed
            }
            Err(err) if err.kind() == ErrorKind::Authorization => {
                warn!(status = err.status(), error = %err, "refresh rejected, clearing session");
                if let Err(e) = self.tokens.clear() {
                    warn!(error = %e, "failed to clear rejected session");
                }
                RefreshOutcome::Failed(RefreshFailure::from_error(&err))
            }
            Err(err) => {
                warn!(status = err.status(), error = %err, "token refresh failed, session kept");
                RefreshOutcome::Failed(RefreshFailure::from_error(&err))
            }
        }
    }

    /// Return to Idle and release every queued waiter in arrival order.
    fn settle(&self, outcome: &RefreshOutcome) {
        let waiters = match std::mem::replace(&mut *self.lock_state(), RefreshState::Idle) {
            RefreshState::Refreshing { waiters } => waiters,
            RefreshState::Idle => VecDeque::new(),
        };
        metrics::record_refresh(*outcome == RefreshOutcome::Refreshed);
        debug!(waiters = waiters.len(), "releasing refresh waiters");
        for waiter in waiters {
            // A dropped waiter simply stopped caring
            let _ = waiter.send(outcome.clone());
        }
    }

    fn token_rotated(&self, used: Option<&Secret<String>>) -> bool {
        match (self.tokens.token(), used) {
            (Some(current), Some(used)) => !current.same_as(used),
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, RefreshState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Settles the cycle even if the leader's future is dropped mid-refresh, so
/// waiters are never stranded and the coordinator always returns to Idle.
struct Cycle<'a> {
    coordinator: &'a RefreshCoordinator,
    settled: bool,
}

impl Cycle<'_> {
    fn settle(&mut self, outcome: &RefreshOutcome) {
        self.settled = true;
        self.coordinator.settle(outcome);
    }
}

impl Drop for Cycle<'_> {
    fn drop(&mut self) {
        if !self.settled {
            warn!("token refresh abandoned before completion");
            self.coordinator
                .settle(&RefreshOutcome::Failed(RefreshFailure::abandoned()));
        }
    }
}
