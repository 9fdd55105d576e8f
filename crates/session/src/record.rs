//! Token record and the accessor over the two fixed session keys

use std::sync::Arc;

use common::Secret;
use tracing::warn;

use crate::constants::{TOKEN_KEY, USER_KEY};
use crate::error::{Error, Result};
use crate::store::KeyValueStore;

/// The current bearer token plus the profile returned alongside it.
#[derive(Debug, Clone)]
pub struct TokenRecord {
    pub token: Secret<String>,
    pub user: Option<serde_json::Value>,
}

impl TokenRecord {
    pub fn new(token: impl Into<String>, user: Option<serde_json::Value>) -> Self {
        Self {
            token: Secret::new(token.into()),
            user,
        }
    }
}

/// Reads and writes the session through a `KeyValueStore`.
///
/// Cheap to clone; every clone shares the same backing store.
#[derive(Clone)]
pub struct TokenStore {
    backend: Arc<dyn KeyValueStore>,
}

impl TokenStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    /// Current session, or `None` when logged out.
    pub fn get(&self) -> Option<TokenRecord> {
        let token = self.backend.get(TOKEN_KEY)?;
        let user = self.backend.get(USER_KEY).and_then(|raw| {
            serde_json::from_str(&raw)
                .inspect_err(|e| warn!(error = %e, "ignoring unparsable stored user profile"))
                .ok()
        });
        Some(TokenRecord::new(token, user))
    }

    /// Only the bearer token.
    pub fn token(&self) -> Option<Secret<String>> {
        self.backend.get(TOKEN_KEY).map(Secret::new)
    }

    /// Replace the session. A record without a user removes any stored profile.
    pub fn set(&self, record: &TokenRecord) -> Result<()> {
        self.backend.set(TOKEN_KEY, record.token.expose().clone())?;
        match &record.user {
            Some(user) => {
                let raw = serde_json::to_string(user)
                    .map_err(|e| Error::Parse(format!("serializing user profile: {e}")))?;
                self.backend.set(USER_KEY, raw)
            }
            None => self.backend.remove(USER_KEY),
        }
    }

    pub fn clear(&self) -> Result<()> {
        self.backend.remove(TOKEN_KEY)?;
        self.backend.remove(USER_KEY)
    }
}
