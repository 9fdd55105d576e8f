//! Wire types for the login and refresh endpoints
//!
//! Login: `POST <login_path>` with `{email, password}` returns `{token, user}`.
//! Refresh: bearer-authenticated `POST <refresh_path>` with no body returns
//! `{token, user?}`. A refresh response without `user` keeps the stored profile.

use serde::{Deserialize, Serialize};

use crate::record::TokenRecord;

/// Credentials posted to the login endpoint.
#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// Response body of both login and refresh.
#[derive(Debug, Deserialize, Serialize)]
pub struct TokenResponse {
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<serde_json::Value>,
}

impl From<TokenResponse> for TokenRecord {
    fn from(response: TokenResponse) -> Self {
        TokenRecord::new(response.token, response.user)
    }
}
