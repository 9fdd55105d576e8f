//! Fixed keys and endpoint paths of the session contract

/// Store key holding the raw bearer token
pub const TOKEN_KEY: &str = "token";

/// Store key holding the JSON-encoded user profile
pub const USER_KEY: &str = "user";

/// Login endpoint, relative to the API base URL
pub const DEFAULT_LOGIN_PATH: &str = "/api/v1/auth/login";

/// Bearer-authenticated refresh endpoint, relative to the API base URL
pub const DEFAULT_REFRESH_PATH: &str = "/api/v1/auth/refresh";
