//! Session persistence for the authenticated API client
//!
//! Holds the bearer token and user profile between requests and across
//! process restarts. This crate never touches the network; the client crate
//! reads the token before every attempt and writes it after login or refresh.
//!
//! Session flow:
//! 1. Caller logs in, the client stores a `TokenRecord` via `TokenStore::set()`
//! 2. Every request reads `TokenStore::get()` and attaches the bearer token
//! 3. A successful refresh replaces the record
//! 4. Logout or an unrecoverable refresh failure calls `TokenStore::clear()`

pub mod constants;
pub mod error;
pub mod record;
pub mod store;
pub mod token;

pub use constants::*;
pub use error::{Error, Result};
pub use record::{TokenRecord, TokenStore};
pub use store::{FileStore, KeyValueStore, MemoryStore};
pub use token::{LoginRequest, TokenResponse};
