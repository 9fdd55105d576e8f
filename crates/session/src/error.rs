//! Error types for session persistence

/// Errors from reading or writing the persistent session surface.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("session parse error: {0}")]
    Parse(String),
}

/// Result alias for session operations.
pub type Result<T> = std::result::Result<T, Error>;
