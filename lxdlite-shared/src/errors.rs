//! Error types used across the lxdlite runtime.

use thiserror::Error;

/// Result type for lxdlite operations.
pub type LxdliteResult<T> = Result<T, LxdliteError>;

#[derive(Debug, Error)]
pub enum LxdliteError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

// Implement From for common error types to enable `?` operator
impl From<std::io::Error> for LxdliteError {
    fn from(err: std::io::Error) -> Self {
        LxdliteError::Internal(format!("I/O error: {}", err))
    }
}

impl From<serde_json::Error> for LxdliteError {
    fn from(err: serde_json::Error) -> Self {
        LxdliteError::Internal(format!("JSON error: {}", err))
    }
}

impl From<String> for LxdliteError {
    fn from(err: String) -> Self {
        LxdliteError::Internal(err)
    }
}

impl From<&str> for LxdliteError {
    fn from(err: &str) -> Self {
        LxdliteError::Internal(err.to_string())
    }
}
