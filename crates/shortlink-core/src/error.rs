use thiserror::Error;

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors surfaced by the repository contract.
///
/// Duplicate original URLs are not errors: every backend resolves them into
/// an `already_existed` result. [`StorageError::Conflict`] is only returned
/// when that resolution is impossible.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("short url not found: {0}")]
    NotFound(String),
    #[error("conflicting record could not be resolved: {0}")]
    Conflict(String),
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("storage operation timed out: {0}")]
    Timeout(String),
    #[error("storage query failed: {0}")]
    Query(String),
    #[error("stored data is invalid: {0}")]
    InvalidData(String),
    #[error("storage io failed: {0}")]
    Io(String),
    #[error("malformed record at line {line}: {message}")]
    Decode { line: usize, message: String },
    #[error("storage operation failed: {0}")]
    Operation(String),
}

impl StorageError {
    /// Returns `true` for a lookup miss, which callers treat as a normal outcome.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

#[derive(Debug, Clone, Error)]
pub enum CoreError {
    #[error("invalid short code: {0}")]
    InvalidShortCode(String),
    #[error("invalid owner id: {0}")]
    InvalidOwnerId(String),
}
