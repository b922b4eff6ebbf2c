use std::result::Result as StdResult;
use thiserror::Error;

/// Errors raised while preparing test containers.
#[derive(Debug, Error)]
pub enum TestInfraError {
    #[error("Container error: {0}")]
    Container(#[from] testcontainers::TestcontainersError),
    #[error("database still refusing connections after {attempt} attempts: {source}")]
    Connect {
        attempt: u32,
        #[source]
        source: sqlx::Error,
    },
}

pub type Result<T> = StdResult<T, TestInfraError>;
