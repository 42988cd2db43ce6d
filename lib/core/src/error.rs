use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid embedding dimension: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid filter plan: {0}")]
    InvalidPlan(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{capability} failed: {message}")]
    Capability {
        capability: &'static str,
        message: String,
    },

    #[error("{capability} timed out after {after:?}")]
    Timeout {
        capability: &'static str,
        after: Duration,
    },

    #[error("{capability} cancelled")]
    Cancelled { capability: &'static str },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// True for failures of an external capability (embedding, arbitration,
    /// conversion, extraction, plan compilation), including timeouts and
    /// cancellation. Store errors are never capability failures.
    pub fn is_capability_failure(&self) -> bool {
        matches!(
            self,
            Error::Capability { .. } | Error::Timeout { .. } | Error::Cancelled { .. }
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
