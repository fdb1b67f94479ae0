//! Crate-wide error taxonomy.
//!
//! Every failure the orchestrator can produce is one of these variants;
//! network-level failures from `reqwest` are classified into the transport
//! variants so callers can decide what is retryable.

use thiserror::Error;

/// Orchestrator error types
#[derive(Debug, Error)]
pub enum ArenaError {
    /// Bad registration or battle submission; rejected synchronously,
    /// nothing is persisted
    #[error("Validation error: {0}")]
    Validation(String),

    /// Operation conflicts with existing state (e.g. deleting an agent
    /// referenced by an active battle)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Requested record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Launcher endpoint could not be reached after bounded retries
    #[error("Launcher unreachable: {0}")]
    LauncherUnreachable(String),

    /// Launcher answered but refused the reset
    #[error("Reset rejected: {0}")]
    ResetRejected(String),

    /// Dispatch exceeded the battle's deadline
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Malformed or missing result fields in an agent reply
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Persistence failure; battle state is not advanced until retried
    #[error("Storage error: {0}")]
    Storage(String),

    /// Network communication error below the protocol level
    #[error("Network error: {0}")]
    Network(String),
}

impl ArenaError {
    /// Transport failures worth retrying at the launcher level; protocol
    /// and validation failures never are.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ArenaError::Network(_) | ArenaError::Timeout(_) | ArenaError::LauncherUnreachable(_)
        )
    }
}

impl From<reqwest::Error> for ArenaError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ArenaError::Timeout(err.to_string())
        } else if err.is_connect() {
            ArenaError::LauncherUnreachable(err.to_string())
        } else {
            ArenaError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ArenaError {
    fn from(err: serde_json::Error) -> Self {
        ArenaError::Protocol(err.to_string())
    }
}

/// Result type for orchestrator operations
pub type Result<T> = std::result::Result<T, ArenaError>;
