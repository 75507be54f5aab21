//! Error types for the sync engine.

use alfsync_protocol::ProtocolError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
///
/// Every variant is fatal to the current invocation. Retrying is left to
/// whoever drives the engine.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The repository could not be reached or answered with something that
    /// is not a JSON document.
    #[error("repository unreachable: {message}")]
    Unreachable {
        /// Error message.
        message: String,
    },

    /// A response violated a required shape.
    #[error("malformed response: {message}")]
    MalformedResponse {
        /// Error message.
        message: String,
        /// The offending payload.
        payload: String,
    },

    /// A feed document lacked `uuid` or `deleted`.
    #[error("feed contract violation: {0}")]
    FeedContractViolation(String),

    /// The host failed to accept a document or checkpoint.
    #[error("host error: {0}")]
    Host(String),

    /// Invalid state transition.
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidStateTransition {
        /// Current state.
        from: String,
        /// Attempted target state.
        to: String,
    },
}

impl SyncError {
    /// Creates an unreachable error.
    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::Unreachable {
            message: message.into(),
        }
    }

    /// Returns true if re-running the invocation later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Unreachable { .. })
    }
}

impl From<ProtocolError> for SyncError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::InvalidJson(message) => SyncError::Unreachable { message },
            ProtocolError::Malformed { message, payload } => {
                SyncError::MalformedResponse { message, payload }
            }
            ProtocolError::ContractViolation(message) => SyncError::FeedContractViolation(message),
            ProtocolError::InvalidToken(token) => SyncError::MalformedResponse {
                message: "invalid checkpoint token".into(),
                payload: token,
            },
        }
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::Host(err.to_string())
    }
}
