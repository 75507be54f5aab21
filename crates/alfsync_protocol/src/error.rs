//! Error types for the protocol crate.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while parsing change feed payloads.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The body is not a JSON document of the expected kind.
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    /// The JSON is well-formed but violates a required shape.
    #[error("malformed response: {message}")]
    Malformed {
        /// Description of the violation.
        message: String,
        /// The offending payload, for diagnosis.
        payload: String,
    },

    /// A feed document lacks a required key.
    #[error("feed contract violation: {0}")]
    ContractViolation(String),

    /// A checkpoint token could not be parsed.
    #[error("invalid checkpoint token: {0:?}")]
    InvalidToken(String),
}

impl ProtocolError {
    /// Creates a malformed-response error carrying the offending payload.
    pub fn malformed(message: impl Into<String>, payload: &serde_json::Value) -> Self {
        Self::Malformed {
            message: message.into(),
            payload: payload.to_string(),
        }
    }
}
