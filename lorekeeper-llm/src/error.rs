//! Model-call error types.

use thiserror::Error;

/// Errors that can occur while calling the model server.
#[derive(Debug, Error)]
pub enum LlmError {
    /// HTTP request failed or the server answered with an error status.
    #[error("model request failed: {0}")]
    RequestFailed(String),

    /// Server response was not the expected JSON.
    #[error("failed to parse model response: {0}")]
    ParseError(String),

    /// Request timed out.
    #[error("model request timed out after {0}ms")]
    Timeout(u64),

    /// Server could not be reached.
    #[error("model server unavailable: {0}")]
    Unavailable(String),

    /// The caller cancelled the request.
    #[error("model request cancelled")]
    Cancelled,

    /// Client configuration is unusable.
    #[error("model client configuration error: {0}")]
    ConfigError(String),
}

impl LlmError {
    /// Whether this error is a cancellation rather than a fault.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout(0)
        } else if err.is_connect() {
            LlmError::Unavailable(err.to_string())
        } else if err.is_decode() {
            LlmError::ParseError(err.to_string())
        } else {
            LlmError::RequestFailed(err.to_string())
        }
    }
}
