use thiserror::Error;

/// Errors raised while talking to the remote authorization and log service.
///
/// Every variant is a "remote unavailable" condition from the runtime's point
/// of view: callers fall back to local data and never retry inline.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The call did not complete within its budget.
    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The service answered with a non-success status.
    #[error("Remote returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The response could not be understood.
    #[error("Malformed response: {message}")]
    Malformed { message: String },

    /// The service refused or is otherwise unavailable.
    #[error("Remote unavailable: {message}")]
    Unavailable { message: String },
}

impl RemoteError {
    pub fn timeout(timeout: std::time::Duration) -> Self {
        Self::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Transport(e) => e.is_timeout(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, RemoteError>;
