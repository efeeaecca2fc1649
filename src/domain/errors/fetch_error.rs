//! Fetch and pipeline error types.

use thiserror::Error;

/// Result type for fetch, cache and download operations.
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Failure taxonomy shared by the cache, loader, worker and download layers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[allow(missing_docs)]
pub enum FetchError {
    #[error("network error: {message}")]
    Network { message: String },

    #[error("unexpected HTTP status {status}")]
    Http { status: u16 },

    #[error("timed out during {operation}")]
    Timeout { operation: String },

    #[error("upstream rejected request (code {code}): {message}")]
    Api { code: i64, message: String },

    #[error("decode error: {message}")]
    Decode { message: String },

    #[error("filesystem error: {message}")]
    Filesystem { message: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl FetchError {
    /// Creates network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Creates timeout error.
    #[must_use]
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    /// Creates decode error.
    #[must_use]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Creates upstream API error.
    #[must_use]
    pub fn api(code: i64, message: impl Into<String>) -> Self {
        Self::Api {
            code,
            message: message.into(),
        }
    }

    /// Creates filesystem error.
    #[must_use]
    pub fn filesystem(message: impl Into<String>) -> Self {
        Self::Filesystem {
            message: message.into(),
        }
    }

    /// Creates internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Maps a transport error, keeping timeouts distinguishable.
    #[must_use]
    pub fn from_reqwest(error: &reqwest::Error, operation: &str) -> Self {
        if error.is_timeout() {
            Self::timeout(operation)
        } else if let Some(status) = error.status() {
            Self::Http {
                status: status.as_u16(),
            }
        } else if error.is_decode() {
            Self::decode(error.to_string())
        } else if error.is_connect() {
            Self::network(format!("failed to connect during {operation}"))
        } else {
            Self::network(error.to_string())
        }
    }

    /// Returns whether a retry may succeed.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        match self {
            Self::Network { .. } | Self::Timeout { .. } => true,
            Self::Http { status } => *status >= 500 || *status == 429,
            Self::Api { .. }
            | Self::Decode { .. }
            | Self::Filesystem { .. }
            | Self::Cancelled
            | Self::Internal { .. } => false,
        }
    }

    /// Returns whether the operation was stopped on request.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<std::io::Error> for FetchError {
    fn from(error: std::io::Error) -> Self {
        Self::filesystem(error.to_string())
    }
}
