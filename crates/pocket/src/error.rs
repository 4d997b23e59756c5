//! Error types for the pocket crate

use std::time::Duration;

use thiserror::Error;

/// Result type alias using the crate's [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by sync, export and credential loading
#[derive(Debug, Error)]
pub enum Error {
    /// No usable credentials
    #[error("Authentication missing: {0}")]
    AuthMissing(String),

    /// Retry budget exhausted on a retryable remote failure
    #[error("Sync failed after {attempts} attempts: {last}")]
    SyncFailed {
        attempts: u32,
        #[source]
        last: RemoteError,
    },

    /// Non-retryable remote failure
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// A batch could not be committed; the cursor was not advanced
    #[error("Merge failed: {0:#}")]
    MergeFailed(#[source] anyhow::Error),

    /// Unknown or unsupported export format
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Unusable filter or pagination options
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// Storage read or bookkeeping failure
    #[error("Storage error: {0:#}")]
    Store(#[source] anyhow::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures reported by a remote item source
#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    /// The remote asked us to slow down
    #[error("Rate limited: {message}")]
    RateLimited {
        retry_after: Option<Duration>,
        message: String,
    },

    /// Network failure, timeout or 5xx
    #[error("Transient failure: {0}")]
    Transient(String),

    /// Credentials were rejected
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The requested page was too large for the remote to serve
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// Malformed request or response, or an API-level error
    #[error("Remote error: {0}")]
    Fatal(String),
}

impl Error {
    /// Whether this is a configuration problem detected before any work started
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::InvalidFormat(_) | Self::InvalidFilter(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_failed_message_includes_attempts_and_cause() {
        let err = Error::SyncFailed {
            attempts: 5,
            last: RemoteError::Transient("connection reset".to_string()),
        };
        let message = err.to_string();
        assert!(message.contains("5 attempts"));
        assert!(message.contains("connection reset"));
    }

    #[test]
    fn test_is_configuration() {
        assert!(Error::InvalidFormat("xml".to_string()).is_configuration());
        assert!(Error::InvalidFilter("limit".to_string()).is_configuration());
        assert!(!Error::AuthMissing("no file".to_string()).is_configuration());
    }
}
