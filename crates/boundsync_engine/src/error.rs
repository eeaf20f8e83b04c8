//! Error types for the sync engine.

use boundsync_store::StoreError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Message used when a failure carries no usable description.
pub const GENERIC_NETWORK_ERROR: &str = "network error";

/// Errors that can occur during sync operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// Connection-level failure (refused, reset, DNS). Retried.
    #[error("network error: {message}")]
    Transient {
        /// Error message.
        message: String,
    },

    /// The request did not complete in time. Retried.
    #[error("request timed out")]
    Timeout,

    /// The remote side answered outside the success range. Not retried.
    #[error("{message}")]
    Application {
        /// HTTP-like status code.
        status: u16,
        /// Message extracted from the response.
        message: String,
    },

    /// Local store read or write failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The retry budget was spent on transient failures.
    #[error("{last} (gave up after {attempts} attempts)")]
    ExhaustedRetries {
        /// Number of attempts made.
        attempts: u32,
        /// The failure of the last attempt.
        last: Box<SyncError>,
    },

    /// A response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// The operation was cancelled by its consumer.
    #[error("operation cancelled")]
    Cancelled,
}

impl SyncError {
    /// Creates a transient network error.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    /// Creates an application error.
    pub fn application(status: u16, message: impl Into<String>) -> Self {
        Self::Application {
            status,
            message: message.into(),
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Transient { .. } | SyncError::Timeout)
    }

    /// Returns a non-empty message suitable for an error envelope.
    pub fn user_message(&self) -> String {
        let message = self.to_string();
        if message.trim().is_empty() {
            GENERIC_NETWORK_ERROR.to_string()
        } else {
            message
        }
    }
}
