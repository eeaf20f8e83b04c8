//! Error types for store operations.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// A read could not be served.
    #[error("store read failed: {message}")]
    ReadFailed {
        /// Description of the failure.
        message: String,
    },

    /// A write batch was rejected. Nothing from the batch was applied.
    #[error("store write failed: {message}")]
    WriteFailed {
        /// Description of the failure.
        message: String,
    },

    /// The store is closed.
    #[error("store is closed")]
    Closed,
}

impl StoreError {
    /// Creates a read failure.
    pub fn read(message: impl Into<String>) -> Self {
        Self::ReadFailed {
            message: message.into(),
        }
    }

    /// Creates a write failure.
    pub fn write(message: impl Into<String>) -> Self {
        Self::WriteFailed {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        assert_eq!(StoreError::Closed.to_string(), "store is closed");
        assert_eq!(
            StoreError::write("disk full").to_string(),
            "store write failed: disk full"
        );
        assert!(StoreError::read("locked").to_string().contains("locked"));
    }
}
