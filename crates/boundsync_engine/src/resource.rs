//! The tri-state envelope emitted by network-bound resources.

use serde::{Deserialize, Serialize};

/// Status of a [`Resource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// A load or refresh is in progress.
    Loading,
    /// The data is current.
    Success,
    /// The last operation failed.
    Error,
}

/// A value together with its loading status.
///
/// # Invariants
///
/// - `Error` always carries a non-empty message
/// - `Success` carries data unless the underlying query yields no value
/// - Immutable once constructed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resource<T> {
    status: Status,
    data: Option<T>,
    message: Option<String>,
}

impl<T> Resource<T> {
    /// Message used for errors constructed with an empty message.
    pub const UNKNOWN_ERROR: &'static str = "unknown error";

    /// Creates a loading envelope carrying the last known value, if any.
    pub fn loading(data: Option<T>) -> Self {
        Self {
            status: Status::Loading,
            data,
            message: None,
        }
    }

    /// Creates a success envelope.
    pub fn success(data: Option<T>) -> Self {
        Self {
            status: Status::Success,
            data,
            message: None,
        }
    }

    /// Creates an error envelope carrying the last known value, if any.
    pub fn error(message: impl Into<String>, data: Option<T>) -> Self {
        let mut message = message.into();
        if message.trim().is_empty() {
            message = Self::UNKNOWN_ERROR.to_string();
        }
        Self {
            status: Status::Error,
            data,
            message: Some(message),
        }
    }

    /// Returns the status.
    pub fn status(&self) -> Status {
        self.status
    }

    /// Returns the payload.
    pub fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    /// Returns the error message. Always `Some` for errors.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Consumes the envelope and returns the payload.
    pub fn into_data(self) -> Option<T> {
        self.data
    }

    /// Returns true if the status is [`Status::Loading`].
    pub fn is_loading(&self) -> bool {
        self.status == Status::Loading
    }

    /// Returns true if the status is [`Status::Success`].
    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    /// Returns true if the status is [`Status::Error`].
    pub fn is_error(&self) -> bool {
        self.status == Status::Error
    }

    /// Maps the payload, keeping status and message.
    pub fn map<U, F>(self, f: F) -> Resource<U>
    where
        F: FnOnce(T) -> U,
    {
        Resource {
            status: self.status,
            data: self.data.map(f),
            message: self.message,
        }
    }
}
