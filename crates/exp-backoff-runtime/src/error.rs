//! Errors returned by queue clients.
//!
//! Every provider maps its native failures onto [`QueueError`]. Callers that
//! only care whether the same call could succeed later use
//! [`QueueError::is_transient`]; the consumer reports that flag to its
//! metrics but never retries a queue call itself.

use std::time::Duration;
use thiserror::Error;

/// Failure of a receive, delete or send call
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue '{queue_name}' does not exist")]
    QueueNotFound { queue_name: String },

    /// The receipt is unknown, already used, or its visibility window ended
    #[error("Receipt '{receipt}' is no longer valid")]
    MessageNotFound { receipt: String },

    #[error("Queue call did not complete within {duration:?}")]
    Timeout { duration: Duration },

    #[error("Unable to reach queue: {message}")]
    ConnectionFailed { message: String },

    #[error("Queue rejected credentials: {message}")]
    AuthenticationFailed { message: String },

    #[error("Delay of {delay_seconds}s exceeds provider maximum of {max_seconds}s")]
    DelayOutOfRange { delay_seconds: u64, max_seconds: u64 },

    #[error("Message body of {size} bytes exceeds the {max_size} byte limit")]
    MessageTooLarge { size: usize, max_size: usize },

    /// Any other error code reported by the provider
    #[error("{provider} returned {code}: {message}")]
    ProviderError {
        provider: String,
        code: String,
        message: String,
    },

    #[error("Unreadable provider response: {0}")]
    SerializationError(#[from] SerializationError),

    #[error("Queue client misconfigured: {0}")]
    ConfigurationError(#[from] ConfigurationError),

    #[error("Rejected value: {0}")]
    ValidationError(#[from] ValidationError),
}

impl QueueError {
    /// Whether repeating the same call later could succeed
    ///
    /// Unrecognised provider codes count as transient.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::ConnectionFailed { .. } | Self::ProviderError { .. }
        )
    }
}

/// Provider response that could not be decoded
#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("malformed XML: {message}")]
    Xml { message: String },

    #[error("<{element}> missing from response")]
    MissingElement { element: String },

    #[error("body is not UTF-8")]
    InvalidUtf8,
}

/// Client configuration that cannot be used
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("{message}")]
    Invalid { message: String },

    #[error("'{key}' must be set")]
    Missing { key: String },
}

/// Identifier or value rejected before it reached the provider
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("'{field}' is required")]
    Required { field: String },

    #[error("'{field}' is malformed: {message}")]
    InvalidFormat { field: String, message: String },

    #[error("'{field}' out of range: {message}")]
    OutOfRange { field: String, message: String },
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
