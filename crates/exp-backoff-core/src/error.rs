//! Error types for the consumer.

use exp_backoff_runtime::QueueError;
use std::any::Any;
use thiserror::Error;

/// Errors raised while building, starting or stopping a consumer
#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("Invalid consumer configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Consumer has been stopped and cannot be started again")]
    AlreadyStopped,

    #[error("Slot pool is closed")]
    SlotPoolClosed,

    #[error("No tokio runtime is available to run the consumer")]
    NoRuntime,

    #[error("Queue operation failed: {0}")]
    Queue(#[from] QueueError),
}

impl ConsumerError {
    pub(crate) fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}

/// Render a panic payload for logging
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
