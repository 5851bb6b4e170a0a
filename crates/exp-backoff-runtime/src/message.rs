//! Messages handed out by a queue and the identifiers attached to them.

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Identifiers
// ============================================================================

/// Validated queue name
///
/// Follows the SQS naming rules: 1-80 characters of ASCII alphanumerics,
/// hyphens and underscores, optionally ending in `.fifo`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueName(String);

impl QueueName {
    const FIFO_SUFFIX: &'static str = ".fifo";

    const MAX_LEN: usize = 80;

    pub fn new(name: String) -> Result<Self, ValidationError> {
        if !(1..=Self::MAX_LEN).contains(&name.len()) {
            return Err(ValidationError::OutOfRange {
                field: "queue_name".to_string(),
                message: format!("length {} not within 1..={}", name.len(), Self::MAX_LEN),
            });
        }

        let base = name.strip_suffix(Self::FIFO_SUFFIX).unwrap_or(&name);
        let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '-' | '_');
        if base.is_empty() || !base.chars().all(allowed) {
            return Err(ValidationError::InvalidFormat {
                field: "queue_name".to_string(),
                message: format!("'{}' may only use [A-Za-z0-9_-]", name),
            });
        }

        Ok(Self(name))
    }

    /// Derive the queue name from an SQS queue URL (its last path segment)
    pub fn from_queue_url(queue_url: &str) -> Result<Self, ValidationError> {
        let parsed = url::Url::parse(queue_url).map_err(|e| ValidationError::InvalidFormat {
            field: "queue_url".to_string(),
            message: e.to_string(),
        })?;

        let last_segment = parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .unwrap_or_default();

        Self::new(last_segment.to_string())
    }

    /// Whether this is a FIFO queue
    pub fn is_fifo(&self) -> bool {
        self.0.ends_with(Self::FIFO_SUFFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for QueueName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

/// Identifier the provider assigned to a message
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Random identifier, for providers that do not issue their own
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Accepts any non-blank provider-issued identifier
impl FromStr for MessageId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" => Err(ValidationError::Required {
                field: "message_id".to_string(),
            }),
            id => Ok(Self(id.to_string())),
        }
    }
}

/// Opaque token for acknowledging a received message
///
/// Only meaningful to the provider that issued it.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ReceiptHandle(String);

impl ReceiptHandle {
    /// Wrap a provider-issued receipt token
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// SQS receipt handles run to several hundred characters; keep log lines readable.
impl fmt::Debug for ReceiptHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const PREVIEW: usize = 16;
        if self.0.len() > PREVIEW && self.0.is_char_boundary(PREVIEW) {
            write!(f, "ReceiptHandle({}…)", &self.0[..PREVIEW])
        } else {
            write!(f, "ReceiptHandle({})", self.0)
        }
    }
}

// ============================================================================
// Messages
// ============================================================================

/// A message received from the queue
///
/// The body is opaque to the consumer; it is handed to the processor as-is.
#[derive(Debug, Clone)]
pub struct QueueMessage {
    pub message_id: MessageId,
    pub body: String,
    pub receipt_handle: ReceiptHandle,
    /// Number of times the provider has handed this message out, including this one
    pub receive_count: u32,
}

impl QueueMessage {
    /// Create a message as received for the first time
    pub fn new(message_id: MessageId, body: impl Into<String>, receipt_handle: ReceiptHandle) -> Self {
        Self {
            message_id,
            body: body.into(),
            receipt_handle,
            receive_count: 1,
        }
    }

    /// Set the provider-reported receive count
    pub fn with_receive_count(mut self, receive_count: u32) -> Self {
        self.receive_count = receive_count;
        self
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
