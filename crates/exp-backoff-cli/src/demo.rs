//! Demonstration processor used by `exp-backoff run`.
//!
//! Messages carry a [`RetryEnvelope`]. Each delivery bumps the attempt
//! counter and reschedules the envelope until `max_attempts` deliveries have
//! been seen, at which point the message is completed. Bodies that are not
//! envelopes are treated as a first attempt with the raw body as payload.

use async_trait::async_trait;
use exp_backoff_core::{MessageProcessor, Verdict};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[cfg(test)]
#[path = "demo_tests.rs"]
mod tests;

/// Message body understood by [`RetryDemoProcessor`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryEnvelope {
    pub payload: String,
    #[serde(default)]
    pub attempt: u32,
}

impl RetryEnvelope {
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            attempt: 0,
        }
    }

    /// Decode a message body, wrapping anything that is not an envelope
    pub fn decode(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_else(|_| Self::new(body))
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Reschedules each message until it has been delivered `max_attempts` times
#[derive(Debug, Clone)]
pub struct RetryDemoProcessor {
    max_attempts: u32,
}

impl RetryDemoProcessor {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

#[async_trait]
impl MessageProcessor for RetryDemoProcessor {
    async fn process(&self, body: &str) -> Verdict {
        let envelope = RetryEnvelope::decode(body);
        let delivery = envelope.attempt.saturating_add(1);

        if delivery >= self.max_attempts {
            info!(
                payload = %envelope.payload,
                deliveries = delivery,
                "Message completed"
            );
            return Verdict::Completed;
        }

        let next = RetryEnvelope {
            payload: envelope.payload,
            attempt: delivery,
        };
        match next.encode() {
            Ok(encoded) => {
                info!(
                    payload = %next.payload,
                    attempt = envelope.attempt,
                    "Retrying message later"
                );
                Verdict::reschedule(encoded, envelope.attempt)
            }
            Err(e) => {
                warn!(error = %e, "Unable to encode retry envelope");
                Verdict::Failed
            }
        }
    }
}
