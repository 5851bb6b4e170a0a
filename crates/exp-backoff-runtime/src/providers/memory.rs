//! Process-local queue with SQS-like visibility and delay semantics.
//!
//! This module provides a queue with the delivery semantics the consumer
//! expects from a real broker:
//! - Delayed sends only become visible once their delay elapses
//! - Received messages are hidden for a visibility timeout and then redelivered
//!   unless they are deleted first (at-least-once delivery)
//! - Every client call is recorded so tests can assert on the exact traffic
//!
//! Time is measured with `tokio::time::Instant`, so tests running on a paused
//! clock can advance past delays and visibility timeouts deterministically.

use crate::client::QueueClient;
use crate::error::QueueError;
use crate::message::{MessageId, QueueMessage, ReceiptHandle};
use crate::provider::{InMemoryConfig, ProviderType};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

// ============================================================================
// Recorded Operations
// ============================================================================

/// A client call made against an [`InMemoryQueue`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueOperation {
    Receive { max_messages: u32, returned: usize },
    Delete { receipt: String },
    Send { body: String, delay_seconds: u64 },
}

// ============================================================================
// Storage
// ============================================================================

/// Message waiting to become receivable
#[derive(Clone)]
struct StoredMessage {
    message_id: MessageId,
    body: String,
    receive_count: u32,
    available_at: Instant,
}

impl StoredMessage {
    fn is_available(&self, now: Instant) -> bool {
        now >= self.available_at
    }
}

/// Message handed out and awaiting delete or visibility expiry
struct InFlightMessage {
    message: StoredMessage,
    visible_again_at: Instant,
}

struct QueueState {
    /// Waiting messages in send order
    messages: VecDeque<StoredMessage>,
    /// Received but not yet deleted, keyed by receipt handle
    in_flight: HashMap<String, InFlightMessage>,
    /// Most recent client calls, oldest first
    operations: VecDeque<QueueOperation>,
    operation_log_limit: usize,
}

impl QueueState {
    fn new(operation_log_limit: usize) -> Self {
        Self {
            messages: VecDeque::new(),
            in_flight: HashMap::new(),
            operations: VecDeque::new(),
            operation_log_limit,
        }
    }

    fn record(&mut self, operation: QueueOperation) {
        if self.operation_log_limit == 0 {
            return;
        }
        while self.operations.len() >= self.operation_log_limit {
            self.operations.pop_front();
        }
        self.operations.push_back(operation);
    }

    /// Return messages whose visibility timeout lapsed to the waiting list
    fn reclaim_expired(&mut self, now: Instant) {
        let expired: Vec<String> = self
            .in_flight
            .iter()
            .filter(|(_, flight)| now >= flight.visible_again_at)
            .map(|(receipt, _)| receipt.clone())
            .collect();

        for receipt in expired {
            if let Some(flight) = self.in_flight.remove(&receipt) {
                self.messages.push_back(flight.message);
            }
        }
    }

    fn len(&self) -> usize {
        self.messages.len() + self.in_flight.len()
    }
}

// ============================================================================
// InMemoryQueue
// ============================================================================

/// In-memory queue implementing [`QueueClient`]
pub struct InMemoryQueue {
    state: Mutex<QueueState>,
    config: InMemoryConfig,
}

impl InMemoryQueue {
    /// Create new in-memory queue with configuration
    pub fn new(config: InMemoryConfig) -> Self {
        Self {
            state: Mutex::new(QueueState::new(config.operation_log_limit)),
            config,
        }
    }

    /// Enqueue a message that is immediately visible
    pub async fn enqueue(&self, body: impl Into<String>) -> Result<MessageId, QueueError> {
        let body = body.into();
        self.insert(body, Duration::ZERO)
    }

    /// Total number of messages held, waiting or in flight
    pub fn len(&self) -> usize {
        self.lock().map(|state| state.len()).unwrap_or(0)
    }

    /// Whether the queue holds no messages at all
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of received-but-undeleted messages
    pub fn in_flight_len(&self) -> usize {
        self.lock().map(|state| state.in_flight.len()).unwrap_or(0)
    }

    /// Bodies of waiting messages in queue order
    pub fn pending_bodies(&self) -> Vec<String> {
        self.lock()
            .map(|state| state.messages.iter().map(|m| m.body.clone()).collect())
            .unwrap_or_default()
    }

    /// Snapshot of the recorded client calls, oldest first
    ///
    /// Holds at most `operation_log_limit` entries.
    pub fn operations(&self) -> Vec<QueueOperation> {
        self.lock()
            .map(|state| state.operations.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Forget every recorded client call
    pub fn clear_operations(&self) {
        if let Ok(mut state) = self.lock() {
            state.operations.clear();
        }
    }

    /// Number of receive calls in the operation log
    pub fn receive_count(&self) -> usize {
        self.operations()
            .iter()
            .filter(|op| matches!(op, QueueOperation::Receive { .. }))
            .count()
    }

    fn lock(&self) -> Result<MutexGuard<'_, QueueState>, QueueError> {
        self.state.lock().map_err(|_| QueueError::ProviderError {
            provider: ProviderType::InMemory.to_string(),
            code: "LockPoisoned".to_string(),
            message: "queue state lock poisoned by a panicking caller".to_string(),
        })
    }

    fn insert(&self, body: String, delay: Duration) -> Result<MessageId, QueueError> {
        let max_size = ProviderType::InMemory.max_message_size();
        if body.len() > max_size {
            return Err(QueueError::MessageTooLarge {
                size: body.len(),
                max_size,
            });
        }

        let mut state = self.lock()?;
        if state.len() >= self.config.max_queue_size {
            return Err(QueueError::ProviderError {
                provider: ProviderType::InMemory.to_string(),
                code: "QueueFull".to_string(),
                message: format!(
                    "queue '{}' holds the maximum of {} messages",
                    self.config.queue_name, self.config.max_queue_size
                ),
            });
        }

        let message_id = MessageId::new();
        state.messages.push_back(StoredMessage {
            message_id: message_id.clone(),
            body,
            receive_count: 0,
            available_at: visible_after(Instant::now(), delay),
        });

        Ok(message_id)
    }
}

/// Delays too large to represent are treated as "never" within any realistic test run.
fn visible_after(now: Instant, delay: Duration) -> Instant {
    const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);
    now.checked_add(delay).unwrap_or_else(|| now + FAR_FUTURE)
}

impl Default for InMemoryQueue {
    fn default() -> Self {
        Self::new(InMemoryConfig::default())
    }
}

#[async_trait]
impl QueueClient for InMemoryQueue {
    async fn receive_messages(&self, max_messages: u32) -> Result<Vec<QueueMessage>, QueueError> {
        let now = Instant::now();
        let visibility = Duration::from_secs(self.config.visibility_timeout_seconds);
        let limit = max_messages.min(ProviderType::InMemory.max_batch_size()) as usize;

        let mut state = self.lock()?;
        state.reclaim_expired(now);

        let mut received = Vec::new();
        let mut remaining = VecDeque::with_capacity(state.messages.len());
        while let Some(mut stored) = state.messages.pop_front() {
            if received.len() < limit && stored.is_available(now) {
                stored.receive_count += 1;
                let receipt = uuid::Uuid::new_v4().to_string();
                received.push(
                    QueueMessage::new(
                        stored.message_id.clone(),
                        stored.body.clone(),
                        ReceiptHandle::new(receipt.clone()),
                    )
                    .with_receive_count(stored.receive_count),
                );
                state.in_flight.insert(
                    receipt,
                    InFlightMessage {
                        message: stored,
                        visible_again_at: visible_after(now, visibility),
                    },
                );
            } else {
                remaining.push_back(stored);
            }
        }
        state.messages = remaining;

        let returned = received.len();
        state.record(QueueOperation::Receive {
            max_messages,
            returned,
        });

        Ok(received)
    }

    async fn delete_message(&self, receipt: &ReceiptHandle) -> Result<(), QueueError> {
        let mut state = self.lock()?;
        state.record(QueueOperation::Delete {
            receipt: receipt.as_str().to_string(),
        });

        match state.in_flight.remove(receipt.as_str()) {
            Some(_) => Ok(()),
            None => Err(QueueError::MessageNotFound {
                receipt: receipt.as_str().to_string(),
            }),
        }
    }

    async fn send_message(&self, body: &str, delay_seconds: u64) -> Result<MessageId, QueueError> {
        self.lock()?.record(QueueOperation::Send {
            body: body.to_string(),
            delay_seconds,
        });

        self.insert(body.to_string(), Duration::from_secs(delay_seconds))
    }

    fn queue_name(&self) -> &str {
        &self.config.queue_name
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::InMemory
    }
}
