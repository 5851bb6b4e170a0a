//! Client trait and factory for queue operations.

use crate::error::QueueError;
use crate::message::{MessageId, QueueMessage, ReceiptHandle};
use crate::provider::{ProviderType, QueueConfig};
use crate::providers::{InMemoryQueue, SqsError, SqsQueue};
use async_trait::async_trait;
use std::sync::Arc;

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;

/// The three queue operations the consumer relies on
///
/// Implementations are shared between concurrently running workers and must
/// therefore be safe for concurrent use.
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Receive up to `max_messages` messages; an empty batch is not an error
    async fn receive_messages(&self, max_messages: u32) -> Result<Vec<QueueMessage>, QueueError>;

    /// Acknowledge a message so it is never redelivered
    async fn delete_message(&self, receipt: &ReceiptHandle) -> Result<(), QueueError>;

    /// Enqueue a new message that becomes visible after `delay_seconds`
    async fn send_message(&self, body: &str, delay_seconds: u64) -> Result<MessageId, QueueError>;

    /// Queue identity, used in log output
    fn queue_name(&self) -> &str;

    /// Get provider type
    fn provider_type(&self) -> ProviderType;
}

/// Factory for creating queue clients from configuration
pub struct QueueClientFactory;

impl QueueClientFactory {
    /// Create queue client from configuration
    pub async fn create_client(config: QueueConfig) -> Result<Arc<dyn QueueClient>, QueueError> {
        let client: Arc<dyn QueueClient> = match config {
            QueueConfig::InMemory(memory_config) => Arc::new(InMemoryQueue::new(memory_config)),
            QueueConfig::AwsSqs(sqs_config) => {
                let queue = SqsQueue::connect(sqs_config)
                    .await
                    .map_err(SqsError::to_queue_error)?;
                Arc::new(queue)
            }
        };

        tracing::debug!(
            queue = client.queue_name(),
            provider = %client.provider_type(),
            "Created queue client"
        );

        Ok(client)
    }

    /// Create test client with in-memory provider
    pub fn create_test_client() -> Arc<InMemoryQueue> {
        Arc::new(InMemoryQueue::default())
    }
}
