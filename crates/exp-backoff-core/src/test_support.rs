//! Shared queue doubles for unit tests.

use async_trait::async_trait;
use exp_backoff_runtime::{
    InMemoryQueue, MessageId, ProviderType, QueueClient, QueueError, QueueMessage, ReceiptHandle,
};
use std::sync::atomic::{AtomicBool, Ordering};

/// In-memory queue whose operations can be made to fail on demand
#[derive(Default)]
pub struct FlakyQueue {
    pub inner: InMemoryQueue,
    pub fail_receive: AtomicBool,
    pub fail_delete: AtomicBool,
    pub fail_send: AtomicBool,
}

impl FlakyQueue {
    pub fn set(flag: &AtomicBool, value: bool) {
        flag.store(value, Ordering::SeqCst);
    }
}

fn injected(operation: &str) -> QueueError {
    QueueError::ConnectionFailed {
        message: format!("injected {} failure", operation),
    }
}

#[async_trait]
impl QueueClient for FlakyQueue {
    async fn receive_messages(&self, max_messages: u32) -> Result<Vec<QueueMessage>, QueueError> {
        if self.fail_receive.load(Ordering::SeqCst) {
            return Err(injected("receive"));
        }
        self.inner.receive_messages(max_messages).await
    }

    async fn delete_message(&self, receipt: &ReceiptHandle) -> Result<(), QueueError> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(injected("delete"));
        }
        self.inner.delete_message(receipt).await
    }

    async fn send_message(&self, body: &str, delay_seconds: u64) -> Result<MessageId, QueueError> {
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(injected("send"));
        }
        self.inner.send_message(body, delay_seconds).await
    }

    fn queue_name(&self) -> &str {
        self.inner.queue_name()
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::InMemory
    }
}
