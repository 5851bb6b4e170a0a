//! # exp-backoff runtime
//!
//! Queue abstraction used by the exp-backoff consumer, together with the
//! providers that implement it.
//!
//! This library provides:
//! - The [`QueueClient`] trait: receive a batch, delete by receipt, send with a delay
//! - Message, receipt and identifier types
//! - An in-memory provider for tests and local development
//! - An AWS SQS provider speaking the SQS query API over HTTP
//!
//! ## Module Organization
//!
//! - [`error`] - Error types for all queue operations
//! - [`message`] - Message structures and receipt handles
//! - [`provider`] - Provider types and configuration
//! - [`client`] - The client trait and factory
//! - [`providers`] - Concrete provider implementations

pub mod client;
pub mod error;
pub mod message;
pub mod provider;
pub mod providers;

// Re-export commonly used types at crate root for convenience
pub use client::{QueueClient, QueueClientFactory};
pub use error::{ConfigurationError, QueueError, SerializationError, ValidationError};
pub use message::{MessageId, QueueMessage, QueueName, ReceiptHandle};
pub use provider::{AwsSqsConfig, InMemoryConfig, ProviderType, QueueConfig};
pub use providers::{InMemoryQueue, QueueOperation, SqsQueue};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
