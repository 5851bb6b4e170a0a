//! Queue provider implementations.
//!
//! This module contains concrete implementations of the `QueueClient` trait
//! for different queue backends.

pub mod memory;
pub mod sqs;

pub use memory::{InMemoryQueue, QueueOperation};
pub use sqs::{SqsError, SqsQueue};
