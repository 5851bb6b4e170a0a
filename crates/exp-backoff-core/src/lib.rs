//! # exp-backoff core
//!
//! A bounded-concurrency consumer that drains a message queue, hands every
//! message to caller-supplied processing logic, and re-enqueues retry-eligible
//! work with an exponentially increasing delay.
//!
//! The crate separates *how* a queue is drained safely from *what* is done
//! with each message:
//! - [`Consumer`] supervises a control loop that launches workers while a
//!   [`SlotPool`] ticket is available, and restarts the loop if it panics
//! - [`Worker`] runs one receive/process/acknowledge cycle
//! - [`MessageProcessor`] is the caller's logic, returning a [`Verdict`]
//! - [`DelayStrategy`] turns a retry count into a scheduling delay
//!
//! ## Usage
//!
//! ```no_run
//! use exp_backoff_core::{Consumer, ConsumerConfig, Verdict};
//! use exp_backoff_runtime::QueueClientFactory;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let queue = QueueClientFactory::create_test_client();
//! let processor = Arc::new(|body: &str| {
//!     if body.is_empty() {
//!         Verdict::Failed
//!     } else {
//!         Verdict::Completed
//!     }
//! });
//!
//! let consumer = Consumer::new(ConsumerConfig::new("jobs", 3, 4), queue, processor)?;
//! consumer.start()?;
//! // ...
//! consumer.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod consumer;
pub mod delay;
pub mod error;
pub mod monitoring;
pub mod processor;
pub mod slots;
pub mod worker;

pub use config::{ConsumerConfig, RescheduleAck};
pub use consumer::{Consumer, ConsumerBuilder, ConsumerState};
pub use delay::{exponential_delay, DelayStrategy, ExponentialDelay};
pub use error::ConsumerError;
pub use monitoring::{ConsumerMetrics, ConsumerStats, NoOpMetrics, QueueOperationKind, StatsMetrics};
pub use processor::{MessageProcessor, Verdict};
pub use slots::{SlotPool, SlotTicket};
pub use worker::{CycleReport, Worker};

#[cfg(test)]
mod test_support;
