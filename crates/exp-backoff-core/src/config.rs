//! Consumer configuration.

use crate::delay::ExponentialDelay;
use crate::error::ConsumerError;
use crate::slots::SlotPool;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

/// How a rescheduled message's original copy is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RescheduleAck {
    /// Send the new message and leave the original untouched; the queue
    /// redelivers it once its visibility timeout expires
    #[default]
    LeaveOriginal,

    /// Delete the original, but only after the new message was sent
    DeleteOriginal,
}

/// Immutable settings for one consumer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    /// Queue identity (an SQS queue URL or name)
    pub queue: String,

    /// Base of the exponential delay, at least 1
    pub factor: u32,

    /// Maximum number of concurrent worker cycles, at least 1
    pub concurrency: usize,

    /// Messages requested per receive call
    pub batch_size: u32,

    /// Pause after a receive that returned no messages
    pub empty_poll_pause_ms: u64,

    /// Optional ceiling on the computed delay; unset means uncapped
    pub max_delay_seconds: Option<u64>,

    pub reschedule_ack: RescheduleAck,

    /// Pause before the supervisor restarts a crashed control loop
    pub restart_delay_ms: u64,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            queue: String::new(),
            factor: 3,
            concurrency: 1,
            batch_size: 10,
            empty_poll_pause_ms: 1000,
            max_delay_seconds: None,
            reschedule_ack: RescheduleAck::default(),
            restart_delay_ms: 0,
        }
    }
}

impl ConsumerConfig {
    /// Configuration for `queue` with the given factor and concurrency; other
    /// settings take their defaults
    pub fn new(queue: impl Into<String>, factor: u32, concurrency: usize) -> Self {
        Self {
            queue: queue.into(),
            factor,
            concurrency,
            ..Self::default()
        }
    }

    /// Check every setting is within range
    pub fn validate(&self) -> Result<(), ConsumerError> {
        if self.queue.trim().is_empty() {
            return Err(ConsumerError::invalid_config("queue must not be empty"));
        }

        if self.factor == 0 {
            return Err(ConsumerError::invalid_config("factor must be at least 1"));
        }

        if self.concurrency == 0 || self.concurrency > SlotPool::MAX_CAPACITY {
            return Err(ConsumerError::invalid_config(format!(
                "concurrency must be between 1 and {}, got {}",
                SlotPool::MAX_CAPACITY,
                self.concurrency
            )));
        }

        if self.batch_size == 0 {
            return Err(ConsumerError::invalid_config("batch_size must be at least 1"));
        }

        Ok(())
    }

    /// Delay strategy described by `factor` and `max_delay_seconds`
    pub fn delay_strategy(&self) -> ExponentialDelay {
        let strategy = ExponentialDelay::new(self.factor);
        match self.max_delay_seconds {
            Some(max) => strategy.with_max_delay(max),
            None => strategy,
        }
    }

    pub fn empty_poll_pause(&self) -> Duration {
        Duration::from_millis(self.empty_poll_pause_ms)
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }
}
