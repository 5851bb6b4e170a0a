//! Scheduling delay for rescheduled messages.
//!
//! The delay for a message rescheduled at retry count `r` is `factor^r`
//! seconds, so with a factor of 3 successive retries wait 1, 3, 9, 27, ...
//! seconds. The result saturates at `u64::MAX` instead of overflowing.
//!
//! Neither a ceiling nor jitter is applied unless asked for: callers that
//! want one either set [`ExponentialDelay::with_max_delay`] or supply their
//! own [`DelayStrategy`].

use std::fmt;

#[cfg(test)]
#[path = "delay_tests.rs"]
mod tests;

/// Compute `factor ^ retry_count` in whole seconds, saturating on overflow
pub fn exponential_delay(factor: u32, retry_count: u32) -> u64 {
    u64::from(factor).saturating_pow(retry_count)
}

/// Maps a processor-supplied retry count to a delay in seconds
pub trait DelayStrategy: Send + Sync + fmt::Debug {
    fn delay_seconds(&self, retry_count: u32) -> u64;
}

/// `factor ^ retry_count`, optionally capped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialDelay {
    factor: u32,
    max_delay_seconds: Option<u64>,
}

impl ExponentialDelay {
    /// Uncapped exponential delay with the given factor
    pub fn new(factor: u32) -> Self {
        Self {
            factor,
            max_delay_seconds: None,
        }
    }

    /// Never return more than `max_delay_seconds`
    pub fn with_max_delay(mut self, max_delay_seconds: u64) -> Self {
        self.max_delay_seconds = Some(max_delay_seconds);
        self
    }

    pub fn factor(&self) -> u32 {
        self.factor
    }

    pub fn max_delay_seconds(&self) -> Option<u64> {
        self.max_delay_seconds
    }
}

impl DelayStrategy for ExponentialDelay {
    fn delay_seconds(&self, retry_count: u32) -> u64 {
        let delay = exponential_delay(self.factor, retry_count);
        match self.max_delay_seconds {
            Some(max) => delay.min(max),
            None => delay,
        }
    }
}
