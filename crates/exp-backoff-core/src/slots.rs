//! Admission control for worker cycles.
//!
//! A [`SlotPool`] holds a fixed number of tickets. The consumer takes a
//! ticket before launching a worker and the worker gives it back when its
//! cycle ends. Tickets are RAII guards: dropping one releases it, so a ticket
//! cannot be released twice or without having been acquired, and a panicking
//! worker still gives its slot back.

use crate::error::ConsumerError;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[cfg(test)]
#[path = "slots_tests.rs"]
mod tests;

/// Fixed-capacity pool of worker slots
#[derive(Clone)]
pub struct SlotPool {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl SlotPool {
    /// Largest pool that can still be drained in a single acquisition
    pub const MAX_CAPACITY: usize = if Semaphore::MAX_PERMITS < u32::MAX as usize {
        Semaphore::MAX_PERMITS
    } else {
        u32::MAX as usize
    };

    /// Create a pool with `capacity` tickets
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` when `capacity` is zero or above [`Self::MAX_CAPACITY`].
    pub fn new(capacity: usize) -> Result<Self, ConsumerError> {
        if capacity == 0 || capacity > Self::MAX_CAPACITY {
            return Err(ConsumerError::invalid_config(format!(
                "slot pool capacity must be between 1 and {}, got {}",
                Self::MAX_CAPACITY,
                capacity
            )));
        }

        Ok(Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        })
    }

    /// Wait for a free ticket
    ///
    /// # Errors
    ///
    /// Returns `SlotPoolClosed` once the pool has been closed, including for
    /// callers already waiting when it closes.
    pub async fn acquire(&self) -> Result<SlotTicket, ConsumerError> {
        Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map(|permit| SlotTicket { _permit: permit })
            .map_err(|_| ConsumerError::SlotPoolClosed)
    }

    /// Take a ticket only if one is free right now
    pub fn try_acquire(&self) -> Option<SlotTicket> {
        Arc::clone(&self.semaphore)
            .try_acquire_owned()
            .ok()
            .map(|permit| SlotTicket { _permit: permit })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Tickets not currently held
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Tickets currently held
    pub fn in_flight(&self) -> usize {
        self.capacity.saturating_sub(self.available())
    }

    /// Wake every waiter with `SlotPoolClosed` and refuse new acquisitions
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }

    /// Wait until every outstanding ticket has been returned, then close
    ///
    /// # Errors
    ///
    /// Returns `SlotPoolClosed` if the pool was closed before the drain completed.
    pub async fn drain_and_close(&self) -> Result<(), ConsumerError> {
        let all = u32::try_from(self.capacity).unwrap_or(u32::MAX);
        let _all_tickets = self
            .semaphore
            .acquire_many(all)
            .await
            .map_err(|_| ConsumerError::SlotPoolClosed)?;

        self.semaphore.close();
        Ok(())
    }
}

impl fmt::Debug for SlotPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotPool")
            .field("capacity", &self.capacity)
            .field("available", &self.available())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// A held worker slot, released on drop
#[must_use = "the slot is released as soon as the ticket is dropped"]
pub struct SlotTicket {
    _permit: OwnedSemaphorePermit,
}

impl fmt::Debug for SlotTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SlotTicket")
    }
}
