//! Metrics collection for the consumer.
//!
//! The consumer reports what it does through the [`ConsumerMetrics`] trait so
//! that the embedding application decides how (and whether) to export it.
//!
//! # Best-Effort Pattern
//!
//! Recording methods are infallible and take `&self`. A collector that
//! panics inside the control loop is treated like any other control-loop
//! fault: the supervisor logs it and restarts the loop.
//!
//! # Examples
//!
//! ```rust
//! use exp_backoff_core::monitoring::{ConsumerMetrics, StatsMetrics};
//!
//! let metrics = StatsMetrics::default();
//! metrics.record_empty_poll();
//!
//! assert_eq!(metrics.snapshot().empty_polls, 1);
//! ```

use crate::worker::CycleReport;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(test)]
#[path = "monitoring_tests.rs"]
mod tests;

/// Queue call that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueOperationKind {
    Receive,
    Delete,
    Send,
}

impl QueueOperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Receive => "receive",
            Self::Delete => "delete",
            Self::Send => "send",
        }
    }
}

impl fmt::Display for QueueOperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metrics collector for consumer activity.
///
/// # Thread Safety
///
/// Shared as `Arc<dyn ConsumerMetrics>` between the control loop and every
/// worker task; implementations must be thread-safe.
pub trait ConsumerMetrics: Send + Sync {
    /// A worker was launched; `in_flight` counts it
    fn record_worker_launched(&self, in_flight: usize);

    /// A worker cycle finished and released its slot
    fn record_cycle(&self, report: &CycleReport);

    /// A receive returned no messages
    fn record_empty_poll(&self);

    /// A queue call failed
    fn record_queue_failure(&self, operation: QueueOperationKind, is_transient: bool);

    /// The processor panicked on a message
    fn record_processor_panic(&self);

    /// The supervisor restarted the control loop; `restart_count` includes this restart
    fn record_supervisor_restart(&self, restart_count: u64);
}

/// No-op metrics collector.
///
/// Silently ignores all calls; the default when no collector is supplied.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpMetrics;

impl ConsumerMetrics for NoOpMetrics {
    fn record_worker_launched(&self, _in_flight: usize) {}

    fn record_cycle(&self, _report: &CycleReport) {}

    fn record_empty_poll(&self) {}

    fn record_queue_failure(&self, _operation: QueueOperationKind, _is_transient: bool) {}

    fn record_processor_panic(&self) {}

    fn record_supervisor_restart(&self, _restart_count: u64) {}
}

/// Point-in-time totals from a [`StatsMetrics`] collector
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConsumerStats {
    pub workers_launched: u64,
    pub peak_in_flight: u64,
    pub cycles: u64,
    pub messages_received: u64,
    pub completed: u64,
    pub rescheduled: u64,
    pub failed: u64,
    pub empty_polls: u64,
    pub receive_failures: u64,
    pub delete_failures: u64,
    pub send_failures: u64,
    pub processor_panics: u64,
    pub supervisor_restarts: u64,
}

/// In-process counters, readable through [`StatsMetrics::snapshot`]
#[derive(Debug, Default)]
pub struct StatsMetrics {
    workers_launched: AtomicU64,
    peak_in_flight: AtomicU64,
    cycles: AtomicU64,
    messages_received: AtomicU64,
    completed: AtomicU64,
    rescheduled: AtomicU64,
    failed: AtomicU64,
    empty_polls: AtomicU64,
    receive_failures: AtomicU64,
    delete_failures: AtomicU64,
    send_failures: AtomicU64,
    processor_panics: AtomicU64,
    supervisor_restarts: AtomicU64,
}

impl StatsMetrics {
    pub fn snapshot(&self) -> ConsumerStats {
        let read = |counter: &AtomicU64| counter.load(Ordering::Relaxed);

        ConsumerStats {
            workers_launched: read(&self.workers_launched),
            peak_in_flight: read(&self.peak_in_flight),
            cycles: read(&self.cycles),
            messages_received: read(&self.messages_received),
            completed: read(&self.completed),
            rescheduled: read(&self.rescheduled),
            failed: read(&self.failed),
            empty_polls: read(&self.empty_polls),
            receive_failures: read(&self.receive_failures),
            delete_failures: read(&self.delete_failures),
            send_failures: read(&self.send_failures),
            processor_panics: read(&self.processor_panics),
            supervisor_restarts: read(&self.supervisor_restarts),
        }
    }
}

fn add(counter: &AtomicU64, amount: usize) {
    counter.fetch_add(amount as u64, Ordering::Relaxed);
}

impl ConsumerMetrics for StatsMetrics {
    fn record_worker_launched(&self, in_flight: usize) {
        add(&self.workers_launched, 1);
        self.peak_in_flight
            .fetch_max(in_flight as u64, Ordering::Relaxed);
    }

    fn record_cycle(&self, report: &CycleReport) {
        add(&self.cycles, 1);
        add(&self.messages_received, report.received);
        add(&self.completed, report.completed);
        add(&self.rescheduled, report.rescheduled);
        add(&self.failed, report.failed);
    }

    fn record_empty_poll(&self) {
        add(&self.empty_polls, 1);
    }

    fn record_queue_failure(&self, operation: QueueOperationKind, _is_transient: bool) {
        let counter = match operation {
            QueueOperationKind::Receive => &self.receive_failures,
            QueueOperationKind::Delete => &self.delete_failures,
            QueueOperationKind::Send => &self.send_failures,
        };
        add(counter, 1);
    }

    fn record_processor_panic(&self) {
        add(&self.processor_panics, 1);
    }

    fn record_supervisor_restart(&self, _restart_count: u64) {
        add(&self.supervisor_restarts, 1);
    }
}
