//! One receive/process/acknowledge cycle.
//!
//! A worker owns a [`SlotTicket`] for the duration of its cycle:
//!
//! 1. Receive up to `batch_size` messages. A failed receive is logged and the
//!    cycle ends.
//! 2. An empty batch pauses for `empty_poll_pause` before the cycle ends, so an
//!    idle queue is not polled in a tight loop.
//! 3. Each message is handed to the processor in turn and its [`Verdict`]
//!    applied: `Failed` leaves the message alone, `Completed` deletes it and
//!    `Reschedule` sends the new body with a delay from the [`DelayStrategy`].
//!    Queue errors are logged and the next message is processed.
//!
//! The ticket is released when the cycle ends, whichever way it ends.

use crate::config::{ConsumerConfig, RescheduleAck};
use crate::delay::DelayStrategy;
use crate::error::panic_message;
use crate::monitoring::{ConsumerMetrics, QueueOperationKind};
use crate::processor::{MessageProcessor, Verdict};
use crate::slots::SlotTicket;
use exp_backoff_runtime::{QueueClient, QueueError, QueueMessage};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;

/// Outcome counts for one worker cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub received: usize,
    pub completed: usize,
    pub rescheduled: usize,
    /// Messages left unacknowledged, including processor panics
    pub failed: usize,
    pub panicked: usize,
    /// Receive, delete and send calls that returned an error
    pub queue_errors: usize,
}

impl CycleReport {
    /// The receive succeeded and returned nothing
    pub fn is_empty_poll(&self) -> bool {
        self.received == 0 && self.queue_errors == 0
    }
}

/// Runs worker cycles against one queue
///
/// Cheap to clone; every clone shares the same queue, processor and metrics.
#[derive(Clone)]
pub struct Worker {
    queue: Arc<dyn QueueClient>,
    processor: Arc<dyn MessageProcessor>,
    delay: Arc<dyn DelayStrategy>,
    metrics: Arc<dyn ConsumerMetrics>,
    batch_size: u32,
    empty_poll_pause: Duration,
    reschedule_ack: RescheduleAck,
}

impl Worker {
    pub fn new(
        config: &ConsumerConfig,
        queue: Arc<dyn QueueClient>,
        processor: Arc<dyn MessageProcessor>,
        delay: Arc<dyn DelayStrategy>,
        metrics: Arc<dyn ConsumerMetrics>,
    ) -> Self {
        Self {
            queue,
            processor,
            delay,
            metrics,
            batch_size: config.batch_size,
            empty_poll_pause: config.empty_poll_pause(),
            reschedule_ack: config.reschedule_ack,
        }
    }

    /// Run one cycle, releasing `ticket` when it ends
    pub async fn run_cycle(&self, ticket: SlotTicket) -> CycleReport {
        let report = self.cycle().await;
        self.metrics.record_cycle(&report);

        drop(ticket);
        report
    }

    async fn cycle(&self) -> CycleReport {
        let mut report = CycleReport::default();

        let messages = match self.queue.receive_messages(self.batch_size).await {
            Ok(messages) => messages,
            Err(e) => {
                error!(
                    queue = self.queue.queue_name(),
                    error = %e,
                    "Unable to receive messages"
                );
                report.queue_errors += 1;
                self.record_failure(QueueOperationKind::Receive, &e);
                return report;
            }
        };

        if messages.is_empty() {
            self.metrics.record_empty_poll();
            tokio::time::sleep(self.empty_poll_pause).await;
            return report;
        }

        report.received = messages.len();
        debug!(
            queue = self.queue.queue_name(),
            count = messages.len(),
            "Received batch"
        );

        for message in &messages {
            let verdict = self.process(message, &mut report).await;
            self.apply(message, verdict, &mut report).await;
        }

        report
    }

    async fn process(&self, message: &QueueMessage, report: &mut CycleReport) -> Verdict {
        match AssertUnwindSafe(self.processor.process(&message.body))
            .catch_unwind()
            .await
        {
            Ok(verdict) => verdict,
            Err(payload) => {
                error!(
                    queue = self.queue.queue_name(),
                    message_id = %message.message_id,
                    panic = %panic_message(payload.as_ref()),
                    "Processor panicked; leaving message unacknowledged"
                );
                report.panicked += 1;
                self.metrics.record_processor_panic();
                Verdict::Failed
            }
        }
    }

    async fn apply(&self, message: &QueueMessage, verdict: Verdict, report: &mut CycleReport) {
        match verdict.into_effective() {
            Verdict::Failed => {
                debug!(
                    message_id = %message.message_id,
                    receive_count = message.receive_count,
                    "Processing failed; message left for redelivery"
                );
                report.failed += 1;
            }
            Verdict::Completed => {
                if self.delete(message, report).await {
                    report.completed += 1;
                }
            }
            Verdict::Reschedule { body, retry_count } => {
                let delay_seconds = self.delay.delay_seconds(retry_count);
                match self.queue.send_message(&body, delay_seconds).await {
                    Ok(message_id) => {
                        debug!(
                            original_id = %message.message_id,
                            message_id = %message_id,
                            retry_count,
                            delay_seconds,
                            "Rescheduled message"
                        );
                        report.rescheduled += 1;

                        if self.reschedule_ack == RescheduleAck::DeleteOriginal {
                            self.delete(message, report).await;
                        }
                    }
                    Err(e) => {
                        warn!(
                            queue = self.queue.queue_name(),
                            message_id = %message.message_id,
                            retry_count,
                            delay_seconds,
                            error = %e,
                            "Unable to reschedule message"
                        );
                        report.queue_errors += 1;
                        self.record_failure(QueueOperationKind::Send, &e);
                    }
                }
            }
        }
    }

    /// Delete `message`, returning whether the delete succeeded
    async fn delete(&self, message: &QueueMessage, report: &mut CycleReport) -> bool {
        match self.queue.delete_message(&message.receipt_handle).await {
            Ok(()) => {
                debug!(message_id = %message.message_id, "Deleted message");
                true
            }
            Err(e) => {
                warn!(
                    queue = self.queue.queue_name(),
                    message_id = %message.message_id,
                    receipt = ?message.receipt_handle,
                    error = %e,
                    "Unable to delete message"
                );
                report.queue_errors += 1;
                self.record_failure(QueueOperationKind::Delete, &e);
                false
            }
        }
    }

    fn record_failure(&self, operation: QueueOperationKind, error: &QueueError) {
        self.metrics
            .record_queue_failure(operation, error.is_transient());
    }
}
