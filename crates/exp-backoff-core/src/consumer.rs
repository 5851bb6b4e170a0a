//! The supervised consumer.
//!
//! # Lifecycle
//!
//! ```text
//! NotStarted --start()--> Running --shutdown()--> Stopping --> Stopped
//! ```
//!
//! `start()` moves `NotStarted` to `Running` with a compare-and-swap, so only
//! the first call launches anything; later calls while running return
//! `Ok(false)`.
//!
//! # Control loop
//!
//! While running, the control loop takes a [`SlotPool`] ticket, launches a
//! worker task with it and immediately goes back for the next ticket. It never
//! waits for a worker, so at most `concurrency` cycles are in flight and a new
//! one starts as soon as any finishes.
//!
//! # Crash barrier
//!
//! The control loop runs in its own task. The supervisor task awaits it and,
//! if it panicked, logs the panic payload and spawns a fresh control loop.
//! A consumer never dies silently while it is running.
//!
//! The control loop lives only as long as its [`Consumer`]: dropping a
//! running consumer stops launching workers and logs the stop at `info`.
//! Keep the consumer alive for as long as messages should be processed.

use crate::config::ConsumerConfig;
use crate::delay::DelayStrategy;
use crate::error::{panic_message, ConsumerError};
use crate::monitoring::{ConsumerMetrics, NoOpMetrics};
use crate::processor::MessageProcessor;
use crate::slots::SlotPool;
use crate::worker::Worker;
use exp_backoff_runtime::{QueueClient, QueueClientFactory, QueueConfig};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[cfg(test)]
#[path = "consumer_tests.rs"]
mod tests;

// ============================================================================
// State
// ============================================================================

/// Lifecycle state of a [`Consumer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConsumerState {
    NotStarted = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

impl ConsumerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::NotStarted,
            1 => Self::Running,
            2 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

impl fmt::Display for ConsumerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotStarted => "not_started",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// State shared between the consumer handle, the supervisor and the control loop
struct Shared {
    config: ConsumerConfig,
    queue_name: String,
    worker: Worker,
    slots: SlotPool,
    metrics: Arc<dyn ConsumerMetrics>,
    state: AtomicU8,
    restarts: AtomicU64,
    shutdown: watch::Sender<bool>,
}

impl Shared {
    fn state(&self) -> ConsumerState {
        ConsumerState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn transition(&self, from: ConsumerState, to: ConsumerState) -> Result<(), ConsumerState> {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(ConsumerState::from_u8)
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Assembles a [`Consumer`] with optional collaborators
pub struct ConsumerBuilder {
    config: ConsumerConfig,
    queue: Arc<dyn QueueClient>,
    processor: Arc<dyn MessageProcessor>,
    delay: Option<Arc<dyn DelayStrategy>>,
    metrics: Arc<dyn ConsumerMetrics>,
}

impl ConsumerBuilder {
    /// Replace the exponential delay derived from the configuration
    pub fn delay_strategy(mut self, delay: Arc<dyn DelayStrategy>) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn metrics(mut self, metrics: Arc<dyn ConsumerMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Validate the configuration and build the consumer
    pub fn build(self) -> Result<Consumer, ConsumerError> {
        self.config.validate()?;

        let slots = SlotPool::new(self.config.concurrency)?;
        let delay = self
            .delay
            .unwrap_or_else(|| Arc::new(self.config.delay_strategy()));
        let worker = Worker::new(
            &self.config,
            Arc::clone(&self.queue),
            self.processor,
            delay,
            Arc::clone(&self.metrics),
        );
        let (shutdown, _) = watch::channel(false);

        Ok(Consumer {
            shared: Arc::new(Shared {
                queue_name: self.queue.queue_name().to_string(),
                config: self.config,
                worker,
                slots,
                metrics: self.metrics,
                state: AtomicU8::new(ConsumerState::NotStarted as u8),
                restarts: AtomicU64::new(0),
                shutdown,
            }),
            supervisor: Mutex::new(None),
        })
    }
}

// ============================================================================
// Consumer
// ============================================================================

/// Bounded-concurrency queue consumer with a self-healing control loop
///
/// Dropping a running consumer stops its control loop; workers already in
/// flight finish their cycle. Use [`Consumer::shutdown`] to wait for them.
pub struct Consumer {
    shared: Arc<Shared>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl Consumer {
    /// Consumer with the default delay strategy and no metrics
    pub fn new(
        config: ConsumerConfig,
        queue: Arc<dyn QueueClient>,
        processor: Arc<dyn MessageProcessor>,
    ) -> Result<Self, ConsumerError> {
        Self::builder(config, queue, processor).build()
    }

    pub fn builder(
        config: ConsumerConfig,
        queue: Arc<dyn QueueClient>,
        processor: Arc<dyn MessageProcessor>,
    ) -> ConsumerBuilder {
        ConsumerBuilder {
            config,
            queue,
            processor,
            delay: None,
            metrics: Arc::new(NoOpMetrics),
        }
    }

    /// Create the queue client from `queue_config` and build a consumer on it
    pub async fn connect(
        config: ConsumerConfig,
        queue_config: QueueConfig,
        processor: Arc<dyn MessageProcessor>,
    ) -> Result<Self, ConsumerError> {
        let queue = QueueClientFactory::create_client(queue_config).await?;
        Self::new(config, queue, processor)
    }

    /// Launch the supervisor
    ///
    /// Returns `Ok(true)` when this call started the consumer and `Ok(false)`
    /// when it was already running. The consumer then runs until
    /// [`Consumer::shutdown`] is called or the consumer is dropped.
    ///
    /// # Errors
    ///
    /// - `NoRuntime` when called outside a tokio runtime
    /// - `AlreadyStopped` once `shutdown` has been called
    pub fn start(&self) -> Result<bool, ConsumerError> {
        let runtime = Handle::try_current().map_err(|_| ConsumerError::NoRuntime)?;

        match self
            .shared
            .transition(ConsumerState::NotStarted, ConsumerState::Running)
        {
            Ok(()) => {}
            Err(ConsumerState::Running) => return Ok(false),
            Err(_) => return Err(ConsumerError::AlreadyStopped),
        }

        let handle = runtime.spawn(supervise(Arc::clone(&self.shared)));
        *self
            .supervisor
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);

        info!(
            queue = %self.shared.queue_name,
            factor = self.shared.config.factor,
            concurrency = self.shared.config.concurrency,
            "Consumer started"
        );
        Ok(true)
    }

    /// Stop launching workers and wait for in-flight cycles to finish
    ///
    /// Calling this more than once, or on a consumer that never started, is
    /// harmless. A stopped consumer cannot be started again.
    ///
    /// # Errors
    ///
    /// Returns `SlotPoolClosed` if the slot pool was closed while draining.
    pub async fn shutdown(&self) -> Result<(), ConsumerError> {
        loop {
            match self
                .shared
                .transition(ConsumerState::Running, ConsumerState::Stopping)
            {
                Ok(()) => break,
                Err(ConsumerState::NotStarted) => {
                    if self
                        .shared
                        .transition(ConsumerState::NotStarted, ConsumerState::Stopped)
                        .is_ok()
                    {
                        self.shared.shutdown.send_replace(true);
                        self.shared.slots.close();
                        return Ok(());
                    }
                    // Lost a race with start(); stop the now running consumer
                }
                Err(_) => return Ok(()),
            }
        }

        info!(queue = %self.shared.queue_name, "Consumer stopping");
        self.shared.shutdown.send_replace(true);

        let supervisor = self
            .supervisor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = supervisor {
            if let Err(e) = handle.await {
                warn!(queue = %self.shared.queue_name, error = %e, "Supervisor task ended abnormally");
            }
        }

        debug!(
            queue = %self.shared.queue_name,
            in_flight = self.shared.slots.in_flight(),
            "Waiting for in-flight workers"
        );
        let drained = self.shared.slots.drain_and_close().await;

        self.shared
            .state
            .store(ConsumerState::Stopped as u8, Ordering::Release);
        info!(queue = %self.shared.queue_name, "Consumer stopped");

        drained
    }

    pub fn state(&self) -> ConsumerState {
        self.shared.state()
    }

    /// Number of times the supervisor restarted a crashed control loop
    pub fn restart_count(&self) -> u64 {
        self.shared.restarts.load(Ordering::Acquire)
    }

    /// Worker cycles currently holding a slot
    pub fn in_flight(&self) -> usize {
        self.shared.slots.in_flight()
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.shared.config
    }

    pub fn queue_name(&self) -> &str {
        &self.shared.queue_name
    }
}

impl fmt::Debug for Consumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("queue", &self.shared.queue_name)
            .field("state", &self.state())
            .field("slots", &self.shared.slots)
            .field("restarts", &self.restart_count())
            .finish()
    }
}

impl Drop for Consumer {
    // Stops the control loop; in-flight workers finish their cycle on their own.
    fn drop(&mut self) {
        let already_requested = self.shared.shutdown.send_replace(true);
        if !already_requested && self.state() == ConsumerState::Running {
            info!(
                queue = %self.shared.queue_name,
                in_flight = self.in_flight(),
                "Consumer dropped while running; control loop stopping"
            );
        }
    }
}

// ============================================================================
// Supervisor and Control Loop
// ============================================================================

async fn supervise(shared: Arc<Shared>) {
    loop {
        let control = tokio::spawn(control_loop(Arc::clone(&shared)));

        match control.await {
            Ok(()) => {
                debug!(queue = %shared.queue_name, "Control loop exited");
                break;
            }
            Err(e) if e.is_panic() => {
                let restarts = shared.restarts.fetch_add(1, Ordering::AcqRel) + 1;
                let payload = panic_message(e.into_panic().as_ref());
                error!(
                    queue = %shared.queue_name,
                    restarts,
                    panic = %payload,
                    "Control loop panicked; restarting"
                );

                // A collector that panics here must not take the supervisor down too
                let metrics = Arc::clone(&shared.metrics);
                let recorded = std::panic::catch_unwind(AssertUnwindSafe(|| {
                    metrics.record_supervisor_restart(restarts)
                }));
                if recorded.is_err() {
                    warn!(queue = %shared.queue_name, "Metrics collector panicked recording restart");
                }
            }
            Err(e) => {
                warn!(queue = %shared.queue_name, error = %e, "Control loop cancelled");
                break;
            }
        }

        if shared.shutdown_requested() {
            break;
        }

        let delay = shared.config.restart_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

async fn control_loop(shared: Arc<Shared>) {
    let mut shutdown = shared.shutdown.subscribe();

    loop {
        if *shutdown.borrow_and_update() {
            break;
        }

        let ticket = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            ticket = shared.slots.acquire() => match ticket {
                Ok(ticket) => ticket,
                Err(_) => break,
            },
        };

        shared.metrics.record_worker_launched(shared.slots.in_flight());

        let worker = shared.worker.clone();
        tokio::spawn(async move {
            worker.run_cycle(ticket).await;
        });
    }
}
