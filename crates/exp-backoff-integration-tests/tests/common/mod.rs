//! Common test utilities for exp-backoff integration tests
//!
//! This module provides:
//! - A recording processor with a configurable verdict
//! - Metrics collectors that fail on demand
//! - Helpers for inspecting in-memory queue operations

use async_trait::async_trait;
use exp_backoff_core::{
    ConsumerConfig, ConsumerMetrics, CycleReport, MessageProcessor, QueueOperationKind, Verdict,
};
use exp_backoff_runtime::{InMemoryQueue, QueueOperation};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// Processors
// ============================================================================

/// Processor returning a fixed verdict and recording every body it sees
#[derive(Clone)]
#[allow(dead_code)]
pub struct RecordingProcessor {
    verdict: Verdict,
    bodies: Arc<Mutex<Vec<String>>>,
}

impl RecordingProcessor {
    #[allow(dead_code)]
    pub fn new(verdict: Verdict) -> Self {
        Self {
            verdict,
            bodies: Arc::new(Mutex::new(Vec::new())),
        }
    }

    #[allow(dead_code)]
    pub fn bodies(&self) -> Vec<String> {
        self.bodies.lock().unwrap().clone()
    }

    #[allow(dead_code)]
    pub fn call_count(&self) -> usize {
        self.bodies.lock().unwrap().len()
    }
}

#[async_trait]
impl MessageProcessor for RecordingProcessor {
    async fn process(&self, body: &str) -> Verdict {
        self.bodies.lock().unwrap().push(body.to_string());
        self.verdict.clone()
    }
}

// ============================================================================
// Metrics
// ============================================================================

/// Collector that panics on the first `failures` worker launches
#[allow(dead_code)]
pub struct FlakyMetrics {
    failures: u32,
    launches: AtomicU32,
    pub restarts: AtomicU64,
}

impl FlakyMetrics {
    #[allow(dead_code)]
    pub fn new(failures: u32) -> Self {
        Self {
            failures,
            launches: AtomicU32::new(0),
            restarts: AtomicU64::new(0),
        }
    }
}

impl ConsumerMetrics for FlakyMetrics {
    fn record_worker_launched(&self, _in_flight: usize) {
        if self.launches.fetch_add(1, Ordering::SeqCst) < self.failures {
            panic!("collector unavailable");
        }
    }

    fn record_cycle(&self, _report: &CycleReport) {}

    fn record_empty_poll(&self) {}

    fn record_queue_failure(&self, _operation: QueueOperationKind, _is_transient: bool) {}

    fn record_processor_panic(&self) {}

    fn record_supervisor_restart(&self, restart_count: u64) {
        self.restarts.store(restart_count, Ordering::SeqCst);
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Consumer settings with a short empty-poll pause
#[allow(dead_code)]
pub fn fast_config(queue: &str, factor: u32, concurrency: usize) -> ConsumerConfig {
    ConsumerConfig {
        empty_poll_pause_ms: 10,
        ..ConsumerConfig::new(queue, factor, concurrency)
    }
}

/// Poll `condition` until it holds, failing the test after ten seconds
#[allow(dead_code)]
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[allow(dead_code)]
pub fn sends(queue: &InMemoryQueue) -> Vec<(String, u64)> {
    queue
        .operations()
        .into_iter()
        .filter_map(|op| match op {
            QueueOperation::Send {
                body,
                delay_seconds,
            } => Some((body, delay_seconds)),
            _ => None,
        })
        .collect()
}

#[allow(dead_code)]
pub fn deletes(queue: &InMemoryQueue) -> usize {
    queue
        .operations()
        .iter()
        .filter(|op| matches!(op, QueueOperation::Delete { .. }))
        .count()
}
