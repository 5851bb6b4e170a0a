//! Integration tests for the supervisor's crash barrier
//!
//! These tests verify:
//! - A panicking control loop is restarted and processing continues
//! - Processor panics leave messages for redelivery without stopping the consumer
//! - Shutdown completes after restarts without leaking worker slots

mod common;

use common::{deletes, fast_config, wait_until, FlakyMetrics};
use exp_backoff_core::{Consumer, ConsumerState, StatsMetrics, Verdict};
use exp_backoff_runtime::{InMemoryConfig, InMemoryQueue};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_processing_resumes_after_control_loop_panics() {
    let queue = Arc::new(InMemoryQueue::default());
    for i in 0..5 {
        queue.enqueue(format!("job-{}", i)).await.unwrap();
    }
    let metrics = Arc::new(FlakyMetrics::new(4));
    let consumer = Consumer::builder(
        fast_config("jobs", 2, 2),
        queue.clone(),
        Arc::new(|_: &str| Verdict::Completed),
    )
    .metrics(metrics.clone())
    .build()
    .unwrap();

    consumer.start().unwrap();
    wait_until(|| queue.is_empty()).await;

    assert_eq!(consumer.state(), ConsumerState::Running);
    assert_eq!(consumer.restart_count(), 4);
    assert_eq!(metrics.restarts.load(Ordering::SeqCst), 4);
    assert_eq!(deletes(&queue), 5);

    tokio::time::timeout(Duration::from_secs(5), consumer.shutdown())
        .await
        .expect("shutdown should complete")
        .unwrap();
    assert_eq!(consumer.in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_processor_panic_leaves_message_for_redelivery() {
    let queue = Arc::new(InMemoryQueue::new(InMemoryConfig {
        queue_name: "jobs".to_string(),
        visibility_timeout_seconds: 2,
        ..InMemoryConfig::default()
    }));
    queue.enqueue("poison").await.unwrap();
    queue.enqueue("healthy").await.unwrap();
    let metrics = Arc::new(StatsMetrics::default());
    let consumer = Consumer::builder(
        fast_config("jobs", 2, 1),
        queue.clone(),
        Arc::new(|body: &str| {
            if body == "poison" {
                panic!("cannot handle {}", body);
            }
            Verdict::Completed
        }),
    )
    .metrics(metrics.clone())
    .build()
    .unwrap();

    consumer.start().unwrap();
    wait_until(|| metrics.snapshot().processor_panics >= 2).await;
    consumer.shutdown().await.unwrap();

    let stats = metrics.snapshot();
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.supervisor_restarts, 0);
    assert_eq!(consumer.restart_count(), 0);
    assert_eq!(queue.len(), 1);
}
