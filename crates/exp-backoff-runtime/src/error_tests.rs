//! Tests for error types.

use super::*;

#[test]
fn test_error_transience() {
    assert!(QueueError::ConnectionFailed {
        message: "network error".to_string(),
    }
    .is_transient());

    assert!(QueueError::Timeout {
        duration: Duration::from_secs(30),
    }
    .is_transient());

    assert!(!QueueError::QueueNotFound {
        queue_name: "test".to_string(),
    }
    .is_transient());

    assert!(!QueueError::MessageTooLarge {
        size: 1000,
        max_size: 500
    }
    .is_transient());
}

#[test]
fn test_delay_out_of_range_is_permanent() {
    let error = QueueError::DelayOutOfRange {
        delay_seconds: 3125,
        max_seconds: 900,
    };

    assert!(!error.is_transient());
    assert_eq!(
        error.to_string(),
        "Delay of 3125s exceeds provider maximum of 900s"
    );
}

#[test]
fn test_nested_errors_convert_into_queue_error() {
    let error: QueueError = ValidationError::Required {
        field: "queue_name".to_string(),
    }
    .into();
    assert!(matches!(error, QueueError::ValidationError(_)));
    assert!(!error.is_transient());

    let error: QueueError = SerializationError::MissingElement {
        element: "MessageId".to_string(),
    }
    .into();
    assert!(error.to_string().contains("MessageId"));
}
