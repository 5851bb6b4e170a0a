//! Caller-supplied processing logic and its per-message verdict.

use async_trait::async_trait;

#[cfg(test)]
#[path = "processor_tests.rs"]
mod tests;

/// What the worker should do with a message after processing it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Leave the message alone; the queue redelivers it after its visibility timeout
    Failed,

    /// Acknowledge (delete) the message
    Completed,

    /// Enqueue `body` again after a delay derived from `retry_count`
    Reschedule { body: String, retry_count: u32 },
}

impl Verdict {
    /// Build a verdict from the `(ok, reschedule_body, retry_count)` triple
    ///
    /// A successful result with an empty body means there is nothing to
    /// reschedule, so the message is completed.
    pub fn from_parts(ok: bool, reschedule_body: impl Into<String>, retry_count: u32) -> Self {
        if !ok {
            return Self::Failed;
        }

        Self::reschedule(reschedule_body, retry_count)
    }

    /// Reschedule `body`; an empty body completes the message instead
    pub fn reschedule(body: impl Into<String>, retry_count: u32) -> Self {
        let body = body.into();
        if body.is_empty() {
            Self::Completed
        } else {
            Self::Reschedule { body, retry_count }
        }
    }

    /// The verdict the worker acts on
    ///
    /// `Reschedule` with an empty body has nothing to enqueue and completes
    /// the message, however it was constructed.
    pub fn into_effective(self) -> Self {
        match self {
            Self::Reschedule { body, .. } if body.is_empty() => Self::Completed,
            other => other,
        }
    }

    /// Whether processing succeeded
    pub fn is_ok(&self) -> bool {
        !matches!(self, Self::Failed)
    }
}

/// Processes one message body at a time
///
/// Invoked once per received message, sequentially within a worker and
/// concurrently across workers. Any `Fn(&str) -> Verdict` closure that is
/// `Send + Sync` is a processor.
///
/// A panic inside `process` is caught by the worker and treated as
/// [`Verdict::Failed`].
#[async_trait]
pub trait MessageProcessor: Send + Sync {
    async fn process(&self, body: &str) -> Verdict;
}

#[async_trait]
impl<F> MessageProcessor for F
where
    F: Fn(&str) -> Verdict + Send + Sync,
{
    async fn process(&self, body: &str) -> Verdict {
        self(body)
    }
}
