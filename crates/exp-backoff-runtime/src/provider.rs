//! Queue provider selection and per-provider settings.

use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};

/// Queue backend a client talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderType {
    AwsSqs,
    InMemory,
}

impl ProviderType {
    /// Maximum number of messages a single receive call may return
    pub fn max_batch_size(&self) -> u32 {
        match self {
            Self::AwsSqs => 10,
            Self::InMemory => 100,
        }
    }

    /// Maximum scheduling delay the provider accepts, if it has one
    pub fn max_delay_seconds(&self) -> Option<u64> {
        match self {
            Self::AwsSqs => Some(900), // 15 minutes
            Self::InMemory => None,
        }
    }

    /// Largest body, in bytes, the provider accepts
    pub fn max_message_size(&self) -> usize {
        match self {
            Self::AwsSqs => 256 * 1024,         // 256KB
            Self::InMemory => 10 * 1024 * 1024, // 10MB
        }
    }
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AwsSqs => write!(f, "aws_sqs"),
            Self::InMemory => write!(f, "in_memory"),
        }
    }
}

/// Settings for exactly one provider, tagged by `provider`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum QueueConfig {
    AwsSqs(AwsSqsConfig),
    InMemory(InMemoryConfig),
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self::InMemory(InMemoryConfig::default())
    }
}

impl QueueConfig {
    /// Provider selected by this configuration
    pub fn provider_type(&self) -> ProviderType {
        match self {
            Self::AwsSqs(_) => ProviderType::AwsSqs,
            Self::InMemory(_) => ProviderType::InMemory,
        }
    }
}

/// AWS SQS configuration
///
/// Either `queue_url` or `queue_name` must be set. When only the name is
/// known the provider resolves the URL with `GetQueueUrl` on first use.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AwsSqsConfig {
    pub region: String,
    pub queue_url: Option<String>,
    pub queue_name: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
    /// Override the regional endpoint (LocalStack, tests)
    pub endpoint: Option<String>,
    /// Long-poll wait for receive calls, capped at 20 by SQS
    pub wait_time_seconds: u32,
    pub request_timeout_seconds: u64,
}

impl Default for AwsSqsConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            queue_url: None,
            queue_name: None,
            access_key_id: None,
            secret_access_key: None,
            session_token: None,
            endpoint: None,
            wait_time_seconds: 0,
            request_timeout_seconds: 30,
        }
    }
}

impl AwsSqsConfig {
    /// Build a configuration for a queue URL, taking credentials and region
    /// from the standard AWS environment variables.
    ///
    /// Reads `AWS_REGION` (falling back to `AWS_DEFAULT_REGION`),
    /// `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY` and `AWS_SESSION_TOKEN`.
    pub fn from_env(queue_url: impl Into<String>) -> Self {
        let env = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());
        let defaults = Self::default();

        Self {
            region: env("AWS_REGION")
                .or_else(|| env("AWS_DEFAULT_REGION"))
                .unwrap_or(defaults.region),
            queue_url: Some(queue_url.into()),
            access_key_id: env("AWS_ACCESS_KEY_ID"),
            secret_access_key: env("AWS_SECRET_ACCESS_KEY"),
            session_token: env("AWS_SESSION_TOKEN"),
            ..defaults
        }
    }

    /// Check the configuration is usable
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.region.is_empty() {
            return Err(ConfigurationError::Missing {
                key: "region".to_string(),
            });
        }

        if self.queue_url.is_none() && self.queue_name.is_none() {
            return Err(ConfigurationError::Missing {
                key: "queue_url".to_string(),
            });
        }

        if self.access_key_id.is_some() != self.secret_access_key.is_some() {
            return Err(ConfigurationError::Invalid {
                message: "access_key_id and secret_access_key must be set together".to_string(),
            });
        }

        if self.wait_time_seconds > 20 {
            return Err(ConfigurationError::Invalid {
                message: format!(
                    "wait_time_seconds must be at most 20, got {}",
                    self.wait_time_seconds
                ),
            });
        }

        Ok(())
    }
}

impl std::fmt::Debug for AwsSqsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsSqsConfig")
            .field("region", &self.region)
            .field("queue_url", &self.queue_url)
            .field("queue_name", &self.queue_name)
            .field("access_key_id", &self.access_key_id)
            .field(
                "secret_access_key",
                &self.secret_access_key.as_ref().map(|_| "<redacted>"),
            )
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "<redacted>"),
            )
            .field("endpoint", &self.endpoint)
            .field("wait_time_seconds", &self.wait_time_seconds)
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .finish()
    }
}

/// Settings for the process-local queue
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InMemoryConfig {
    pub queue_name: String,
    pub max_queue_size: usize,
    /// How long a received message stays hidden before it is redelivered
    pub visibility_timeout_seconds: u64,
    /// Most recent client calls kept for [`InMemoryQueue::operations`];
    /// older entries are dropped first
    ///
    /// [`InMemoryQueue::operations`]: crate::providers::InMemoryQueue::operations
    pub operation_log_limit: usize,
}

impl Default for InMemoryConfig {
    fn default() -> Self {
        Self {
            queue_name: "in-memory".to_string(),
            max_queue_size: 10000,
            visibility_timeout_seconds: 30,
            operation_log_limit: 10_000,
        }
    }
}

#[cfg(test)]
#[path = "provider_tests.rs"]
mod tests;
