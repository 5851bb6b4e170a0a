//! Layered application configuration.
//!
//! Sources are applied in order, later sources overriding earlier ones:
//!
//! 1. `/etc/exp-backoff/consumer.yaml` (optional)
//! 2. `./config/consumer.yaml` (optional)
//! 3. The file given with `--config` / `EXP_BACKOFF_CONFIG_FILE` (required when given)
//! 4. Environment variables prefixed `EXP_BACKOFF__` with `__` as the nesting
//!    separator, e.g. `EXP_BACKOFF__CONSUMER__CONCURRENCY=8`
//!
//! Every field has a default. When no queue is configured anywhere,
//! `SQS_URL` is used as the queue URL.

use exp_backoff_core::ConsumerConfig;
use exp_backoff_runtime::{AwsSqsConfig, InMemoryConfig, ProviderType, QueueConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::info;

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

const SYSTEM_CONFIG: &str = "/etc/exp-backoff/consumer";
const LOCAL_CONFIG: &str = "config/consumer";
const ENV_PREFIX: &str = "EXP_BACKOFF";
const SQS_URL_ENV: &str = "SQS_URL";

/// Failure to load or validate the layered configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file {path} does not exist")]
    FileNotFound { path: PathBuf },

    #[error("Unable to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("config rejected: {message}")]
    Invalid { message: String },
}

/// Complete configuration for the `exp-backoff` binary
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub consumer: ConsumerConfig,
    pub queue: QueueSettings,
    pub logging: LoggingConfig,
}

/// Queue provider settings; the queue itself is `consumer.queue`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    pub provider: ProviderType,

    /// AWS region; falls back to `AWS_REGION` / `AWS_DEFAULT_REGION`
    pub region: Option<String>,

    /// SQS endpoint override (LocalStack)
    pub endpoint: Option<String>,

    /// Falls back to `AWS_ACCESS_KEY_ID`
    pub access_key_id: Option<String>,

    /// Falls back to `AWS_SECRET_ACCESS_KEY`
    #[serde(skip_serializing)]
    pub secret_access_key: Option<String>,

    pub wait_time_seconds: u32,
    pub request_timeout_seconds: u64,

    /// In-memory provider only
    pub visibility_timeout_seconds: u64,

    /// In-memory provider only
    pub max_queue_size: usize,
}

impl Default for QueueSettings {
    fn default() -> Self {
        let sqs = AwsSqsConfig::default();
        let memory = InMemoryConfig::default();

        Self {
            provider: ProviderType::AwsSqs,
            region: None,
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
            wait_time_seconds: sqs.wait_time_seconds,
            request_timeout_seconds: sqs.request_timeout_seconds,
            visibility_timeout_seconds: memory.visibility_timeout_seconds,
            max_queue_size: memory.max_queue_size,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Check the resolved configuration is usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.consumer.validate().map_err(|e| ConfigError::Invalid {
            message: e.to_string(),
        })?;

        self.queue_config().map(|_| ())
    }

    /// Provider configuration for `consumer.queue`
    pub fn queue_config(&self) -> Result<QueueConfig, ConfigError> {
        let queue = self.consumer.queue.trim();

        match self.queue.provider {
            ProviderType::InMemory => Ok(QueueConfig::InMemory(InMemoryConfig {
                queue_name: queue.to_string(),
                max_queue_size: self.queue.max_queue_size,
                visibility_timeout_seconds: self.queue.visibility_timeout_seconds,
                ..InMemoryConfig::default()
            })),
            ProviderType::AwsSqs => {
                let mut sqs = AwsSqsConfig::from_env(queue);
                if !is_url(queue) {
                    sqs.queue_url = None;
                    sqs.queue_name = Some(queue.to_string());
                }
                if let Some(region) = &self.queue.region {
                    sqs.region = region.clone();
                }
                if self.queue.access_key_id.is_some() {
                    sqs.access_key_id = self.queue.access_key_id.clone();
                    sqs.secret_access_key = self.queue.secret_access_key.clone();
                    sqs.session_token = None;
                }
                sqs.endpoint = self.queue.endpoint.clone();
                sqs.wait_time_seconds = self.queue.wait_time_seconds;
                sqs.request_timeout_seconds = self.queue.request_timeout_seconds;

                sqs.validate().map_err(|e| ConfigError::Invalid {
                    message: e.to_string(),
                })?;
                Ok(QueueConfig::AwsSqs(sqs))
            }
        }
    }
}

fn is_url(queue: &str) -> bool {
    queue.starts_with("https://") || queue.starts_with("http://")
}

/// Load configuration from the standard sources and the process environment
pub fn load_config(explicit_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    load_config_with_env(explicit_path, None)
}

/// Load configuration, reading environment variables from `env` instead of
/// the process environment when given
pub fn load_config_with_env(
    explicit_path: Option<&Path>,
    env: Option<HashMap<String, String>>,
) -> Result<AppConfig, ConfigError> {
    let mut builder = config::Config::builder()
        .add_source(
            config::File::with_name(SYSTEM_CONFIG)
                .required(false)
                .format(config::FileFormat::Yaml),
        )
        .add_source(
            config::File::with_name(LOCAL_CONFIG)
                .required(false)
                .format(config::FileFormat::Yaml),
        );

    if let Some(path) = explicit_path {
        if !path.is_file() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        builder = builder.add_source(
            config::File::from(path)
                .required(true)
                .format(config::FileFormat::Yaml),
        );
        info!(path = %path.display(), "Loading configuration from explicit path");
    }

    let sqs_url = match &env {
        Some(vars) => vars.get(SQS_URL_ENV).cloned(),
        None => std::env::var(SQS_URL_ENV).ok(),
    };

    let settings = builder
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .source(env),
        )
        .build()?;

    let mut app: AppConfig = settings.try_deserialize()?;

    if app.consumer.queue.trim().is_empty() {
        if let Some(url) = sqs_url.filter(|url| !url.trim().is_empty()) {
            app.consumer.queue = url;
        }
    }

    Ok(app)
}
