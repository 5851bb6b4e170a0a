//! Command-line front end for the exp-backoff consumer.
//!
//! `run` drives a consumer with the retry demo processor, `config` checks
//! and prints the layered configuration, and `delay` prints the backoff
//! schedule without touching any queue.

use clap::{Parser, Subcommand};
use exp_backoff_core::{
    Consumer, ConsumerError, ConsumerStats, DelayStrategy, ExponentialDelay, StatsMetrics,
};
use exp_backoff_runtime::{QueueClientFactory, QueueError};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

pub mod config;
pub mod demo;

pub use config::{load_config, AppConfig, ConfigError};
pub use demo::{RetryDemoProcessor, RetryEnvelope};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;

// ============================================================================
// Arguments
// ============================================================================

#[derive(Parser)]
#[command(name = "exp-backoff", version)]
#[command(about = "Queue consumer that reschedules retries with exponential delays")]
pub struct Cli {
    /// YAML file layered over the default config locations
    #[arg(short, long, env = "EXP_BACKOFF_CONFIG_FILE")]
    pub config: Option<PathBuf>,

    /// Logging level, overrides the configured level
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the consumer until interrupted
    Run {
        /// Stop after this many seconds instead of waiting for Ctrl+C
        #[arg(short, long)]
        duration_secs: Option<u64>,

        /// Message to enqueue before starting; may be repeated
        #[arg(short, long)]
        seed: Vec<String>,

        /// Deliveries before the demo processor completes a message
        #[arg(short, long, default_value = "3")]
        max_attempts: u32,

        /// Queue URL or name, overrides the configured queue
        #[arg(short, long)]
        queue: Option<String>,

        /// Backoff factor, overrides the configured factor
        #[arg(short, long)]
        factor: Option<u32>,

        /// Maximum concurrent worker cycles, overrides the configured value
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Validate the configuration
    Config {
        /// Print the resolved configuration
        #[arg(short, long)]
        show: bool,

        /// Serialization used with --show
        #[arg(long, value_enum, default_value_t = ConfigFormat::Yaml)]
        format: ConfigFormat,
    },

    /// Print the delay schedule for a backoff factor
    Delay {
        /// Backoff factor
        #[arg(short, long, default_value = "3")]
        factor: u32,

        /// Highest retry count to print, at most 1000
        #[arg(short, long, default_value = "5")]
        retries: u32,

        /// Cap applied to every delay, in seconds
        #[arg(short, long)]
        max_delay: Option<u64>,

        /// Table or JSON array
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Tab-separated retry and delay columns
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
}

// ============================================================================
// Errors
// ============================================================================

/// Failure of a command; each variant maps to its own exit code
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{0}")]
    Configuration(#[from] ConfigError),

    #[error("consumer failed: {0}")]
    Consumer(#[from] ConsumerError),

    #[error("queue call failed: {0}")]
    Queue(#[from] QueueError),

    #[error("--{arg}: {message}")]
    InvalidArgument { arg: String, message: String },

    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("Logging setup failed: {message}")]
    Logging { message: String },

    #[error("Unable to render output: {message}")]
    Output { message: String },
}

impl CliError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) => 1,
            Self::Consumer(_) => 2,
            Self::Queue(_) => 3,
            Self::InvalidArgument { .. } => 4,
            Self::Io(_) => 5,
            Self::Logging { .. } => 6,
            Self::Output { .. } => 7,
        }
    }
}

// ============================================================================
// Dispatch
// ============================================================================

/// Parse the process arguments and run the selected command
pub async fn run_cli() -> Result<(), CliError> {
    run(Cli::parse()).await
}

/// Run an already parsed command line
pub async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Delay {
            factor,
            retries,
            max_delay,
            format,
        } => execute_delay_command(factor, retries, max_delay, format),
        Commands::Config { show, format } => {
            let app = config::load_config(cli.config.as_deref())?;
            execute_config_command(&app, show, format)
        }
        Commands::Run {
            duration_secs,
            seed,
            max_attempts,
            queue,
            factor,
            concurrency,
        } => {
            let mut app = config::load_config(cli.config.as_deref())?;
            initialize_logging(
                cli.log_level.as_deref().unwrap_or(&app.logging.level),
                cli.json_logs || app.logging.json,
            )?;

            if let Some(queue) = queue {
                app.consumer.queue = queue;
            }
            if let Some(factor) = factor {
                app.consumer.factor = factor;
            }
            if let Some(concurrency) = concurrency {
                app.consumer.concurrency = concurrency;
            }

            let stats = execute_run_command(&app, duration_secs, &seed, max_attempts).await?;
            print_json(&stats)
        }
    }
}

// ============================================================================
// Commands
// ============================================================================

/// Install the global tracing subscriber, writing to stderr
///
/// `RUST_LOG` takes precedence over `level` when set.
fn initialize_logging(level: &str, json: bool) -> Result<(), CliError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| CliError::Logging {
            message: e.to_string(),
        })?;

    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };

    result.map_err(|e| CliError::Logging {
        message: e.to_string(),
    })
}

/// Run the consumer with the demo processor and return its statistics
async fn execute_run_command(
    app: &AppConfig,
    duration_secs: Option<u64>,
    seed: &[String],
    max_attempts: u32,
) -> Result<ConsumerStats, CliError> {
    if max_attempts == 0 {
        return Err(CliError::InvalidArgument {
            arg: "max-attempts".to_string(),
            message: "must be at least 1".to_string(),
        });
    }
    app.validate()?;

    let queue = QueueClientFactory::create_client(app.queue_config()?).await?;
    for payload in seed {
        let body = RetryEnvelope::new(payload.as_str())
            .encode()
            .map_err(|e| CliError::Output {
                message: e.to_string(),
            })?;
        queue.send_message(&body, 0).await?;
    }
    if !seed.is_empty() {
        info!(count = seed.len(), "Seeded queue");
    }

    let metrics = Arc::new(StatsMetrics::default());
    let consumer = Consumer::builder(
        app.consumer.clone(),
        queue,
        Arc::new(RetryDemoProcessor::new(max_attempts)),
    )
    .metrics(metrics.clone())
    .build()?;

    consumer.start()?;

    match duration_secs {
        Some(seconds) => {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(seconds)) => {}
                signal = tokio::signal::ctrl_c() => signal?,
            }
        }
        None => {
            info!("Press Ctrl+C to stop");
            tokio::signal::ctrl_c().await?;
        }
    }

    consumer.shutdown().await?;
    if consumer.restart_count() > 0 {
        warn!(
            restarts = consumer.restart_count(),
            "Control loop was restarted during the run"
        );
    }

    Ok(metrics.snapshot())
}

/// Validate the configuration and optionally print it
fn execute_config_command(app: &AppConfig, show: bool, format: ConfigFormat) -> Result<(), CliError> {
    app.validate()?;

    if !show {
        println!("Configuration is valid");
        return Ok(());
    }

    let rendered = match format {
        ConfigFormat::Yaml => serde_yaml::to_string(app).map_err(|e| CliError::Output {
            message: e.to_string(),
        })?,
        ConfigFormat::Json => serde_json::to_string_pretty(app).map_err(|e| CliError::Output {
            message: e.to_string(),
        })?,
    };
    println!("{}", rendered.trim_end());
    Ok(())
}

/// One line of the delay schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScheduleEntry {
    pub retry_count: u32,
    pub delay_seconds: u64,
}

/// Highest retry count `delay` will print; delays saturate long before it
pub const MAX_SCHEDULE_RETRIES: u32 = 1_000;

/// Delays for retry counts `0..=retries`
pub fn delay_schedule(
    factor: u32,
    retries: u32,
    max_delay: Option<u64>,
) -> Result<Vec<ScheduleEntry>, CliError> {
    if factor == 0 {
        return Err(CliError::InvalidArgument {
            arg: "factor".to_string(),
            message: "must be at least 1".to_string(),
        });
    }
    if retries > MAX_SCHEDULE_RETRIES {
        return Err(CliError::InvalidArgument {
            arg: "retries".to_string(),
            message: format!("must be at most {}", MAX_SCHEDULE_RETRIES),
        });
    }

    let mut strategy = ExponentialDelay::new(factor);
    if let Some(max) = max_delay {
        strategy = strategy.with_max_delay(max);
    }

    Ok((0..=retries)
        .map(|retry_count| ScheduleEntry {
            retry_count,
            delay_seconds: strategy.delay_seconds(retry_count),
        })
        .collect())
}

fn execute_delay_command(
    factor: u32,
    retries: u32,
    max_delay: Option<u64>,
    format: OutputFormat,
) -> Result<(), CliError> {
    let schedule = delay_schedule(factor, retries, max_delay)?;

    match format {
        OutputFormat::Json => print_json(&schedule),
        OutputFormat::Text => {
            println!("retry\tdelay_seconds");
            for entry in schedule {
                println!("{}\t{}", entry.retry_count, entry.delay_seconds);
            }
            Ok(())
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value).map_err(|e| CliError::Output {
        message: e.to_string(),
    })?;
    println!("{}", rendered);
    Ok(())
}
