//! # Structured Logging Module
//!
//! Environment-aware structured logging that outputs to both console and
//! files, for tracing orders through the concurrent lifecycle processors.

use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration.
///
/// Safe to call more than once; only the first call installs the subscriber.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = get_log_level(&environment);

        let log_dir = PathBuf::from("log");
        if !log_dir.exists() {
            if let Err(e) = fs::create_dir_all(&log_dir) {
                eprintln!("Failed to create log directory: {e}");
                return;
            }
        }

        let pid = process::id();
        let file_appender =
            tracing_appender::rolling::never(&log_dir, format!("{environment}.{pid}.log"));
        let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

        let subscriber = tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_level(true)
                    .with_ansi(true)
                    .with_filter(EnvFilter::new(log_level.clone())),
            )
            .with(
                fmt::layer()
                    .with_writer(file_writer)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_level(true)
                    .with_ansi(false)
                    .json()
                    .with_filter(EnvFilter::new(log_level)),
            );

        // A global subscriber may already be installed by an embedding
        // application; that is not an error.
        if subscriber.try_init().is_err() {
            tracing::debug!(
                "Global tracing subscriber already initialized - continuing with existing one"
            );
        }

        tracing::info!(
            pid = pid,
            environment = %environment,
            "Structured logging initialized with file output"
        );

        // The appender guard must outlive the process for the file writer to
        // keep flushing.
        std::mem::forget(guard);
    });
}

fn get_environment() -> String {
    std::env::var("BROKER_ENV").unwrap_or_else(|_| "development".to_string())
}

fn get_log_level(environment: &str) -> String {
    if let Ok(level) = std::env::var("RUST_LOG") {
        return level;
    }
    match environment {
        "production" => "info".to_string(),
        "test" => "warn".to_string(),
        _ => "debug".to_string(),
    }
}
