//! # Structured Logging
//!
//! Installs the global `tracing` subscriber. Every crate in the workspace
//! logs through `tracing` macros; binaries and test harnesses call
//! [`init_logging`] once at startup.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

// Flag to track if logging has been initialized
static LOGGING_INITIALIZED: AtomicBool = AtomicBool::new(false);

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("failed to set global subscriber: {0}")]
    Subscriber(String),
}

/// Configuration for the logging system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// The log level to use (trace, debug, info, warn, error)
    pub level: String,
    /// The service name, used for the log file name
    pub service_name: String,
    /// Whether to also write logs to a daily rolling file
    pub file_output: bool,
    /// The directory to store log files in
    pub log_dir: Option<String>,
    /// Whether to use JSON formatting on stdout
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            service_name: "remediation-core".to_string(),
            file_output: false,
            log_dir: None,
            json_format: true,
        }
    }
}

impl LoggingConfig {
    /// Reads `LOG_LEVEL`, `LOG_JSON`, `LOG_DIR` and `SERVICE_NAME`.
    ///
    /// Setting `LOG_DIR` turns on file output.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let log_dir = config_rs::env_string("LOG_DIR");

        Self {
            level: config_rs::env_string("LOG_LEVEL").unwrap_or(defaults.level),
            service_name: config_rs::env_string("SERVICE_NAME").unwrap_or(defaults.service_name),
            file_output: log_dir.is_some(),
            log_dir,
            json_format: config_rs::env_bool("LOG_JSON", defaults.json_format),
        }
    }
}

/// Initializes the structured logging system.
///
/// Calling it again after a successful initialization is a no-op.
pub fn init_logging(config: Option<LoggingConfig>) -> Result<(), LoggingError> {
    if LOGGING_INITIALIZED.load(Ordering::SeqCst) {
        return Ok(());
    }

    let config = config.unwrap_or_default();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},warn", config.level)));

    // Exactly one of the stdout layers is active; `Option<Layer>` keeps the
    // subscriber type the same either way.
    let json_layer = config.json_format.then(|| {
        fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_target(true)
            .with_span_list(true)
    });
    let text_layer = (!config.json_format).then(|| {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
    });

    let file_layer = match (config.file_output, config.log_dir.as_deref()) {
        (true, Some(dir)) => {
            let appender =
                tracing_appender::rolling::daily(dir, format!("{}.log", config.service_name));
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            // The guard flushes on drop; it must live for the whole process.
            Box::leak(Box::new(guard));
            Some(fmt::layer().with_writer(non_blocking).with_ansi(false))
        }
        _ => None,
    };

    let subscriber = Registry::default()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .with(file_layer);

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| LoggingError::Subscriber(e.to_string()))?;

    LOGGING_INITIALIZED.store(true, Ordering::SeqCst);

    tracing::info!(
        service = %config.service_name,
        level = %config.level,
        json = %config.json_format,
        "Structured logging initialized"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_env_enables_file_output_when_dir_set() {
        std::env::set_var("LOG_DIR", "/tmp/remediation-logs");
        std::env::set_var("LOG_JSON", "no");
        let config = LoggingConfig::from_env();
        std::env::remove_var("LOG_DIR");
        std::env::remove_var("LOG_JSON");

        assert!(config.file_output);
        assert_eq!(config.log_dir.as_deref(), Some("/tmp/remediation-logs"));
        assert!(!config.json_format);
    }

    #[test]
    fn init_is_idempotent() {
        let config = LoggingConfig {
            json_format: false,
            ..LoggingConfig::default()
        };
        init_logging(Some(config.clone())).unwrap();
        init_logging(Some(config)).unwrap();
        assert!(LOGGING_INITIALIZED.load(Ordering::SeqCst));
    }
}
