//! Tracing setup for the `tidyflow` binary.
//!
//! The library itself only emits `tracing` events; installing a subscriber is left
//! to hosts, and this module is the one the bundled CLI uses.

pub mod config;
pub mod layers;

pub use config::LoggingConfig;
pub use layers::console::ConsoleOutput;

use crate::logging::layers::{console, file};
use crate::Result;
use anyhow::{anyhow, Context};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::Registry;

static LOGGER_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Guards that keep logging sinks active for the duration of the command.
pub struct LoggingGuard {
    _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
    console_output: ConsoleOutput,
    log_file_path: Option<PathBuf>,
}

impl LoggingGuard {
    /// Returns the console output configuration used during initialization.
    pub fn console_output(&self) -> ConsoleOutput {
        self.console_output
    }

    /// Returns the log file path backing the file sink, if one is enabled.
    pub fn log_file_path(&self) -> Option<&Path> {
        self.log_file_path.as_deref()
    }
}

/// Install the global subscriber: optional file sink, console sink, then the level filter.
///
/// `RUST_LOG` wins over `config.default_level`. Errors when invoked more than once per
/// process.
pub fn init(config: &LoggingConfig) -> Result<LoggingGuard> {
    if LOGGER_INITIALIZED
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return Err(anyhow!("logging already initialized"));
    }

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.default_level))
        .context("failed to configure tracing level")?;

    type BaseRegistry = Registry;
    type FileSubscriber = file::FileLayerStack<BaseRegistry>;

    let (file_layer, file_guard) = file::file_layer::<BaseRegistry>(config.log_file.as_deref())?;

    let subscriber = tracing_subscriber::registry();
    let subscriber = subscriber.with(file_layer);

    let console_layer = console::console_layer::<FileSubscriber>(config.console_output);
    let subscriber = subscriber.with(console_layer);

    let subscriber = subscriber.with(env_filter);
    subscriber
        .try_init()
        .map_err(|err| anyhow!("failed to install tracing subscriber: {}", err))?;

    Ok(LoggingGuard {
        _file_guard: file_guard,
        console_output: config.console_output,
        log_file_path: config.log_file.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    #[serial]
    fn test_init_writes_file_and_refuses_second_call() {
        let temp_dir = TempDir::new().unwrap();
        let log_file = temp_dir.path().join("tidyflow.log");
        let config = LoggingConfig {
            default_level: "info".to_string(),
            console_output: ConsoleOutput::None,
            log_file: Some(log_file.clone()),
        };

        let guard = init(&config).unwrap();
        assert_eq!(guard.console_output(), ConsoleOutput::None);
        assert_eq!(guard.log_file_path(), Some(log_file.as_path()));

        let second = init(&config);
        assert!(second.is_err());
        assert!(second
            .err()
            .unwrap()
            .to_string()
            .contains("already initialized"));

        tracing::info!("logged to file");
        drop(guard);
        let contents = std::fs::read_to_string(&log_file).unwrap();
        assert!(contents.contains("logged to file"));
    }
}
