//! Process-wide `tracing` subscriber setup.
//!
//! Events always go to stdout. When a log file is configured they are also
//! appended there, without ANSI colours. `RUST_LOG` directives take precedence
//! over the configured level.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{Layer, Registry};

use crate::config::{LogFormat, LoggingConfig};

/// Errors from logging setup.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// The log file could not be opened for appending.
    #[error("failed to open log file {path}: {source}")]
    File {
        /// Path to the log file.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },

    /// A global subscriber was already installed.
    #[error("failed to install subscriber: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Install the global subscriber described by `config`.
///
/// # Errors
///
/// Returns an error if the log file cannot be opened or a subscriber is
/// already installed.
pub fn init(config: &LoggingConfig) -> Result<(), LoggingError> {
    let mut layers: Vec<BoxedLayer> = vec![format_layer(config.format, io::stdout, true)];
    if let Some(path) = &config.file {
        let file = open_log_file(path)?;
        layers.push(format_layer(config.format, Mutex::new(file), false));
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter(config))
        .try_init()?;
    Ok(())
}

/// Filter from `RUST_LOG`, falling back to the configured level.
#[must_use]
pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(config.level.as_tracing_level().into())
        .from_env_lossy()
}

fn format_layer<W>(format: LogFormat, writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi);
    match format {
        LogFormat::Json => layer.json().boxed(),
        LogFormat::Pretty => layer.pretty().boxed(),
        LogFormat::Compact => layer.compact().boxed(),
    }
}

fn open_log_file(path: &Path) -> Result<File, LoggingError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| LoggingError::File {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogLevel;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_open_log_file_appends() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("relay.log");
        std::fs::write(&path, "existing\n").unwrap();

        let mut file = open_log_file(&path).unwrap();
        writeln!(file, "appended").unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "existing\nappended\n");
    }

    #[test]
    fn test_open_log_file_missing_dir() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("relay.log");

        let err = open_log_file(&path).unwrap_err();
        assert!(matches!(err, LoggingError::File { .. }));
        assert!(err.to_string().contains("relay.log"));
    }

    #[test]
    fn test_file_layer_writes_events() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("relay.log");
        let file = open_log_file(&path).unwrap();

        let layer = format_layer(LogFormat::Compact, Mutex::new(file), false);
        let subscriber = tracing_subscriber::registry().with(vec![layer]);
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("Proxy server listening on 0.0.0.0:8080");
        });

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("Proxy server listening on 0.0.0.0:8080"));
        assert!(contents.contains("INFO"));
        assert!(!contents.contains('\u{1b}'));
    }

    #[test]
    fn test_env_filter_uses_configured_level() {
        let config = LoggingConfig {
            level: LogLevel::Debug,
            ..LoggingConfig::default()
        };
        // Only meaningful when RUST_LOG is unset in the test environment.
        if std::env::var_os("RUST_LOG").is_none() {
            assert_eq!(env_filter(&config).to_string(), "debug");
        }
    }
}
