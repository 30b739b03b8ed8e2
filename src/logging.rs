//! Log output
//!
//! Console plus a daily rolling file. The filter comes from `RUST_LOG` when
//! set, otherwise from the configured level.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

const DEFAULT_LEVEL: &str = "info";
const LOG_FILE_PREFIX: &str = "idscan.log";

/// Directory the rolling log file is written to
pub fn log_directory(config: &LoggingConfig) -> Result<PathBuf> {
    match &config.directory {
        Some(dir) => Ok(dir.clone()),
        None => Ok(crate::storage::get_data_dir()?.join("logs")),
    }
}

fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = config.level.as_deref().unwrap_or(DEFAULT_LEVEL);
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL))
    })
}

/// Install the global subscriber. Keep the returned guard alive for the
/// lifetime of the process or buffered file output is lost.
pub fn init(config: &LoggingConfig) -> Result<WorkerGuard> {
    let dir = log_directory(config)?;
    init_in(&dir, env_filter(config))
}

fn init_in(dir: &Path, filter: EnvFilter) -> Result<WorkerGuard> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory {:?}", dir))?;

    let appender = RollingFileAppender::new(Rotation::DAILY, dir, LOG_FILE_PREFIX);
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    let file_layer = fmt::layer().with_writer(file_writer).with_ansi(false);
    let console_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to install log subscriber")?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_directory_wins() {
        let config = LoggingConfig {
            level: None,
            directory: Some(PathBuf::from("/var/log/idscan")),
        };
        assert_eq!(log_directory(&config).unwrap(), PathBuf::from("/var/log/idscan"));
    }

    #[test]
    fn test_invalid_level_falls_back() {
        let config = LoggingConfig {
            level: Some("not a [valid filter".to_string()),
            directory: None,
        };
        // Only checks construction; RUST_LOG may be set in the environment
        let _ = env_filter(&config);
    }

    #[test]
    fn test_init_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("nested").join("logs");
        // A global subscriber may already be installed by another test
        let _ = init_in(&logs, EnvFilter::new("debug"));
        assert!(logs.is_dir());
    }
}
