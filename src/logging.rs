//! # Logging
//!
//! `tracing` subscriber setup: console output on stderr plus an optional
//! daily rolling log file.

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;

/// Keeps the non-blocking file writer alive; logs are flushed on drop
pub struct LoggingGuard {
    _guards: Vec<WorkerGuard>,
}

/// Install the global subscriber
///
/// `RUST_LOG` takes precedence over the configured level.
///
/// # Errors
///
/// Returns error if a global subscriber is already installed
pub fn init(config: &LoggingConfig) -> anyhow::Result<LoggingGuard> {
    let mut guards = Vec::new();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| level_filter(&config.level));

    // stdout is reserved for the live readout
    let console_layer = fmt::layer().with_writer(std::io::stderr).with_target(true);

    let file_layer = if config.file_enabled {
        let appender =
            RollingFileAppender::new(Rotation::DAILY, &config.log_dir, &config.file_prefix);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        guards.push(guard);
        Some(fmt::layer().with_writer(non_blocking).with_ansi(false))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("failed to install tracing subscriber")?;

    tracing::debug!(level = %config.level, file = config.file_enabled, "logging initialized");

    Ok(LoggingGuard { _guards: guards })
}

/// Filter for a configured level name, falling back to `info`
fn level_filter(level: &str) -> EnvFilter {
    EnvFilter::try_new(level.to_ascii_lowercase()).unwrap_or_else(|_| EnvFilter::new("info"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_filter_accepts_config_levels() {
        assert_eq!(level_filter("debug").to_string(), "debug");
        assert_eq!(level_filter("WARN").to_string(), "warn");
    }

    #[test]
    fn test_level_filter_fallback() {
        assert_eq!(level_filter("not a [valid filter").to_string(), "info");
    }
}
