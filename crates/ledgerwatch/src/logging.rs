//! Logging setup for the ledgerwatch binary.
//!
//! Two output formats are supported:
//!
//! - **Text**: human-readable, with optional ANSI colors, for terminals
//! - **JSON**: one structured object per event, for log aggregation
//!
//! `RUST_LOG` takes precedence over the configured level when set.

use ledgerwatch_common::config::{LogFormat, LoggingConfig};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Logging configuration options.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level to output.
    pub level: Level,
    /// Output format (text or JSON).
    pub format: LogFormat,
    /// Enable ANSI color codes (text format only).
    pub ansi_colors: bool,
    /// Include file/line source locations in output.
    pub with_source_location: bool,
    /// Include thread IDs in output.
    pub with_thread_ids: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Text,
            ansi_colors: true,
            with_source_location: false,
            with_thread_ids: false,
        }
    }
}

impl LogConfig {
    /// Build from the `[logging]` section of the configuration file.
    pub fn from_config(config: &LoggingConfig) -> Self {
        let base = Self::default().with_level(config.level.as_str());
        match config.format {
            LogFormat::Text => base,
            LogFormat::Json => base.json(),
        }
    }

    /// Switch to JSON output. Colors are disabled and thread IDs included.
    pub fn json(self) -> Self {
        Self {
            format: LogFormat::Json,
            ansi_colors: false,
            with_thread_ids: true,
            ..self
        }
    }

    /// Set the log level from a string. Unknown names fall back to INFO.
    pub fn with_level(mut self, level: &str) -> Self {
        self.level = match level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" | "warning" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };
        self
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.level.as_str().to_lowercase()))
    }
}

/// Initialize the global logging subscriber.
///
/// Should be called once at startup; a second call fails.
pub fn init(config: &LogConfig) -> anyhow::Result<()> {
    let filter = config.env_filter();

    match config.format {
        LogFormat::Text => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(config.ansi_colors)
                .with_target(true)
                .with_thread_ids(config.with_thread_ids)
                .with_file(config.with_source_location)
                .with_line_number(config.with_source_location);

            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .try_init()?;
        }
        LogFormat::Json => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_thread_ids(config.with_thread_ids)
                .with_file(config.with_source_location)
                .with_line_number(config.with_source_location)
                .with_span_list(true)
                .with_current_span(true);

            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .try_init()?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerwatch_common::config::LogLevel;

    #[test]
    fn test_with_level() {
        assert_eq!(LogConfig::default().with_level("TRACE").level, Level::TRACE);
        assert_eq!(LogConfig::default().with_level("warning").level, Level::WARN);
        assert_eq!(LogConfig::default().with_level("bogus").level, Level::INFO);
    }

    #[test]
    fn test_from_config() {
        let config = LoggingConfig {
            level: LogLevel::Debug,
            format: LogFormat::Json,
        };
        let log = LogConfig::from_config(&config);
        assert_eq!(log.level, Level::DEBUG);
        assert_eq!(log.format, LogFormat::Json);
        assert!(!log.ansi_colors);

        let text = LogConfig::from_config(&LoggingConfig::default());
        assert_eq!(text.format, LogFormat::Text);
        assert!(text.ansi_colors);
    }
}
