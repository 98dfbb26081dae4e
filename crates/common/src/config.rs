//! Configuration types for ledgerwatch.
//!
//! Configuration is loaded from TOML. Every section is optional and falls
//! back to the defaults a node runs with when nothing is configured.
//!
//! # Example Configuration (TOML)
//!
//! ```toml
//! [ledger_cache]
//! max_entries = 256
//! max_age_secs = 180
//!
//! [consensus_tracker]
//! max_entries = 64
//! max_age_secs = 300
//!
//! [overlay]
//! compression_enabled = true
//!
//! [logging]
//! level = "debug"
//! format = "json"
//! ```
//!
//! # Loading Configuration
//!
//! ```rust,no_run
//! use ledgerwatch_common::Config;
//! use std::path::Path;
//!
//! let mut config = Config::from_file(Path::new("ledgerwatch.toml")).unwrap();
//! config.apply_env_overrides();
//! config.validate().unwrap();
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::{Error, Result};

/// Default number of ledgers kept in the ledger cache.
pub const DEFAULT_LEDGER_CACHE_SIZE: usize = 256;

/// Default lifetime of an untouched ledger cache entry.
pub const DEFAULT_LEDGER_CACHE_AGE_SECS: u64 = 180;

/// Default number of sequences tracked for built/validated pairing.
pub const DEFAULT_CONSENSUS_TRACKER_SIZE: usize = 64;

/// Default lifetime of a built/validated pairing entry (five minutes).
pub const DEFAULT_CONSENSUS_TRACKER_AGE_SECS: u64 = 300;

/// Payloads at or below this size are never compressed.
pub const DEFAULT_COMPRESSION_MIN_SIZE: usize = 70;

/// Log levels for filtering log output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Returns the lowercase directive understood by `EnvFilter`.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(Error::Config(format!("invalid log level: {}", other))),
        }
    }
}

/// Log output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Sizing of the hash-keyed ledger cache.
    #[serde(default)]
    pub ledger_cache: CacheConfig,

    /// Sizing of the built/validated pairing buffer.
    #[serde(default = "CacheConfig::consensus_tracker")]
    pub consensus_tracker: CacheConfig,

    /// Peer envelope settings.
    #[serde(default)]
    pub overlay: OverlayConfig,

    /// Logging configuration (level and format).
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Capacity and age limits for a bounded cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of entries held at once.
    pub max_entries: usize,

    /// Seconds an entry may live without being touched.
    pub max_age_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_LEDGER_CACHE_SIZE,
            max_age_secs: DEFAULT_LEDGER_CACHE_AGE_SECS,
        }
    }
}

impl CacheConfig {
    /// Defaults for the consensus tracker: 64 entries, five minutes.
    pub fn consensus_tracker() -> Self {
        Self {
            max_entries: DEFAULT_CONSENSUS_TRACKER_SIZE,
            max_age_secs: DEFAULT_CONSENSUS_TRACKER_AGE_SECS,
        }
    }

    /// Entry lifetime as a [`Duration`].
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }

    fn validate(&self, section: &str) -> Result<()> {
        if self.max_entries == 0 {
            return Err(Error::Config(format!("{}.max_entries must be > 0", section)));
        }
        if self.max_age_secs == 0 {
            return Err(Error::Config(format!("{}.max_age_secs must be > 0", section)));
        }
        Ok(())
    }
}

/// Peer envelope configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlayConfig {
    /// Whether eligible payloads are compressed on send.
    #[serde(default = "default_true")]
    pub compression_enabled: bool,

    /// Payloads must be strictly larger than this to be compressed.
    #[serde(default = "default_compression_min_size")]
    pub compression_min_size: usize,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            compression_enabled: true,
            compression_min_size: DEFAULT_COMPRESSION_MIN_SIZE,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter. Default: `Info`
    #[serde(default)]
    pub level: LogLevel,

    /// Log output format. Default: `Text`
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ledger_cache: CacheConfig::default(),
            consensus_tracker: CacheConfig::consensus_tracker(),
            overlay: OverlayConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_compression_min_size() -> usize {
    DEFAULT_COMPRESSION_MIN_SIZE
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or contains invalid TOML.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Render the configuration as TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Apply `LEDGERWATCH_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("LEDGERWATCH_LOG_LEVEL") {
            match val.parse() {
                Ok(level) => self.logging.level = level,
                Err(e) => tracing::warn!(error = %e, "Ignoring LEDGERWATCH_LOG_LEVEL"),
            }
        }
        if let Some(val) = lookup("LEDGERWATCH_LOG_FORMAT") {
            match val.to_ascii_lowercase().as_str() {
                "text" => self.logging.format = LogFormat::Text,
                "json" => self.logging.format = LogFormat::Json,
                other => tracing::warn!(value = other, "Ignoring LEDGERWATCH_LOG_FORMAT"),
            }
        }
        if let Some(val) = lookup("LEDGERWATCH_LEDGER_CACHE_SIZE") {
            if let Ok(n) = val.parse() {
                self.ledger_cache.max_entries = n;
            } else {
                tracing::warn!(value = %val, "Ignoring LEDGERWATCH_LEDGER_CACHE_SIZE");
            }
        }
        if let Some(val) = lookup("LEDGERWATCH_LEDGER_CACHE_AGE") {
            if let Ok(secs) = val.parse() {
                self.ledger_cache.max_age_secs = secs;
            } else {
                tracing::warn!(value = %val, "Ignoring LEDGERWATCH_LEDGER_CACHE_AGE");
            }
        }
    }

    /// Check that every limit is usable.
    pub fn validate(&self) -> Result<()> {
        self.ledger_cache.validate("ledger_cache")?;
        self.consensus_tracker.validate("consensus_tracker")?;
        Ok(())
    }
}
