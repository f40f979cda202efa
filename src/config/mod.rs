//! Configuration management for docdump
//!
//! This module handles loading, parsing, and managing configuration from various sources:
//! - Configuration files (TOML format)
//! - Environment variables
//! - Command-line arguments
//!
//! Configuration precedence (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file
//! 4. Default values

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::store::parse_keep_alive;

/// Prefix of environment variables that override configuration values
pub const ENV_PREFIX: &str = "DOCDUMP_";

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Store connection configuration
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Transfer pipeline configuration
    #[serde(default)]
    pub transfer: TransferConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Store connection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Retries of a transient transport failure before giving up
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay between retries in seconds
    #[serde(default = "default_retry_delay")]
    pub retry_delay: u64,

    /// Scroll cursor lease renewed by every page request
    #[serde(default = "default_scroll_keep_alive")]
    pub scroll_keep_alive: String,
}

/// Transfer pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Records per scroll page on export
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Estimated bulk request size that triggers a flush on import
    #[serde(default = "default_flush_threshold")]
    pub flush_threshold_bytes: usize,

    /// Gzip level for exported files (0-9)
    #[serde(default = "default_compression_level")]
    pub compression_level: u32,

    /// File extension of dump files
    #[serde(default = "default_extension")]
    pub extension: String,

    /// Show a progress bar on interactive terminals
    #[serde(default = "default_progress_bar")]
    pub progress_bar: bool,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// Enable timestamps in logs
    #[serde(default = "default_log_timestamps")]
    pub timestamps: bool,
}

/// Log level options
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

// Default value functions
fn default_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    10
}

fn default_retry_delay() -> u64 {
    5
}

fn default_scroll_keep_alive() -> String {
    "1m".to_string()
}

fn default_page_size() -> u32 {
    5000
}

fn default_flush_threshold() -> usize {
    10 * 1024 * 1024
}

fn default_compression_level() -> u32 {
    9
}

fn default_extension() -> String {
    "json.gz".to_string()
}

fn default_progress_bar() -> bool {
    true
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

fn default_log_timestamps() -> bool {
    true
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            max_retries: default_max_retries(),
            retry_delay: default_retry_delay(),
            scroll_keep_alive: default_scroll_keep_alive(),
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            flush_threshold_bytes: default_flush_threshold(),
            compression_level: default_compression_level(),
            extension: default_extension(),
            progress_bar: default_progress_bar(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            timestamps: default_log_timestamps(),
        }
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML file
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    /// * `Result<Config>` - Loaded configuration or error
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound(path.display().to_string())
            } else {
                ConfigError::InvalidFormat(format!("{}: {}", path.display(), e))
            }
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ConfigError::InvalidFormat(e.to_string()).into())
    }

    /// Load the configuration file, falling back to defaults
    ///
    /// An explicitly given path must exist. The default path is optional.
    ///
    /// # Arguments
    /// * `path` - Explicit configuration file, if any
    ///
    /// # Returns
    /// * `Result<Config>` - Loaded configuration or error
    pub fn load_from_file(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let default_path = Self::default_path();
                if default_path.is_file() {
                    Self::from_file(default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Load configuration from file and process environment, then validate
    ///
    /// # Returns
    /// * `Result<Config>` - Merged configuration or error
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `DOCDUMP_*` overrides
    ///
    /// # Arguments
    /// * `lookup` - Variable lookup, `std::env::var` in production
    ///
    /// # Returns
    /// * `Result<()>` - Ok, or an error naming the unparsable variable
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(v) = var("TIMEOUT") {
            self.connection.timeout = parse_env("TIMEOUT", &v)?;
        }
        if let Some(v) = var("MAX_RETRIES") {
            self.connection.max_retries = parse_env("MAX_RETRIES", &v)?;
        }
        if let Some(v) = var("RETRY_DELAY") {
            self.connection.retry_delay = parse_env("RETRY_DELAY", &v)?;
        }
        if let Some(v) = var("SCROLL_KEEP_ALIVE") {
            self.connection.scroll_keep_alive = v;
        }
        if let Some(v) = var("PAGE_SIZE") {
            self.transfer.page_size = parse_env("PAGE_SIZE", &v)?;
        }
        if let Some(v) = var("FLUSH_THRESHOLD") {
            self.transfer.flush_threshold_bytes = parse_env("FLUSH_THRESHOLD", &v)?;
        }
        if let Some(v) = var("LOG_LEVEL") {
            self.logging.level = LogLevel::parse(&v).ok_or_else(|| ConfigError::InvalidValue {
                field: format!("{ENV_PREFIX}LOG_LEVEL"),
                value: v.clone(),
            })?;
        }
        Ok(())
    }

    /// Get the default configuration file path
    ///
    /// # Returns
    /// * `PathBuf` - Path to default configuration file
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".docdump")
            .join("config.toml")
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::InvalidFormat(e.to_string()).into())
    }

    /// Validate the configuration
    ///
    /// # Returns
    /// * `Result<()>` - Ok if valid, error otherwise
    pub fn validate(&self) -> Result<()> {
        if self.transfer.page_size == 0 {
            return Err(invalid("transfer.page_size", self.transfer.page_size));
        }
        if self.transfer.flush_threshold_bytes == 0 {
            return Err(invalid(
                "transfer.flush_threshold_bytes",
                self.transfer.flush_threshold_bytes,
            ));
        }
        if self.transfer.compression_level > 9 {
            return Err(invalid(
                "transfer.compression_level",
                self.transfer.compression_level,
            ));
        }
        if self.transfer.extension.trim_matches('.').is_empty() {
            return Err(invalid("transfer.extension", &self.transfer.extension));
        }
        if parse_keep_alive(&self.connection.scroll_keep_alive).is_none() {
            return Err(invalid(
                "connection.scroll_keep_alive",
                &self.connection.scroll_keep_alive,
            ));
        }
        Ok(())
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.connection.timeout)
    }
}

fn invalid(field: &str, value: impl ToString) -> crate::error::DumpError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    }
    .into()
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        ConfigError::InvalidValue {
            field: format!("{ENV_PREFIX}{name}"),
            value: value.to_string(),
        }
        .into()
    })
}

impl LogLevel {
    /// Parse a level name, case-insensitively
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "error" => Some(LogLevel::Error),
            "warn" | "warning" => Some(LogLevel::Warn),
            "info" => Some(LogLevel::Info),
            "debug" => Some(LogLevel::Debug),
            "trace" => Some(LogLevel::Trace),
            _ => None,
        }
    }

    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}
