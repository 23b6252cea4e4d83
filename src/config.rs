//! Configuration loading using Figment
//!
//! Configuration is merged from, in increasing priority:
//! 1. built-in defaults (`ReaderConfig::default()`)
//! 2. an optional TOML file (`config/default.toml` unless another path is given)
//! 3. environment variables prefixed with `DS2506_`, nested keys separated by `__`
//!
//! # Example
//! ```no_run
//! use ds2506_reader::config::ReaderConfig;
//!
//! // DS2506_SERIAL__PORT=/dev/ttyUSB0 overrides [serial] port
//! let config = ReaderConfig::load()?;
//! config.validate()?;
//! println!("Port: {:?}", config.serial.port);
//! # Ok::<(), ds2506_reader::error::ReaderError>(())
//! ```

use crate::error::{AppResult, ReaderError};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Top-level reader configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReaderConfig {
    /// Serial bridge settings
    #[serde(default)]
    pub serial: SerialSettings,
    /// Framed transfer timing
    #[serde(default)]
    pub transfer: TransferSettings,
    /// Where exported artifacts go
    #[serde(default)]
    pub output: OutputSettings,
    /// Log level and format
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Serial port configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialSettings {
    /// Serial port path (e.g., "/dev/ttyUSB0", "COM7")
    pub port: Option<String>,
    /// Communication speed
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Per-read port timeout in milliseconds
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,
    /// Wait after opening the port (the bridge resets on connect)
    #[serde(default = "default_settle")]
    pub settle_ms: u64,
    /// Extra wait before the greeting lines are drained
    #[serde(default = "default_greeting_drain")]
    pub greeting_drain_ms: u64,
}

/// Timing of the framed transfer state machine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferSettings {
    /// Deadline for the start marker
    #[serde(default = "default_marker_timeout")]
    pub marker_timeout_ms: u64,
    /// How long to wait for trailer lines after the payload
    #[serde(default = "default_trailer_timeout")]
    pub trailer_timeout_ms: u64,
    /// Sleep between polls of the channel
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Abort the payload when no byte arrives for this long (0 = wait forever)
    #[serde(default = "default_stall_timeout")]
    pub payload_stall_timeout_ms: u64,
    /// Wait after a pass-through command before collecting its output
    #[serde(default = "default_command_settle")]
    pub command_settle_ms: u64,
}

/// Artifact output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSettings {
    /// Directory for written artifacts
    #[serde(default = "default_output_dir")]
    pub directory: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format (pretty, compact, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_baud_rate() -> u32 {
    115_200
}

fn default_read_timeout() -> u64 {
    1000
}

fn default_settle() -> u64 {
    2000
}

fn default_greeting_drain() -> u64 {
    500
}

fn default_marker_timeout() -> u64 {
    5000
}

fn default_trailer_timeout() -> u64 {
    2000
}

fn default_poll_interval() -> u64 {
    50
}

fn default_stall_timeout() -> u64 {
    10_000
}

fn default_command_settle() -> u64 {
    100
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: default_baud_rate(),
            read_timeout_ms: default_read_timeout(),
            settle_ms: default_settle(),
            greeting_drain_ms: default_greeting_drain(),
        }
    }
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            marker_timeout_ms: default_marker_timeout(),
            trailer_timeout_ms: default_trailer_timeout(),
            poll_interval_ms: default_poll_interval(),
            payload_stall_timeout_ms: default_stall_timeout(),
            command_settle_ms: default_command_settle(),
        }
    }
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl TransferSettings {
    pub fn marker_timeout(&self) -> Duration {
        Duration::from_millis(self.marker_timeout_ms)
    }

    pub fn trailer_timeout(&self) -> Duration {
        Duration::from_millis(self.trailer_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// `None` keeps the payload wait unbounded.
    pub fn payload_stall_timeout(&self) -> Option<Duration> {
        match self.payload_stall_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    pub fn command_settle(&self) -> Duration {
        Duration::from_millis(self.command_settle_ms)
    }
}

impl ReaderConfig {
    /// Load configuration from the default file and environment variables
    ///
    /// Example: `DS2506_TRANSFER__MARKER_TIMEOUT_MS=8000`
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        Figment::from(Serialized::defaults(ReaderConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("DS2506_").split("__"))
            .extract()
            .map_err(ReaderError::from)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ReaderError::Configuration(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_levels.join(", ")
            )));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.logging.format.to_lowercase().as_str()) {
            return Err(ReaderError::Configuration(format!(
                "Invalid log format '{}'. Must be one of: {}",
                self.logging.format,
                valid_formats.join(", ")
            )));
        }

        if self.serial.baud_rate == 0 {
            return Err(ReaderError::Configuration(
                "baud_rate must be greater than 0".to_string(),
            ));
        }

        if self.transfer.poll_interval_ms == 0 {
            return Err(ReaderError::Configuration(
                "poll_interval_ms must be greater than 0".to_string(),
            ));
        }

        if self.transfer.poll_interval_ms >= self.transfer.marker_timeout_ms {
            return Err(ReaderError::Configuration(format!(
                "poll_interval_ms ({}) must be shorter than marker_timeout_ms ({})",
                self.transfer.poll_interval_ms, self.transfer.marker_timeout_ms
            )));
        }

        Ok(())
    }
}
