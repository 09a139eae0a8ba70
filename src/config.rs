//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every field has a default, so an empty file (or no file at all) yields the
//! IMU preset: fixed quad decoding into a 50-sample buffer, subscribed
//! continuously to a device whose name contains `XIAO_TENIS`.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

use crate::ble::session::{SessionConfig, SubscriptionPolicy};
use crate::error::{MonitorError, Result};
use crate::telemetry::export::ExportFormat;
use crate::telemetry::{BufferPolicy, DecodeMode};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub decode: DecodeConfig,
    #[serde(default)]
    pub buffer: BufferConfig,
    #[serde(default)]
    pub subscription: SubscriptionConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which peripheral to talk to
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct DeviceConfig {
    /// Substring of the advertised name
    #[serde(default = "default_device_name")]
    pub name: Option<String>,

    /// Exact address; takes precedence over `name`
    #[serde(default)]
    pub address: Option<String>,

    /// Characteristic to subscribe to
    #[serde(default)]
    pub characteristic_uuid: Option<String>,

    #[serde(default = "default_scan_timeout_ms")]
    pub scan_timeout_ms: u64,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

/// Payload decoding
#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
pub struct DecodeConfig {
    #[serde(default)]
    pub mode: DecodeMode,
}

/// Buffer retention policy name
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BufferKind {
    Bounded,
    Unbounded,
}

/// Telemetry buffer
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct BufferConfig {
    #[serde(default = "default_buffer_kind")]
    pub policy: BufferKind,

    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

/// Subscription lifetime name
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionKind {
    Window,
    Continuous,
}

/// Subscription lifetime
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct SubscriptionConfig {
    #[serde(default = "default_subscription_kind")]
    pub policy: SubscriptionKind,

    /// Window length when `policy = "window"`
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
}

/// Export of the collected samples after the subscription ends
#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
pub struct ExportConfig {
    /// Nothing is exported when unset
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Inferred from the path's extension when unset
    #[serde(default)]
    pub format: Option<ExportFormat>,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Default filter level; `RUST_LOG` overrides it
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub file_enabled: bool,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
}

/// Canned combinations of decode mode, buffer and subscription policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Preset {
    /// Accelerometer dashboard: fixed quad, last 50 samples, continuous
    Imu,
    /// Generic logger: single value, keep everything, 10 second window
    Generic,
}

// Default value functions
fn default_device_name() -> Option<String> { Some("XIAO_TENIS".to_string()) }
fn default_scan_timeout_ms() -> u64 { 5000 }
fn default_connect_timeout_ms() -> u64 { 10000 }

fn default_buffer_kind() -> BufferKind { BufferKind::Bounded }
fn default_capacity() -> usize { crate::telemetry::buffer::DEFAULT_CAPACITY }

fn default_subscription_kind() -> SubscriptionKind { SubscriptionKind::Continuous }
fn default_window_ms() -> u64 { 10000 }

fn default_log_level() -> String { "info".to_string() }
fn default_log_dir() -> String { "./logs".to_string() }
fn default_file_prefix() -> String { "imu-monitor".to_string() }

const MAX_WINDOW_MS: u64 = 3_600_000;
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: default_device_name(),
            address: None,
            characteristic_uuid: None,
            scan_timeout_ms: default_scan_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            policy: default_buffer_kind(),
            capacity: default_capacity(),
        }
    }
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            policy: default_subscription_kind(),
            window_ms: default_window_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file_enabled: false,
            log_dir: default_log_dir(),
            file_prefix: default_file_prefix(),
        }
    }
}

fn invalid(message: impl std::fmt::Display) -> MonitorError {
    MonitorError::Config(toml::de::Error::custom(message))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use imu_monitor::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Configuration for one of the canned presets
    pub fn preset(preset: Preset) -> Self {
        let mut config = Self::default();
        config.apply_preset(preset);
        config
    }

    /// Overwrite decode, buffer and subscription settings with a preset
    ///
    /// Device, export and logging settings are left alone.
    pub fn apply_preset(&mut self, preset: Preset) {
        match preset {
            Preset::Imu => {
                self.decode.mode = DecodeMode::FixedQuad;
                self.buffer = BufferConfig::default();
                self.subscription.policy = SubscriptionKind::Continuous;
            }
            Preset::Generic => {
                self.decode.mode = DecodeMode::Generic;
                self.buffer.policy = BufferKind::Unbounded;
                self.subscription = SubscriptionConfig {
                    policy: SubscriptionKind::Window,
                    window_ms: default_window_ms(),
                };
            }
        }
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns `MonitorError::Config` naming the first invalid value
    pub fn validate(&self) -> Result<()> {
        let has_name = self.device.name.as_deref().is_some_and(|n| !n.is_empty());
        let has_address = self.device.address.as_deref().is_some_and(|a| !a.is_empty());
        if !has_name && !has_address {
            return Err(invalid("device name or address must be set"));
        }

        if let Some(uuid) = &self.device.characteristic_uuid {
            if let Err(e) = Uuid::parse_str(uuid.trim()) {
                return Err(invalid(format!("characteristic_uuid '{}' is invalid: {}", uuid, e)));
            }
        }

        if !(100..=60_000).contains(&self.device.scan_timeout_ms) {
            return Err(invalid("scan_timeout_ms must be between 100 and 60000"));
        }

        if !(100..=120_000).contains(&self.device.connect_timeout_ms) {
            return Err(invalid("connect_timeout_ms must be between 100 and 120000"));
        }

        if self.buffer.policy == BufferKind::Bounded && self.buffer.capacity == 0 {
            return Err(invalid("buffer capacity must be greater than 0 when bounded"));
        }

        if self.subscription.policy == SubscriptionKind::Window
            && !(1..=MAX_WINDOW_MS).contains(&self.subscription.window_ms)
        {
            return Err(invalid(format!("window_ms must be between 1 and {}", MAX_WINDOW_MS)));
        }

        if !LOG_LEVELS.contains(&self.logging.level.to_ascii_lowercase().as_str()) {
            return Err(invalid(format!(
                "logging level must be one of: {}",
                LOG_LEVELS.join(", ")
            )));
        }

        if self.logging.file_enabled && self.logging.log_dir.is_empty() {
            return Err(invalid("log_dir cannot be empty when file logging is enabled"));
        }

        Ok(())
    }

    pub fn buffer_policy(&self) -> BufferPolicy {
        match self.buffer.policy {
            BufferKind::Bounded => BufferPolicy::Bounded(self.buffer.capacity),
            BufferKind::Unbounded => BufferPolicy::Unbounded,
        }
    }

    pub fn subscription_policy(&self) -> SubscriptionPolicy {
        match self.subscription.policy {
            SubscriptionKind::Window => {
                SubscriptionPolicy::TimedWindow(Duration::from_millis(self.subscription.window_ms))
            }
            SubscriptionKind::Continuous => SubscriptionPolicy::Continuous,
        }
    }

    /// Typed settings for a [`BleSession`](crate::ble::BleSession)
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            decode_mode: self.decode.mode,
            buffer_policy: self.buffer_policy(),
            scan_timeout: Duration::from_millis(self.device.scan_timeout_ms),
            connect_timeout: Duration::from_millis(self.device.connect_timeout_ms),
        }
    }

    /// Export destination and format, if an export path is configured
    pub fn export_target(&self) -> Option<(PathBuf, ExportFormat)> {
        let path = self.export.path.clone()?;
        let format = self
            .export
            .format
            .unwrap_or_else(|| ExportFormat::from_path(&path));
        Some((path, format))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UUID: &str = "0000ffe1-0000-1000-8000-00805f9b34fb";

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());

        assert_eq!(config.device.name.as_deref(), Some("XIAO_TENIS"));
        assert_eq!(config.decode.mode, DecodeMode::FixedQuad);
        assert_eq!(config.buffer_policy(), BufferPolicy::Bounded(50));
        assert_eq!(config.subscription_policy(), SubscriptionPolicy::Continuous);
        assert!(config.export_target().is_none());
    }

    #[test]
    fn test_default_equals_imu_preset() {
        assert_eq!(Config::default(), Config::preset(Preset::Imu));
    }

    #[test]
    fn test_generic_preset() {
        let config = Config::preset(Preset::Generic);
        assert_eq!(config.decode.mode, DecodeMode::Generic);
        assert_eq!(config.buffer_policy(), BufferPolicy::Unbounded);
        assert_eq!(
            config.subscription_policy(),
            SubscriptionPolicy::TimedWindow(Duration::from_secs(10))
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_apply_preset_keeps_device() {
        let mut config = Config::default();
        config.device.address = Some("AA:BB".to_string());
        config.apply_preset(Preset::Generic);
        assert_eq!(config.device.address.as_deref(), Some("AA:BB"));
    }

    #[test]
    fn test_shipped_config_matches_defaults() {
        let config = Config::from_toml_str(include_str!("../config/default.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_empty_file_is_default() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_parse_full_file() {
        let toml = format!(
            r#"
            [device]
            name = "SENSOR"
            characteristic_uuid = "{}"
            scan_timeout_ms = 2000

            [decode]
            mode = "generic"

            [buffer]
            policy = "unbounded"

            [subscription]
            policy = "window"
            window_ms = 2500

            [export]
            path = "out.jsonl"
            format = "jsonl"

            [logging]
            level = "debug"
            file_enabled = true
            "#,
            UUID
        );

        let config = Config::from_toml_str(&toml).unwrap();
        assert_eq!(config.device.name.as_deref(), Some("SENSOR"));
        assert_eq!(config.device.characteristic_uuid.as_deref(), Some(UUID));
        assert_eq!(config.device.connect_timeout_ms, 10000);

        let session = config.session_config();
        assert_eq!(session.decode_mode, DecodeMode::Generic);
        assert_eq!(session.buffer_policy, BufferPolicy::Unbounded);
        assert_eq!(session.scan_timeout, Duration::from_secs(2));
        assert_eq!(
            config.subscription_policy(),
            SubscriptionPolicy::TimedWindow(Duration::from_millis(2500))
        );

        let (path, format) = config.export_target().unwrap();
        assert_eq!(path, PathBuf::from("out.jsonl"));
        assert_eq!(format, ExportFormat::Jsonl);
        assert!(config.logging.file_enabled);
    }

    #[test]
    fn test_export_format_from_extension() {
        let config = Config::from_toml_str("[export]\npath = \"run.jsonl\"\n").unwrap();
        assert_eq!(config.export_target().unwrap().1, ExportFormat::Jsonl);

        let config = Config::from_toml_str("[export]\npath = \"run.csv\"\n").unwrap();
        assert_eq!(config.export_target().unwrap().1, ExportFormat::Csv);
    }

    #[test]
    fn test_missing_device_target() {
        let err = Config::from_toml_str("[device]\nname = \"\"\n").unwrap_err();
        assert!(err.to_string().contains("device name or address"));
    }

    #[test]
    fn test_address_without_name_is_valid() {
        let mut config = Config::default();
        config.device.name = None;
        config.device.address = Some("00:11:22:33:44:55".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_uuid() {
        let mut config = Config::default();
        config.device.characteristic_uuid = Some("not-a-uuid".to_string());
        let err = config.validate().unwrap_err();
        assert!(matches!(err, MonitorError::Config(_)));
        assert!(err.to_string().contains("characteristic_uuid"));
    }

    #[test]
    fn test_zero_capacity_rejected_only_when_bounded() {
        let mut config = Config::default();
        config.buffer.capacity = 0;
        assert!(config.validate().is_err());

        config.buffer.policy = BufferKind::Unbounded;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_window_bounds() {
        let mut config = Config::preset(Preset::Generic);

        config.subscription.window_ms = 0;
        assert!(config.validate().is_err());

        config.subscription.window_ms = MAX_WINDOW_MS + 1;
        assert!(config.validate().is_err());

        config.subscription.window_ms = 1;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_scan_timeout_bounds() {
        let mut config = Config::default();
        config.device.scan_timeout_ms = 99;
        assert!(config.validate().is_err());

        config.device.scan_timeout_ms = 60_001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_export_format() {
        let result = Config::from_toml_str("[export]\nformat = \"xml\"\n");
        assert!(matches!(result, Err(MonitorError::Config(_))));
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());

        config.logging.level = "WARN".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitor.toml");
        fs::write(&path, "[buffer]\ncapacity = 10\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.buffer_policy(), BufferPolicy::Bounded(10));
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load("/nonexistent/monitor.toml");
        assert!(matches!(result, Err(MonitorError::Io(_))));
    }
}
