//! TOML-based configuration for the `comfoq` binary.
//!
//! Reads and writes [`AppConfig`] at the platform-appropriate path:
//! - Windows:  `%APPDATA%\ComfoQ\config.toml`
//! - Linux:    `~/.config/comfoq/config.toml`
//! - macOS:    `~/Library/Application Support/ComfoQ/config.toml`
//!
//! A typical file:
//!
//! ```toml
//! sensors = [117, 118, 276]
//!
//! [device]
//! host = "192.168.1.20"
//! uuid = "00000000001710138001144fd71e2c3f"
//! pin = 0
//!
//! [session]
//! debounce_ms = 2000
//! ```
//!
//! Every field except `pin` and `sensors` has a default, so older or minimal
//! files keep working.  [`AppConfig::to_client_config`] checks the rest and
//! builds the [`ClientConfig`] the session runs with.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use comfoq_core::protocol::GATEWAY_PORT;
use comfoq_core::SensorId;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::application::session::{
    ClientConfig, DeviceIdentity, SessionTiming, DEFAULT_APP_UUID,
};

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("no gateway PIN configured")]
    MissingPin,

    #[error("no sensors configured")]
    NoSensors,

    #[error("invalid {field} UUID {value:?}")]
    InvalidUuid { field: &'static str, value: String },

    #[error("invalid broadcast address {0:?}")]
    InvalidAddress(String),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    /// Sensor ids subscribed on every connect.
    #[serde(default)]
    pub sensors: Vec<SensorId>,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub session: SessionConfig,
}

/// Which gateway to talk to.  Host and UUID are discovered when absent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default = "default_port")]
    pub port: u16,
    /// 32 hex digits, with or without dashes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pin: Option<u32>,
}

/// How this app presents itself to the gateway.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppSection {
    #[serde(default = "default_app_uuid")]
    pub uuid: String,
    #[serde(default = "default_app_name")]
    pub name: String,
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Timing knobs of the session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_request_retries")]
    pub request_retries: u32,
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_interval_secs: u64,
    #[serde(default = "default_reconnect_secs")]
    pub reconnect_interval_secs: u64,
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_discovery_timeout_secs")]
    pub discovery_timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Destination of discovery probes.
    #[serde(default = "default_broadcast_address")]
    pub broadcast_address: String,
    #[serde(default = "default_port")]
    pub broadcast_port: u16,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_port() -> u16 {
    GATEWAY_PORT
}
fn default_app_uuid() -> String {
    DEFAULT_APP_UUID.simple().to_string()
}
fn default_app_name() -> String {
    "comfoq".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_request_timeout_ms() -> u64 {
    5000
}
fn default_request_retries() -> u32 {
    2
}
fn default_keepalive_secs() -> u64 {
    30
}
fn default_reconnect_secs() -> u64 {
    5
}
fn default_max_reconnect_attempts() -> u32 {
    5
}
fn default_discovery_timeout_secs() -> u64 {
    5
}
fn default_connect_timeout_secs() -> u64 {
    5
}
fn default_debounce_ms() -> u64 {
    2000
}
fn default_broadcast_address() -> String {
    "255.255.255.255".to_string()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: default_port(),
            uuid: None,
            pin: None,
        }
    }
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            uuid: default_app_uuid(),
            name: default_app_name(),
            log_level: default_log_level(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
            request_retries: default_request_retries(),
            keepalive_interval_secs: default_keepalive_secs(),
            reconnect_interval_secs: default_reconnect_secs(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            discovery_timeout_secs: default_discovery_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            debounce_ms: default_debounce_ms(),
            broadcast_address: default_broadcast_address(),
            broadcast_port: default_port(),
        }
    }
}

fn parse_uuid(field: &'static str, value: &str) -> Result<Uuid, ConfigError> {
    Uuid::parse_str(value.trim()).map_err(|_| ConfigError::InvalidUuid {
        field,
        value: value.to_string(),
    })
}

impl AppConfig {
    /// Validates the file contents and builds the session configuration.
    ///
    /// # Errors
    ///
    /// [`ConfigError::MissingPin`] and [`ConfigError::NoSensors`] when the
    /// client would have nothing useful to do; [`ConfigError::InvalidUuid`]
    /// or [`ConfigError::InvalidAddress`] for malformed values.
    pub fn to_client_config(&self) -> Result<ClientConfig, ConfigError> {
        let pin = self.device.pin.ok_or(ConfigError::MissingPin)?;
        if self.sensors.is_empty() {
            return Err(ConfigError::NoSensors);
        }

        let device_uuid = self
            .device
            .uuid
            .as_deref()
            .map(|u| parse_uuid("device", u))
            .transpose()?;
        let app_uuid = parse_uuid("app", &self.app.uuid)?;
        let broadcast_ip: IpAddr = self
            .session
            .broadcast_address
            .parse()
            .map_err(|_| ConfigError::InvalidAddress(self.session.broadcast_address.clone()))?;

        let mut sensors = Vec::with_capacity(self.sensors.len());
        for id in &self.sensors {
            if !sensors.contains(id) {
                sensors.push(*id);
            }
        }

        let s = &self.session;
        Ok(ClientConfig {
            identity: DeviceIdentity {
                app_uuid,
                app_name: self.app.name.clone(),
                device_uuid,
                host: self.device.host.clone(),
                port: self.device.port,
                broadcast: SocketAddr::new(broadcast_ip, self.session.broadcast_port),
            },
            pin,
            sensors,
            timing: SessionTiming {
                request_timeout: Duration::from_millis(s.request_timeout_ms),
                request_retries: s.request_retries,
                keepalive_interval: Duration::from_secs(s.keepalive_interval_secs),
                reconnect_interval: Duration::from_secs(s.reconnect_interval_secs),
                max_reconnect_attempts: s.max_reconnect_attempts,
                discovery_timeout: Duration::from_secs(s.discovery_timeout_secs),
                connect_timeout: Duration::from_secs(s.connect_timeout_secs),
                debounce: Duration::from_millis(s.debounce_ms),
            },
        })
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the base directory
/// cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads the config from the platform path, returning
/// `AppConfig::default()` if the file does not exist yet.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not
/// found", and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let path = config_file_path()?;
    match load_from(&path) {
        Err(ConfigError::Io { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
            Ok(AppConfig::default())
        }
        other => other,
    }
}

/// Loads the config from an explicit path.  A missing file is an error.
pub fn load_from(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(toml::from_str(&content)?)
}

/// Persists `config` to the platform path.
pub fn save_config(config: &AppConfig) -> Result<(), ConfigError> {
    save_to(&config_file_path()?, config)
}

/// Writes `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_to(path: &Path, config: &AppConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("ComfoQ"))
    }

    #[cfg(target_os = "linux")]
    {
        // XDG_CONFIG_HOME or ~/.config
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("comfoq"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("ComfoQ")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
