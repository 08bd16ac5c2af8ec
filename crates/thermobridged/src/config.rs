//! Configuration file parsing and structures.
//!
//! thermobridged uses TOML for declarative configuration: one `[system]`
//! table, logging, an optional hub-facing API surface, and one
//! `[accessories.<id>]` table per bridged thermostat describing the remote
//! device's endpoints.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use reqwest::Method;
use tracing_subscriber::filter::LevelFilter;

use crate::device::{ContentType, Endpoint, Endpoints};

/// Top-level configuration structure
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub system: SystemConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub api: Option<ApiConfig>,

    /// Bridged accessories, keyed by accessory id
    #[serde(default)]
    pub accessories: HashMap<String, AccessoryConfig>,
}

#[derive(Debug, Default, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default)]
    pub level: LogLevel,

    /// Per-target overrides, e.g. `"thermobridged::device" = "debug"`
    #[serde(default)]
    pub overrides: HashMap<String, LogLevel>,
}

/// System-wide configuration
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Directory holding the per-accessory durable state files
    pub data_dir: PathBuf,

    /// Optional cap on each device request's total time, in seconds.
    /// Unset means a hung remote blocks that operation indefinitely.
    pub request_timeout_secs: Option<u64>,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            request_timeout_secs: None,
        }
    }
}

/// Hub-facing HTTP API configuration
#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    pub enabled: bool,
    pub listen: String,
    pub port: u16,
}

fn default_poll_interval() -> u64 {
    60
}

/// Configuration for one bridged thermostat accessory
#[derive(Debug, Deserialize)]
pub struct AccessoryConfig {
    /// Human-readable accessory name
    pub name: String,

    /// URL of the temperature read endpoint
    #[serde(default)]
    pub get_temperature: Option<String>,

    /// Bearer token for the temperature read endpoint
    #[serde(default)]
    pub get_token: Option<String>,

    #[serde(default)]
    pub set_temperature: Option<EndpointTable>,

    #[serde(default)]
    pub set_off: Option<EndpointTable>,

    /// Accessory-wide body encoding, used by set endpoints that do not
    /// override it (default: json)
    #[serde(default)]
    pub content_type: Option<ContentType>,

    /// Temperature poll interval in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
}

/// One configured set endpoint
#[derive(Debug, Deserialize)]
pub struct EndpointTable {
    pub url: String,

    /// HTTP method (default: POST)
    #[serde(default)]
    pub method: Option<String>,

    #[serde(default)]
    pub token: Option<String>,

    #[serde(default)]
    pub content_type: Option<ContentType>,

    /// Key wrapping the value in json/form bodies (default: "value")
    #[serde(default)]
    pub body_key: Option<String>,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(path.as_ref().to_path_buf(), e))?;

        toml::from_str(&contents).map_err(ConfigError::Parse)
    }
}

impl AccessoryConfig {
    /// Build the typed endpoint set for this accessory.
    ///
    /// This is where methods are validated, so a bad config fails at startup
    /// instead of on the first hub request.
    pub fn endpoints(&self) -> Result<Endpoints, ConfigError> {
        let default_content_type = self.content_type.unwrap_or_default();

        let get_temperature = self.get_temperature.as_ref().map(|url| Endpoint {
            url: url.clone(),
            method: Method::GET,
            token: self.get_token.clone(),
            content_type: ContentType::Json,
            body_key: None,
        });

        let set_temperature = self
            .set_temperature
            .as_ref()
            .map(|table| table.to_endpoint(default_content_type))
            .transpose()?;

        let set_off = self
            .set_off
            .as_ref()
            .map(|table| table.to_endpoint(default_content_type))
            .transpose()?;

        Ok(Endpoints {
            get_temperature,
            set_temperature,
            set_off,
        })
    }
}

impl EndpointTable {
    fn to_endpoint(&self, default_content_type: ContentType) -> Result<Endpoint, ConfigError> {
        let method = match &self.method {
            None => Method::POST,
            Some(name) => Method::from_bytes(name.to_uppercase().as_bytes())
                .map_err(|_| ConfigError::InvalidMethod(name.clone()))?,
        };

        Ok(Endpoint {
            url: self.url.clone(),
            method,
            token: self.token.clone(),
            content_type: self.content_type.unwrap_or(default_content_type),
            body_key: self.body_key.clone(),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(String),
}
