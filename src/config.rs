//! # Configuration Management
//!
//! Centralized configuration for distribution nodes and their connections.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment variables prefixed `WEBSOCKET_DIST_`
//!
//! ## Cookie Resolution
//! The shared cookie is taken from, in order: `node.cookie`, the file named by
//! `node.cookie_file`, then `$HOME/.erlang.cookie`. File contents are trimmed.

use crate::error::{constants, DistError, Result};
use crate::utils::timeout;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::Level;

/// Cookie file consulted when none is configured
pub const DEFAULT_COOKIE_FILE: &str = ".erlang.cookie";

/// Main configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct DistConfig {
    /// Local node identity
    #[serde(default)]
    pub node: NodeConfig,

    /// Settings applied to every outgoing connection
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl DistConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| DistError::ConfigError(format!("Failed to read config file: {e}")))?;
        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| DistError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(name) = std::env::var("WEBSOCKET_DIST_NODE_NAME") {
            config.node.name = name;
        }

        if let Ok(cookie) = std::env::var("WEBSOCKET_DIST_COOKIE") {
            config.node.cookie = Some(cookie);
        }

        if let Ok(path) = std::env::var("WEBSOCKET_DIST_COOKIE_FILE") {
            config.node.cookie_file = Some(PathBuf::from(path));
        }

        if let Ok(scheme) = std::env::var("WEBSOCKET_DIST_SCHEME") {
            config.connection.scheme = scheme;
        }

        if let Ok(value) = std::env::var("WEBSOCKET_DIST_CONNECT_TIMEOUT_MS") {
            config.connection.connect_timeout = Duration::from_millis(parse_env(
                "WEBSOCKET_DIST_CONNECT_TIMEOUT_MS",
                &value,
            )?);
        }

        if let Ok(value) = std::env::var("WEBSOCKET_DIST_RECEIVE_TIMEOUT_MS") {
            config.connection.receive_timeout = Some(Duration::from_millis(parse_env(
                "WEBSOCKET_DIST_RECEIVE_TIMEOUT_MS",
                &value,
            )?));
        }

        if let Ok(value) = std::env::var("WEBSOCKET_DIST_MAX_BUFFERED_FRAMES") {
            config.connection.max_buffered_frames =
                Some(parse_env("WEBSOCKET_DIST_MAX_BUFFERED_FRAMES", &value)?);
        }

        if let Ok(value) = std::env::var("WEBSOCKET_DIST_LOG_LEVEL") {
            config.logging.log_level = value.parse::<Level>().map_err(|_| {
                DistError::ConfigError(format!("Invalid WEBSOCKET_DIST_LOG_LEVEL: {value}"))
            })?;
        }

        if let Ok(value) = std::env::var("WEBSOCKET_DIST_LOG_JSON") {
            config.logging.json_format = parse_env("WEBSOCKET_DIST_LOG_JSON", &value)?;
        }

        Ok(config)
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| DistError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| DistError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.node.validate());
        errors.extend(self.connection.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(DistError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| DistError::ConfigError(format!("Invalid {key}: {value}")))
}

/// Local node identity
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Node name in `identifier@host` form
    pub name: String,

    /// Inline cookie; takes precedence over `cookie_file`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookie: Option<String>,

    /// File holding the cookie
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookie_file: Option<PathBuf>,
}

impl std::fmt::Debug for NodeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeConfig")
            .field("name", &self.name)
            .field("cookie", &self.cookie.as_ref().map(|_| "<redacted>"))
            .field("cookie_file", &self.cookie_file)
            .finish()
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: String::from("wsdist@localhost"),
            cookie: None,
            cookie_file: None,
        }
    }
}

impl NodeConfig {
    /// Validate node configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        match self.name.split_once('@') {
            Some((ident, host)) if !ident.is_empty() && !host.is_empty() => {
                if ident.len() + host.len() + 1 > 255 {
                    errors.push(format!(
                        "Node name too long: {} bytes (maximum: 255)",
                        self.name.len()
                    ));
                }
            }
            _ => errors.push(format!(
                "Invalid node name: '{}' (expected format: 'name@host')",
                self.name
            )),
        }

        if let Some(cookie) = &self.cookie {
            if cookie.trim().is_empty() {
                errors.push("Cookie cannot be empty".to_string());
            }
        } else if let Some(path) = &self.cookie_file {
            if !path.exists() {
                errors.push(format!("Cookie file does not exist: {}", path.display()));
            }
        }

        errors
    }

    /// Find the shared cookie.
    ///
    /// # Errors
    /// `ConfigError` if no source yields a non-empty cookie
    pub fn resolve_cookie(&self) -> Result<String> {
        if let Some(cookie) = &self.cookie {
            return non_empty(cookie.trim().to_string());
        }

        let path = match &self.cookie_file {
            Some(path) => path.clone(),
            None => std::env::var_os("HOME")
                .map(|home| PathBuf::from(home).join(DEFAULT_COOKIE_FILE))
                .ok_or_else(|| DistError::ConfigError(constants::ERR_COOKIE_NOT_FOUND.into()))?,
        };

        let contents = std::fs::read_to_string(&path).map_err(|e| {
            DistError::ConfigError(format!(
                "{}: {}: {e}",
                constants::ERR_COOKIE_NOT_FOUND,
                path.display()
            ))
        })?;
        non_empty(contents.trim().to_string())
    }
}

fn non_empty(cookie: String) -> Result<String> {
    if cookie.is_empty() {
        Err(DistError::ConfigError(constants::ERR_COOKIE_NOT_FOUND.into()))
    } else {
        Ok(cookie)
    }
}

/// Connection settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Scheme used when a peer is given as `host:port`
    pub scheme: String,

    /// Bound on opening the socket plus the whole handshake
    #[serde(with = "duration_serde")]
    pub connect_timeout: Duration,

    /// Bound on each `receive` call; unbounded when absent
    #[serde(default, with = "opt_duration_serde", skip_serializing_if = "Option::is_none")]
    pub receive_timeout: Option<Duration>,

    /// Fail the connection once this many frames sit unclaimed; unbounded when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_buffered_frames: Option<usize>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            scheme: String::from(crate::transport::websocket::DEFAULT_SCHEME),
            connect_timeout: timeout::DEFAULT_CONNECT_TIMEOUT,
            receive_timeout: None,
            max_buffered_frames: None,
        }
    }
}

impl ConnectionConfig {
    /// Validate connection configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.scheme != "ws" && self.scheme != "wss" {
            errors.push(format!(
                "Invalid scheme: '{}' (expected 'ws' or 'wss')",
                self.scheme
            ));
        }

        if self.connect_timeout.as_millis() < 100 {
            errors.push("Connect timeout too short (minimum: 100ms)".to_string());
        } else if self.connect_timeout.as_secs() > 300 {
            errors.push("Connect timeout too long (maximum: 300s)".to_string());
        }

        if let Some(receive_timeout) = self.receive_timeout {
            if receive_timeout.as_millis() < 10 {
                errors.push("Receive timeout too short (minimum: 10ms)".to_string());
            }
        }

        if self.max_buffered_frames == Some(0) {
            errors.push("Max buffered frames must be greater than 0".to_string());
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("websocket-dist"),
            log_level: Level::INFO,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        errors
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Optional durations, also in milliseconds
mod opt_duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration
            .map(|d| d.as_millis() as u64)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
