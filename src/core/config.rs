//! Configuration management
//!
//! Settings come from an optional TOML file, then `ASTRON_*` environment
//! overrides, then validation. Every field has a default so an empty file is
//! a valid configuration.

use crate::core::error::{Error, Result};
use crate::core::types::ChannelId;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// File read by [`Config::load`] when present in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "astron-replica.toml";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Connection settings shared by both roles
    pub network: NetworkConfig,

    /// Client role settings
    pub client: ClientConfig,

    /// Internal (cluster) role settings
    pub internal: InternalConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Cluster address as `host:port`
    pub server_address: String,

    /// Decoded frames buffered between the socket reader and dispatch
    pub frame_queue_capacity: usize,

    /// Repository events buffered per subscriber
    pub event_capacity: usize,

    /// Deadline for establishing the TCP connection
    #[serde(with = "duration_str")]
    pub connect_timeout: Duration,

    /// Disable Nagle's algorithm on the socket
    pub tcp_nodelay: bool,
}

/// Client role configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Version string sent in the hello message
    pub version: String,

    /// Pinned schema hash; the schema's own hash is used when unset
    pub dc_hash: Option<u32>,

    /// Interval between heartbeats
    #[serde(with = "duration_str")]
    pub heartbeat_interval: Duration,
}

/// Internal role configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InternalConfig {
    /// Channel this process listens on and sends from
    pub control_channel: ChannelId,

    /// State server channel that receives object creation
    pub state_server: ChannelId,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (pretty, compact, full)
    pub format: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            server_address: "127.0.0.1:7199".to_string(),
            frame_queue_capacity: 1024,
            event_capacity: 256,
            connect_timeout: Duration::from_secs(10),
            tcp_nodelay: true,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            version: "astron-replica".to_string(),
            dc_hash: None,
            heartbeat_interval: Duration::from_secs(1),
        }
    }
}

impl Default for InternalConfig {
    fn default() -> Self {
        Self {
            control_channel: ChannelId::new(4000),
            state_server: ChannelId::new(402000),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the default file and environment variables
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration from an explicit file (or the default file when
    /// `None`), then apply environment overrides and validate
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(DEFAULT_CONFIG_FILE)?
            }
            None => Config::default(),
        };

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&contents)
            .map_err(|e| Error::config(format!("Failed to parse config file: {}", e)))
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `ASTRON_*` overrides from any key lookup
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("ASTRON_SERVER_ADDRESS") {
            self.network.server_address = addr;
        }

        if let Some(level) = lookup("ASTRON_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Some(format) = lookup("ASTRON_LOG_FORMAT") {
            self.logging.format = format;
        }

        if let Some(version) = lookup("ASTRON_CLIENT_VERSION") {
            self.client.version = version;
        }

        if let Some(hash) = lookup("ASTRON_DC_HASH") {
            self.client.dc_hash = Some(
                parse_u32(&hash)
                    .map_err(|e| Error::config(format!("Invalid dc hash: {}", e)))?,
            );
        }

        if let Some(channel) = lookup("ASTRON_CONTROL_CHANNEL") {
            self.internal.control_channel = channel
                .parse::<u64>()
                .map(ChannelId::new)
                .map_err(|e| Error::config(format!("Invalid control channel: {}", e)))?;
        }

        if let Some(channel) = lookup("ASTRON_STATE_SERVER") {
            self.internal.state_server = channel
                .parse::<u64>()
                .map(ChannelId::new)
                .map_err(|e| Error::config(format!("Invalid state server channel: {}", e)))?;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        validate_address(&self.network.server_address)?;

        if self.network.frame_queue_capacity == 0 {
            return Err(Error::config("Frame queue capacity must be non-zero"));
        }

        if self.network.event_capacity == 0 {
            return Err(Error::config("Event capacity must be non-zero"));
        }

        if self.client.heartbeat_interval.is_zero() {
            return Err(Error::config("Heartbeat interval must be non-zero"));
        }

        let control = self.internal.control_channel;
        if control == ChannelId::ZERO || control == ChannelId::CONTROL {
            return Err(Error::config(format!(
                "Control channel {} is reserved",
                control
            )));
        }

        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => return Err(Error::config("Invalid log level")),
        }

        match self.logging.format.as_str() {
            "pretty" | "compact" | "full" => {}
            _ => return Err(Error::config("Invalid log format")),
        }

        Ok(())
    }
}

fn validate_address(addr: &str) -> Result<()> {
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| Error::config(format!("Server address '{}' is not host:port", addr)))?;

    if host.is_empty() {
        return Err(Error::config(format!("Server address '{}' has no host", addr)));
    }

    port.parse::<u16>()
        .map_err(|e| Error::config(format!("Invalid port in '{}': {}", addr, e)))?;

    Ok(())
}

// Accepts decimal or 0x-prefixed hex
fn parse_u32(s: &str) -> std::result::Result<u32, std::num::ParseIntError> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    }
}

/// Serde adapter for durations written as `"250ms"`, `"1s"`, `"5m"`, `"1h"`
/// or a bare number of seconds
pub mod duration_str {
    use serde::de::{self, Deserializer, Visitor};
    use serde::Serializer;
    use std::fmt;
    use std::time::Duration;

    /// Serialize as milliseconds when sub-second, seconds otherwise
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_nanos() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    /// Deserialize from a duration string or an integer number of seconds
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct DurationVisitor;

        impl<'de> Visitor<'de> for DurationVisitor {
            type Value = Duration;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a duration string like '250ms', '30s' or '5m'")
            }

            fn visit_str<E>(self, value: &str) -> Result<Duration, E>
            where
                E: de::Error,
            {
                super::parse_duration(value).map_err(E::custom)
            }

            fn visit_u64<E>(self, value: u64) -> Result<Duration, E>
            where
                E: de::Error,
            {
                Ok(Duration::from_secs(value))
            }

            fn visit_i64<E>(self, value: i64) -> Result<Duration, E>
            where
                E: de::Error,
            {
                u64::try_from(value)
                    .map(Duration::from_secs)
                    .map_err(|_| E::custom("duration must not be negative"))
            }
        }

        deserializer.deserialize_any(DurationVisitor)
    }
}

/// Simple duration parser for common formats
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        let ms: u64 = ms.parse().map_err(|_| format!("Invalid milliseconds: {}", s))?;
        Ok(Duration::from_millis(ms))
    } else if let Some(secs) = s.strip_suffix('s') {
        let secs: u64 = secs.parse().map_err(|_| format!("Invalid seconds: {}", s))?;
        Ok(Duration::from_secs(secs))
    } else if let Some(mins) = s.strip_suffix('m') {
        let mins: u64 = mins.parse().map_err(|_| format!("Invalid minutes: {}", s))?;
        Ok(Duration::from_secs(mins * 60))
    } else if let Some(hours) = s.strip_suffix('h') {
        let hours: u64 = hours.parse().map_err(|_| format!("Invalid hours: {}", s))?;
        Ok(Duration::from_secs(hours * 3600))
    } else {
        // Try parsing as raw seconds
        let secs: u64 = s.parse().map_err(|_| format!("Invalid duration format: {}", s))?;
        Ok(Duration::from_secs(secs))
    }
}
