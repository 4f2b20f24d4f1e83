//! Startup configuration.
//!
//! Read once before the server binds and passed explicitly to everything
//! that needs it. Nothing here is mutated after `load`.

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Shortest long-press threshold accepted, in milliseconds.
pub const MIN_LONG_PRESS_MS: u64 = 600;

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// How the scheduler decides whether an accumulated delta is ready to send.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushPolicy {
    /// Flush only when both axes are non-zero. Single-axis motion is held
    /// until the other axis moves too.
    #[default]
    BothAxes,
    /// Flush whenever either axis is non-zero.
    AnyAxis,
}

/// Gesture recognition and send-rate tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureConfig {
    /// Longest contact that still counts as a tap.
    pub tap_max_ms: u64,
    /// Displacement (px) below which a contact is considered stationary.
    pub movement_threshold: f64,
    /// Hold time before a stationary contact becomes a long-press.
    pub long_press_ms: u64,
    /// Scheduler period.
    pub tick_ms: u64,
    pub flush_policy: FlushPolicy,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            tap_max_ms: 250,
            movement_threshold: 9.0,
            long_press_ms: MIN_LONG_PRESS_MS,
            tick_ms: 33,
            flush_policy: FlushPolicy::BothAxes,
        }
    }
}

impl GestureConfig {
    #[must_use]
    pub const fn tap_max(&self) -> Duration {
        Duration::from_millis(self.tap_max_ms)
    }

    #[must_use]
    pub const fn long_press(&self) -> Duration {
        Duration::from_millis(self.long_press_ms)
    }

    #[must_use]
    pub const fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

const fn default_port() -> u16 {
    8080
}

const fn default_bind() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

const fn default_tv_secure() -> bool {
    true
}

const fn default_connect_timeout_ms() -> u64 {
    10_000
}

const fn default_command_timeout_ms() -> u64 {
    2_000
}

/// Bridge configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Network address of the television.
    pub tv_ip: String,
    /// Pre-provisioned pairing key.
    pub client_key: String,

    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: IpAddr,
    /// Use the TV's TLS control socket.
    #[serde(default = "default_tv_secure")]
    pub tv_secure: bool,
    /// Control socket port; defaults to 3001 with TLS and 3000 without.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tv_port: Option<u16>,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
    /// Record commands instead of talking to a TV.
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub gesture: GestureConfig,
}

impl BridgeConfig {
    /// Create a config with defaults for everything but the TV identity.
    #[must_use]
    pub fn new(tv_ip: impl Into<String>, client_key: impl Into<String>) -> Self {
        Self {
            tv_ip: tv_ip.into(),
            client_key: client_key.into(),
            port: default_port(),
            bind: default_bind(),
            tv_secure: default_tv_secure(),
            tv_port: None,
            connect_timeout_ms: default_connect_timeout_ms(),
            command_timeout_ms: default_command_timeout_ms(),
            dry_run: false,
            gesture: GestureConfig::default(),
        }
    }

    /// Load and validate a JSON config file.
    ///
    /// # Errors
    /// Returns error if the file is unreadable, malformed, or invalid.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    /// Parse and validate a JSON document.
    ///
    /// # Errors
    /// Returns error if the document is malformed or invalid.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants serde cannot express.
    ///
    /// # Errors
    /// Returns `ConfigError::Invalid` describing the first violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tv_ip.trim().is_empty() {
            return Err(ConfigError::Invalid("tv_ip must not be empty".into()));
        }
        if self.client_key.trim().is_empty() {
            return Err(ConfigError::Invalid("client_key must not be empty".into()));
        }
        if self.gesture.long_press_ms < MIN_LONG_PRESS_MS {
            return Err(ConfigError::Invalid(format!(
                "gesture.long_press_ms must be at least {MIN_LONG_PRESS_MS}"
            )));
        }
        if self.gesture.tick_ms == 0 {
            return Err(ConfigError::Invalid("gesture.tick_ms must be positive".into()));
        }
        if self.connect_timeout_ms == 0 || self.command_timeout_ms == 0 {
            return Err(ConfigError::Invalid("timeouts must be positive".into()));
        }
        Ok(())
    }

    /// Address the HTTP server listens on.
    #[must_use]
    pub const fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    /// Port of the TV's control socket.
    #[must_use]
    pub const fn tv_port(&self) -> u16 {
        match self.tv_port {
            Some(port) => port,
            None if self.tv_secure => 3001,
            None => 3000,
        }
    }

    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    #[must_use]
    pub const fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}
