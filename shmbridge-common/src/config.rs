use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::serialization::Format;

/// Which transport implementation channels are bound to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportBackend {
    /// Zenoh session (peer, client or router mode).
    #[default]
    Zenoh,
    /// In-process delivery, no broker or network involved.
    Loopback,
}

/// Transport connection configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Transport implementation to use.
    #[serde(default)]
    pub backend: TransportBackend,

    /// Zenoh mode: "client", "peer", or "router".
    #[serde(default = "default_mode")]
    pub mode: String,

    /// Endpoints to connect to (for client mode).
    #[serde(default)]
    pub connect: Vec<String>,

    /// Endpoints to listen on (for peer/router mode).
    #[serde(default)]
    pub listen: Vec<String>,

    /// Prefix prepended to every `<domain>/<topic>` key expression.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

fn default_mode() -> String {
    "peer".to_string()
}

fn default_key_prefix() -> String {
    crate::keyexpr::KEY_PREFIX.to_string()
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            backend: TransportBackend::default(),
            mode: default_mode(),
            connect: Vec::new(),
            listen: Vec::new(),
            key_prefix: default_key_prefix(),
        }
    }
}

/// Shared-memory broker supervision settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Run the supervisor at startup.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Broker executable name, also used as the process-name needle.
    #[serde(default = "default_executable")]
    pub executable: String,

    /// Absolute path of the broker configuration file passed with `-c`.
    #[serde(default = "default_broker_config_path")]
    pub config_path: PathBuf,

    /// Grace period between SIGTERM and SIGKILL for a mismatched broker.
    #[serde(default = "default_terminate_timeout")]
    pub terminate_timeout_ms: u64,

    /// Pause after launching before checking the broker is present.
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,

    /// Poll interval while waiting for a terminated broker to exit.
    #[serde(default = "default_exit_poll")]
    pub exit_poll_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_executable() -> String {
    "iox-roudi".to_string()
}

fn default_broker_config_path() -> PathBuf {
    PathBuf::from("/etc/iceoryx/roudi_config.toml")
}

fn default_terminate_timeout() -> u64 {
    3000
}

fn default_settle_delay() -> u64 {
    1000
}

fn default_exit_poll() -> u64 {
    50
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            executable: default_executable(),
            config_path: default_broker_config_path(),
            terminate_timeout_ms: default_terminate_timeout(),
            settle_delay_ms: default_settle_delay(),
            exit_poll_ms: default_exit_poll(),
        }
    }
}

impl BrokerConfig {
    pub fn terminate_timeout(&self) -> Duration {
        Duration::from_millis(self.terminate_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn exit_poll(&self) -> Duration {
        Duration::from_millis(self.exit_poll_ms)
    }
}

/// Defaults applied to every channel opened by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelDefaults {
    /// Silence after which a subscriber counts as timed out.
    #[serde(default = "default_liveliness_timeout")]
    pub liveliness_timeout_ms: u64,

    /// Poll interval of `wait_for_connection`.
    #[serde(default = "default_connection_poll")]
    pub connection_poll_ms: u64,

    /// Extra delay after the first sample before `wait_for_connection` returns.
    #[serde(default = "default_connection_settle")]
    pub connection_settle_ms: u64,

    /// Depth of the bounded-queue subscriber.
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

fn default_liveliness_timeout() -> u64 {
    1000
}

fn default_connection_poll() -> u64 {
    100
}

fn default_connection_settle() -> u64 {
    100
}

fn default_queue_depth() -> usize {
    1
}

impl Default for ChannelDefaults {
    fn default() -> Self {
        Self {
            liveliness_timeout_ms: default_liveliness_timeout(),
            connection_poll_ms: default_connection_poll(),
            connection_settle_ms: default_connection_settle(),
            queue_depth: default_queue_depth(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format (default).
    #[default]
    Text,
    /// Structured JSON format.
    Json,
}

/// Common logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format: "text" or "json".
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Base configuration shared by every host process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BaseConfig {
    /// Transport connection settings.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Broker supervision settings.
    #[serde(default)]
    pub broker: BrokerConfig,

    /// Channel defaults.
    #[serde(default)]
    pub channel: ChannelDefaults,

    /// Payload serialization format.
    #[serde(default)]
    pub serialization: Format,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Load a configuration file in JSON5 format.
pub fn load_config<T: for<'de> Deserialize<'de>>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!(
            "Failed to read config file '{}': {}",
            path.display(),
            e
        ))
    })?;

    json5::from_str(&content).map_err(|e| {
        Error::Config(format!(
            "Failed to parse config file '{}': {}",
            path.display(),
            e
        ))
    })
}

/// Load a configuration from a JSON5 string.
pub fn parse_config<T: for<'de> Deserialize<'de>>(content: &str) -> Result<T> {
    json5::from_str(content).map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
}
