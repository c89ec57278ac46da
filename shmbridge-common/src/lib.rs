//! shmbridge Common Library
//!
//! This crate provides shared types and utilities for the shmbridge crates:
//!
//! - [`config`] - Configuration loading (JSON5 format)
//! - [`qos`] - Channel QoS policy (`QosPolicy`, `Reliability`, `Durability`)
//! - [`message`] - Payload types and their declared shapes
//! - [`serialization`] - JSON/CBOR payload encoding
//! - [`keyexpr`] - Mapping of `(domain, topic)` onto key expressions
//! - [`session`] - Zenoh session management
//! - [`clock`] - Wall clock seam for timestamps
//! - [`error`] - Error types

pub mod clock;
pub mod config;
pub mod error;
pub mod keyexpr;
pub mod message;
pub mod qos;
pub mod serialization;
pub mod session;

// Re-export commonly used types at the crate root
pub use clock::{Clock, ManualClock, SystemClock, current_timestamp_nanos, system_clock};
pub use config::{
    BaseConfig, BrokerConfig, ChannelDefaults, LogFormat, LoggingConfig, TransportBackend,
    TransportConfig, load_config, parse_config,
};
pub use error::{Error, Result};
pub use keyexpr::{KEY_PREFIX, TopicKeyBuilder, parse_topic_key, validate_topic};
pub use message::{
    ByteArray, CameraFrame, DualArmCommand, DualArmState, FloatArray, Message, PayloadShape,
    StructType,
};
pub use qos::{Durability, QosPolicy, Reliability};
pub use serialization::{Format, decode, encode};
pub use session::connect;

/// Initialize tracing with the given configuration.
///
/// Only host binaries call this; library code logs through `tracing` and
/// leaves the choice of subscriber to the process that embeds it.
///
/// # Example
///
/// ```ignore
/// use shmbridge_common::{LoggingConfig, LogFormat, init_tracing};
///
/// let config = LoggingConfig {
///     level: "info".to_string(),
///     format: LogFormat::Json,
/// };
/// init_tracing(&config)?;
/// ```
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_thread_names(true))
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
    }

    Ok(())
}
