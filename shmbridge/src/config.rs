//! Host configuration.

use std::path::Path;

use serde::de::DeserializeOwned;
use shmbridge_common::{
    BaseConfig, BrokerConfig, ChannelDefaults, Format, LoggingConfig, TransportConfig,
};

use crate::error::{HostError, Result};

/// Configuration of the `shmbridge` host.
pub type AppConfig = BaseConfig;

/// Trait for host configuration types.
///
/// Gives loading with "file not found" detection and a validation hook on
/// top of the shared configuration sections.
pub trait HostConfig: Sized + DeserializeOwned {
    fn transport(&self) -> &TransportConfig;

    fn broker(&self) -> &BrokerConfig;

    fn channel(&self) -> &ChannelDefaults;

    fn serialization(&self) -> Format;

    fn logging(&self) -> &LoggingConfig;

    /// Validate the configuration.
    ///
    /// Called automatically after loading.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Load configuration from a JSON5 file, then validate it.
    fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(HostError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let config: Self = shmbridge_common::load_config(path)?;
        config.validate()?;

        Ok(config)
    }
}

impl HostConfig for AppConfig {
    fn transport(&self) -> &TransportConfig {
        &self.transport
    }

    fn broker(&self) -> &BrokerConfig {
        &self.broker
    }

    fn channel(&self) -> &ChannelDefaults {
        &self.channel
    }

    fn serialization(&self) -> Format {
        self.serialization
    }

    fn logging(&self) -> &LoggingConfig {
        &self.logging
    }

    fn validate(&self) -> Result<()> {
        if self.broker.enabled && self.broker.executable.trim().is_empty() {
            return Err(HostError::validation("broker.executable must not be empty"));
        }
        if self.channel.queue_depth == 0 {
            return Err(HostError::validation("channel.queue_depth must be at least 1"));
        }
        if self.channel.connection_poll_ms == 0 {
            return Err(HostError::validation(
                "channel.connection_poll_ms must be at least 1",
            ));
        }
        if self.transport.key_prefix.trim().is_empty() {
            return Err(HostError::validation("transport.key_prefix must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_config_not_found() {
        let result = AppConfig::load("/nonexistent/shmbridge.json5");
        assert!(matches!(result, Err(HostError::ConfigNotFound { .. })));
    }

    #[test]
    fn test_load_valid_config() {
        let file = write_config(
            r#"{
                transport: { backend: "loopback" },
                broker: { executable: "iox-roudi", config_path: "/opt/roudi.toml" },
                channel: { queue_depth: 4 },
            }"#,
        );

        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.channel().queue_depth, 4);
        assert_eq!(
            config.broker().config_path,
            std::path::PathBuf::from("/opt/roudi.toml")
        );
    }

    #[test]
    fn test_validation_rejects_zero_queue_depth() {
        let file = write_config("{ channel: { queue_depth: 0 } }");
        let result = AppConfig::load(file.path());
        assert!(matches!(result, Err(HostError::ConfigValidation(_))));
    }

    #[test]
    fn test_validation_rejects_empty_executable() {
        let file = write_config(r#"{ broker: { executable: " " } }"#);
        let result = AppConfig::load(file.path());
        assert!(matches!(result, Err(HostError::ConfigValidation(_))));
    }
}
