//! Error types for the host process.

use thiserror::Error;

/// Result type alias using [`HostError`].
pub type Result<T> = std::result::Result<T, HostError>;

/// Errors that can occur while setting up the host.
#[derive(Error, Debug)]
pub enum HostError {
    /// Configuration file not found.
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Configuration validation error.
    #[error("Configuration validation failed: {0}")]
    ConfigValidation(String),

    /// Configuration could not be read or parsed.
    #[error(transparent)]
    Common(#[from] shmbridge_common::Error),

    /// A channel could not be opened or used.
    #[error(transparent)]
    Channel(#[from] shmbridge_channel::ChannelError),
}

impl HostError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ConfigValidation(msg.into())
    }
}
