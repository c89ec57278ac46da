//! Error types for channels and the transport boundary.

use std::time::Duration;

use thiserror::Error;

/// Result type alias using [`ChannelError`].
pub type Result<T> = std::result::Result<T, ChannelError>;

/// Errors raised by a transport implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The transport could not bind the domain/topic/type/QoS combination.
    #[error("Failed to bind {topic} in domain {domain_id}: {message}")]
    Bind {
        domain_id: u32,
        topic: String,
        message: String,
    },

    /// A reliable write waited longer than the QoS allows.
    #[error("Write to {topic} blocked longer than {max_blocking_time:?}")]
    BlockingTimeout {
        topic: String,
        max_blocking_time: Duration,
    },

    /// A write was rejected.
    #[error("Failed to write to {topic}: {message}")]
    Write { topic: String, message: String },

    /// Pulling the next sample failed.
    #[error("Failed to receive from {topic}: {message}")]
    Receive { topic: String, message: String },

    /// The endpoint was closed and will deliver nothing more.
    #[error("Endpoint closed")]
    Closed,
}

impl TransportError {
    pub fn bind(domain_id: u32, topic: impl Into<String>, message: impl ToString) -> Self {
        Self::Bind {
            domain_id,
            topic: topic.into(),
            message: message.to_string(),
        }
    }
}

/// Errors that can occur on a channel.
#[derive(Error, Debug)]
pub enum ChannelError {
    /// Error from the transport, surfaced unchanged.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Payload encoding failed.
    #[error("Serialization error on {topic}: {source}")]
    Serialization {
        topic: String,
        #[source]
        source: shmbridge_common::Error,
    },

    /// `wait_for_connection_timeout` gave up.
    #[error("No sample on {topic} within {waited:?}")]
    ConnectionTimeout { topic: String, waited: Duration },

    /// The drain thread could not be started.
    #[error("Failed to spawn drain thread for {topic}: {source}")]
    Spawn {
        topic: String,
        #[source]
        source: std::io::Error,
    },
}

impl ChannelError {
    /// Whether this is a write that exceeded the QoS blocking time.
    pub fn is_blocking_timeout(&self) -> bool {
        matches!(
            self,
            ChannelError::Transport(TransportError::BlockingTimeout { .. })
        )
    }
}
