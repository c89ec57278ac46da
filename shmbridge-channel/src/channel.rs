//! Types shared by publishers and subscribers.

use shmbridge_common::{Message, QosPolicy, StructType};

use crate::transport::TopicEndpoint;

/// Where a channel binds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSpec {
    pub domain_id: u32,
    pub topic: String,
    pub qos: QosPolicy,
}

impl ChannelSpec {
    /// Channel on `topic` with the default QoS.
    pub fn new(domain_id: u32, topic: impl Into<String>) -> Self {
        Self {
            domain_id,
            topic: topic.into(),
            qos: QosPolicy::default(),
        }
    }

    pub fn with_qos(mut self, qos: QosPolicy) -> Self {
        self.qos = qos;
        self
    }

    pub(crate) fn endpoint<T: Message>(&self) -> TopicEndpoint {
        TopicEndpoint {
            domain_id: self.domain_id,
            topic: self.topic.clone(),
            struct_type: StructType::of::<T>(),
            qos: self.qos,
        }
    }
}

/// A payload with the sender's timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample<T> {
    pub payload: T,
    /// Nanoseconds since the Unix epoch.
    pub source_timestamp: i64,
}

/// Connection state of a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelState {
    /// No valid sample received yet.
    Unconnected,
    /// Samples are arriving within the liveliness timeout.
    Connected,
    /// Samples were received but the last is older than the timeout.
    TimedOut,
}

impl ChannelState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelState::Unconnected => "unconnected",
            ChannelState::Connected => "connected",
            ChannelState::TimedOut => "timed_out",
        }
    }
}

impl std::fmt::Display for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
