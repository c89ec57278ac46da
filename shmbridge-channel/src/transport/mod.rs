//! Boundary to the underlying pub/sub transport.
//!
//! Channels only need four things from a transport: open a writer, open a
//! reader, write one payload, and pull the next sample. Payloads cross the
//! boundary already encoded; the transport never sees message types beyond
//! the name it registers the topic with.

mod loopback;
mod zenoh_transport;

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use shmbridge_common::{QosPolicy, StructType, TransportBackend, TransportConfig};

use crate::error::TransportError;

pub use self::loopback::LoopbackTransport;
pub use self::zenoh_transport::ZenohTransport;

/// One delivery from the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSample {
    /// Encoded payload. Empty for invalid-data notifications.
    pub payload: Vec<u8>,
    /// Sender wall clock, nanoseconds since the Unix epoch.
    pub source_timestamp: i64,
    /// False for disposals and other notifications that carry no data.
    pub valid_data: bool,
}

impl RawSample {
    pub fn data(payload: Vec<u8>, source_timestamp: i64) -> Self {
        Self {
            payload,
            source_timestamp,
            valid_data: true,
        }
    }

    pub fn disposed(source_timestamp: i64) -> Self {
        Self {
            payload: Vec::new(),
            source_timestamp,
            valid_data: false,
        }
    }
}

/// Identity of a transport endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicEndpoint {
    pub domain_id: u32,
    pub topic: String,
    pub struct_type: StructType,
    pub qos: QosPolicy,
}

/// Write side of a bound endpoint.
pub trait TransportWriter: Send + Sync {
    /// Deliver one encoded payload. Blocks at most the QoS
    /// `max_blocking_time`.
    fn write(&self, payload: Vec<u8>, source_timestamp: i64) -> Result<(), TransportError>;

    /// Send an invalid-data notification for the topic.
    fn dispose(&self, source_timestamp: i64) -> Result<(), TransportError>;
}

/// Read side of a bound endpoint.
pub trait TransportReader: Send {
    /// Wait up to `timeout` for the next sample, in delivery order.
    ///
    /// `Ok(None)` means nothing arrived in time. `Err(TransportError::Closed)`
    /// means nothing ever will.
    fn take(&mut self, timeout: Duration) -> Result<Option<RawSample>, TransportError>;

    /// Stop delivery. Later `take` calls return `Closed` once drained.
    fn close(&mut self) {}
}

/// A pub/sub transport.
pub trait Transport: Send + Sync + Debug {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    fn open_writer(&self, endpoint: &TopicEndpoint)
    -> Result<Box<dyn TransportWriter>, TransportError>;

    fn open_reader(&self, endpoint: &TopicEndpoint)
    -> Result<Box<dyn TransportReader>, TransportError>;
}

/// Open the transport selected by the configuration.
pub fn open_transport(config: &TransportConfig) -> Result<Arc<dyn Transport>, TransportError> {
    match config.backend {
        TransportBackend::Zenoh => Ok(Arc::new(ZenohTransport::connect(config)?)),
        TransportBackend::Loopback => Ok(Arc::new(LoopbackTransport::new())),
    }
}
