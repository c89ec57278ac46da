//! Publisher and subscriber channels over a pluggable pub/sub transport.
//!
//! - [`Publisher`] - typed writer with pre/post transfer hooks
//! - [`Subscriber`] - typed reader with a background drain thread, in
//!   latest-value or bounded-queue flavour ([`SinkPolicy`])
//! - [`transport`] - the transport boundary, with Zenoh and in-process
//!   backends
//!
//! Subscribers expose connection-lifecycle queries: whether any sample has
//! arrived yet ([`Subscriber::wait_for_connection`]), and whether the
//! publisher has gone quiet ([`Subscriber::is_timed_out`]).
//!
//! # Example
//!
//! ```ignore
//! use shmbridge_channel::{ChannelFactory, ChannelSpec, LoopbackTransport};
//! use shmbridge_common::FloatArray;
//!
//! let factory = ChannelFactory::new(Arc::new(LoopbackTransport::new()));
//! let publisher = factory.publisher::<FloatArray>(ChannelSpec::new(0, "rt/joints"))?;
//! let subscriber = factory.latest_subscriber::<FloatArray>(ChannelSpec::new(0, "rt/joints"))?;
//!
//! publisher.write(&FloatArray::new(vec![0.1, 0.2], 0.0))?;
//! subscriber.wait_for_connection_timeout(Duration::from_secs(1))?;
//! let (payload, ts) = subscriber.read_with_timestamp();
//! ```

mod channel;
pub mod error;
mod gate;
mod hooks;
mod liveliness;
mod publisher;
mod sink;
mod subscriber;
pub mod transport;

use std::num::NonZeroUsize;
use std::sync::Arc;

use shmbridge_common::{ChannelDefaults, Format, Message};

pub use channel::{ChannelSpec, ChannelState, Sample};
pub use error::{ChannelError, Result, TransportError};
pub use gate::ConnectionGate;
pub use hooks::{ChannelHooks, NoHooks, TransferEvent};
pub use liveliness::LivelinessMonitor;
pub use publisher::{Publisher, PublisherOptions};
pub use sink::{SampleSink, SinkPolicy};
pub use subscriber::{Subscriber, SubscriberOptions};
pub use transport::{
    LoopbackTransport, RawSample, TopicEndpoint, Transport, TransportReader, TransportWriter,
    ZenohTransport, open_transport,
};

/// Opens channels on one transport with host-wide defaults.
#[derive(Debug, Clone)]
pub struct ChannelFactory {
    transport: Arc<dyn Transport>,
    defaults: ChannelDefaults,
    format: Format,
}

impl ChannelFactory {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_defaults(transport, ChannelDefaults::default(), Format::default())
    }

    pub fn with_defaults(
        transport: Arc<dyn Transport>,
        defaults: ChannelDefaults,
        format: Format,
    ) -> Self {
        Self {
            transport,
            defaults,
            format,
        }
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn defaults(&self) -> &ChannelDefaults {
        &self.defaults
    }

    pub fn publisher_options(&self) -> PublisherOptions {
        PublisherOptions {
            format: self.format,
            ..PublisherOptions::default()
        }
    }

    pub fn subscriber_options(&self) -> SubscriberOptions {
        SubscriberOptions {
            format: self.format,
            ..SubscriberOptions::from(&self.defaults)
        }
    }

    pub fn publisher<T: Message>(&self, spec: ChannelSpec) -> Result<Publisher<T>> {
        Publisher::open_with(self.transport.as_ref(), spec, self.publisher_options())
    }

    pub fn latest_subscriber<T: Message + Clone>(&self, spec: ChannelSpec) -> Result<Subscriber<T>> {
        Subscriber::open_with(
            self.transport.as_ref(),
            spec,
            SinkPolicy::LatestValue,
            self.subscriber_options(),
        )
    }

    /// Bounded-queue subscriber with the configured depth (at least 1).
    pub fn queue_subscriber<T: Message + Clone>(&self, spec: ChannelSpec) -> Result<Subscriber<T>> {
        let depth = NonZeroUsize::new(self.defaults.queue_depth).unwrap_or(NonZeroUsize::MIN);
        Subscriber::open_with(
            self.transport.as_ref(),
            spec,
            SinkPolicy::BoundedQueue { depth },
            self.subscriber_options(),
        )
    }
}
