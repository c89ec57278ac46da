//! Publishing side of a channel.

use std::marker::PhantomData;
use std::sync::Arc;

use shmbridge_common::{Clock, Format, Message, StructType, encode, system_clock};

use crate::channel::ChannelSpec;
use crate::error::{ChannelError, Result};
use crate::hooks::{ChannelHooks, NoHooks, TransferEvent};
use crate::transport::{Transport, TransportWriter};

/// Options for [`Publisher::open_with`].
#[derive(Clone)]
pub struct PublisherOptions {
    pub format: Format,
    pub clock: Arc<dyn Clock>,
    pub hooks: Arc<dyn ChannelHooks>,
}

impl Default for PublisherOptions {
    fn default() -> Self {
        Self {
            format: Format::default(),
            clock: system_clock(),
            hooks: Arc::new(NoHooks),
        }
    }
}

impl std::fmt::Debug for PublisherOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublisherOptions")
            .field("format", &self.format)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

/// Typed writer bound to one topic.
pub struct Publisher<T: Message> {
    spec: ChannelSpec,
    writer: Box<dyn TransportWriter>,
    options: PublisherOptions,
    _marker: PhantomData<fn(&T)>,
}

impl<T: Message> Publisher<T> {
    /// Bind a writer with default options.
    pub fn open(transport: &dyn Transport, spec: ChannelSpec) -> Result<Self> {
        Self::open_with(transport, spec, PublisherOptions::default())
    }

    /// Bind a writer. Fails if the transport rejects the topic, type or QoS.
    pub fn open_with(
        transport: &dyn Transport,
        spec: ChannelSpec,
        options: PublisherOptions,
    ) -> Result<Self> {
        let writer = transport.open_writer(&spec.endpoint::<T>())?;

        tracing::info!(
            transport = transport.name(),
            domain_id = spec.domain_id,
            topic = %spec.topic,
            type_name = T::TYPE_NAME,
            shape = %T::SHAPE,
            "Publisher opened"
        );

        Ok(Self {
            spec,
            writer,
            options,
            _marker: PhantomData,
        })
    }

    pub fn spec(&self) -> &ChannelSpec {
        &self.spec
    }

    pub fn topic(&self) -> &str {
        &self.spec.topic
    }

    pub fn struct_type(&self) -> StructType {
        StructType::of::<T>()
    }

    /// Publish one payload, stamped with the current wall clock.
    ///
    /// The before hook runs first, the after hook only once the transport
    /// accepted the write. Transport errors, including a reliable write
    /// blocking past the QoS limit, are returned unchanged.
    pub fn write(&self, payload: &T) -> Result<()> {
        let source_timestamp = self.options.clock.now_nanos();
        let event = TransferEvent {
            topic: &self.spec.topic,
            source_timestamp,
        };

        self.options.hooks.before_transfer(&event);

        let bytes =
            encode(payload, self.options.format).map_err(|e| ChannelError::Serialization {
                topic: self.spec.topic.clone(),
                source: e,
            })?;
        self.writer.write(bytes, source_timestamp)?;

        self.options.hooks.after_transfer(&event);

        tracing::trace!(topic = %self.spec.topic, source_timestamp, "Published sample");
        Ok(())
    }

    /// Tell readers the topic's data is no longer valid.
    ///
    /// Subscribers skip the notification: it neither stores a sample nor
    /// counts as liveliness.
    pub fn dispose(&self) -> Result<()> {
        self.writer.dispose(self.options.clock.now_nanos())?;
        tracing::debug!(topic = %self.spec.topic, "Disposed topic");
        Ok(())
    }
}

impl<T: Message> std::fmt::Debug for Publisher<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("spec", &self.spec)
            .field("type_name", &T::TYPE_NAME)
            .field("format", &self.options.format)
            .finish()
    }
}
