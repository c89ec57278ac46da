//! Zenoh-backed transport.
//!
//! Each `(domain, topic)` maps onto `<prefix>/<domain>/<topic>`. The source
//! timestamp travels as an 8-byte little-endian attachment, and disposals are
//! Zenoh deletes, which readers surface as invalid-data samples. Readers
//! buffer into a ring sized by the QoS history depth, dropping the oldest
//! sample when full.

use std::time::{Duration, Instant};

use shmbridge_common::{Reliability, TopicKeyBuilder, TransportConfig, current_timestamp_nanos};
use zenoh::Session;
use zenoh::Wait;
use zenoh::bytes::ZBytes;
use zenoh::handlers::{RingChannel, RingChannelHandler};
use zenoh::pubsub::{Publisher, Subscriber};
use zenoh::qos::{self, CongestionControl};
use zenoh::sample::{Sample, SampleKind};

use super::{RawSample, TopicEndpoint, Transport, TransportReader, TransportWriter};
use crate::error::TransportError;

/// Transport over a Zenoh session.
#[derive(Debug, Clone)]
pub struct ZenohTransport {
    session: Session,
    keys: TopicKeyBuilder,
}

impl ZenohTransport {
    /// Open a session from the transport configuration.
    pub fn connect(config: &TransportConfig) -> Result<Self, TransportError> {
        let session = shmbridge_common::connect(config).map_err(|e| TransportError::Bind {
            domain_id: 0,
            topic: config.key_prefix.clone(),
            message: e.to_string(),
        })?;
        Ok(Self::with_session(session, &config.key_prefix))
    }

    /// Wrap an already open session.
    pub fn with_session(session: Session, key_prefix: &str) -> Self {
        Self {
            session,
            keys: TopicKeyBuilder::new(key_prefix),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    fn key(&self, endpoint: &TopicEndpoint) -> Result<String, TransportError> {
        self.keys
            .build(endpoint.domain_id, &endpoint.topic)
            .map_err(|e| TransportError::bind(endpoint.domain_id, &endpoint.topic, e))
    }
}

impl Transport for ZenohTransport {
    fn name(&self) -> &'static str {
        "zenoh"
    }

    fn open_writer(
        &self,
        endpoint: &TopicEndpoint,
    ) -> Result<Box<dyn TransportWriter>, TransportError> {
        let key = self.key(endpoint)?;
        let reliability = endpoint.qos.reliability;

        let congestion = if reliability.may_block() {
            CongestionControl::Block
        } else {
            CongestionControl::Drop
        };

        let publisher = self
            .session
            .declare_publisher(key.clone())
            .congestion_control(congestion)
            .reliability(zenoh_reliability(reliability))
            .wait()
            .map_err(|e| TransportError::bind(endpoint.domain_id, &endpoint.topic, e))?;

        tracing::debug!(
            key = %key,
            type_name = endpoint.struct_type.name,
            "Declared publisher"
        );

        Ok(Box::new(ZenohWriter {
            publisher,
            topic: endpoint.topic.clone(),
            max_blocking_time: reliability.max_blocking_time(),
            may_block: reliability.may_block(),
        }))
    }

    fn open_reader(
        &self,
        endpoint: &TopicEndpoint,
    ) -> Result<Box<dyn TransportReader>, TransportError> {
        let key = self.key(endpoint)?;
        let depth = endpoint.qos.history_depth.get();

        let subscriber = self
            .session
            .declare_subscriber(key.clone())
            .with(RingChannel::new(depth))
            .wait()
            .map_err(|e| TransportError::bind(endpoint.domain_id, &endpoint.topic, e))?;

        tracing::debug!(
            key = %key,
            type_name = endpoint.struct_type.name,
            depth,
            "Declared subscriber"
        );

        Ok(Box::new(ZenohReader {
            subscriber: Some(subscriber),
            topic: endpoint.topic.clone(),
        }))
    }
}

struct ZenohWriter {
    publisher: Publisher<'static>,
    topic: String,
    max_blocking_time: Duration,
    may_block: bool,
}

impl ZenohWriter {
    fn check_blocking(&self, started: Instant) -> Result<(), TransportError> {
        let elapsed = started.elapsed();
        if self.may_block && elapsed > self.max_blocking_time {
            tracing::warn!(
                topic = %self.topic,
                elapsed_ms = elapsed.as_millis() as u64,
                max_blocking_ms = self.max_blocking_time.as_millis() as u64,
                "Write blocked longer than allowed"
            );
            return Err(TransportError::BlockingTimeout {
                topic: self.topic.clone(),
                max_blocking_time: self.max_blocking_time,
            });
        }
        Ok(())
    }

    fn write_error(&self, e: impl ToString) -> TransportError {
        TransportError::Write {
            topic: self.topic.clone(),
            message: e.to_string(),
        }
    }
}

impl TransportWriter for ZenohWriter {
    fn write(&self, payload: Vec<u8>, source_timestamp: i64) -> Result<(), TransportError> {
        let started = Instant::now();
        self.publisher
            .put(payload)
            .attachment(ZBytes::from(source_timestamp.to_le_bytes().to_vec()))
            .wait()
            .map_err(|e| self.write_error(e))?;
        self.check_blocking(started)
    }

    fn dispose(&self, source_timestamp: i64) -> Result<(), TransportError> {
        self.publisher
            .delete()
            .attachment(ZBytes::from(source_timestamp.to_le_bytes().to_vec()))
            .wait()
            .map_err(|e| self.write_error(e))
    }
}

struct ZenohReader {
    subscriber: Option<Subscriber<RingChannelHandler<Sample>>>,
    topic: String,
}

impl TransportReader for ZenohReader {
    fn take(&mut self, timeout: Duration) -> Result<Option<RawSample>, TransportError> {
        let Some(subscriber) = &self.subscriber else {
            return Err(TransportError::Closed);
        };

        match subscriber.recv_timeout(timeout) {
            Ok(Some(sample)) => Ok(Some(raw_sample(&sample))),
            Ok(None) => Ok(None),
            Err(e) => {
                tracing::debug!(topic = %self.topic, error = %e, "Subscriber channel closed");
                Err(TransportError::Closed)
            }
        }
    }

    fn close(&mut self) {
        if let Some(subscriber) = self.subscriber.take()
            && let Err(e) = subscriber.undeclare().wait()
        {
            tracing::warn!(topic = %self.topic, error = %e, "Failed to undeclare subscriber");
        }
    }
}

fn zenoh_reliability(reliability: Reliability) -> qos::Reliability {
    match reliability {
        Reliability::Reliable { .. } => qos::Reliability::Reliable,
        Reliability::BestEffort => qos::Reliability::BestEffort,
    }
}

fn raw_sample(sample: &Sample) -> RawSample {
    let source_timestamp = sample
        .attachment()
        .and_then(|a| decode_timestamp(&a.to_bytes()))
        .unwrap_or_else(current_timestamp_nanos);

    match sample.kind() {
        SampleKind::Put => RawSample::data(sample.payload().to_bytes().into_owned(), source_timestamp),
        SampleKind::Delete => RawSample::disposed(source_timestamp),
    }
}

fn decode_timestamp(bytes: &[u8]) -> Option<i64> {
    let raw: [u8; 8] = bytes.try_into().ok()?;
    Some(i64::from_le_bytes(raw))
}
