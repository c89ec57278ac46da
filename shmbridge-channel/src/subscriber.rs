//! Subscribing side of a channel.
//!
//! Every subscriber owns a background drain thread that pulls samples from
//! the transport and stores them in the subscriber's [`SampleSink`]:
//!
//! ```text
//!   transport ──take──▶ drain thread ──store──▶ sink ◀──read── caller
//!                          │
//!                          ├─ skip invalid data (disposals)
//!                          ├─ record source timestamp (liveliness)
//!                          └─ before hook, store, after hook, open gate
//! ```
//!
//! The thread exits when the subscriber is closed or dropped, or when the
//! transport closes the reader.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use shmbridge_common::{ChannelDefaults, Clock, Format, Message, StructType, decode, system_clock};

use crate::channel::{ChannelSpec, ChannelState, Sample};
use crate::error::{ChannelError, Result, TransportError};
use crate::gate::ConnectionGate;
use crate::hooks::{ChannelHooks, NoHooks, TransferEvent};
use crate::liveliness::LivelinessMonitor;
use crate::sink::{SampleSink, SinkPolicy};
use crate::transport::{RawSample, Transport, TransportReader};

/// Options for [`Subscriber::open_with`].
#[derive(Clone)]
pub struct SubscriberOptions {
    pub format: Format,
    /// Silence after which the subscriber counts as timed out.
    pub liveliness_timeout: Duration,
    /// Poll interval of the connection wait.
    pub connection_poll: Duration,
    /// Pause after the first sample before the connection wait returns.
    pub connection_settle: Duration,
    /// Longest single wait of the drain thread, bounds shutdown latency.
    pub pull_timeout: Duration,
    /// Pause after each stored sample. `None` picks one per sink policy.
    pub yield_pause: Option<Duration>,
    pub clock: Arc<dyn Clock>,
    pub hooks: Arc<dyn ChannelHooks>,
}

impl Default for SubscriberOptions {
    fn default() -> Self {
        Self::from(&ChannelDefaults::default())
    }
}

impl From<&ChannelDefaults> for SubscriberOptions {
    fn from(defaults: &ChannelDefaults) -> Self {
        Self {
            format: Format::default(),
            liveliness_timeout: Duration::from_millis(defaults.liveliness_timeout_ms),
            connection_poll: Duration::from_millis(defaults.connection_poll_ms),
            connection_settle: Duration::from_millis(defaults.connection_settle_ms),
            pull_timeout: Duration::from_millis(50),
            yield_pause: None,
            clock: system_clock(),
            hooks: Arc::new(NoHooks),
        }
    }
}

impl std::fmt::Debug for SubscriberOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberOptions")
            .field("format", &self.format)
            .field("liveliness_timeout", &self.liveliness_timeout)
            .field("connection_poll", &self.connection_poll)
            .field("connection_settle", &self.connection_settle)
            .field("pull_timeout", &self.pull_timeout)
            .field("yield_pause", &self.yield_pause)
            .finish_non_exhaustive()
    }
}

fn default_yield_pause(policy: SinkPolicy) -> Duration {
    match policy {
        SinkPolicy::LatestValue => Duration::from_micros(100),
        SinkPolicy::BoundedQueue { .. } => Duration::from_millis(1),
    }
}

/// State shared between the subscriber and its drain thread.
struct Shared<T> {
    sink: SampleSink<T>,
    liveliness: LivelinessMonitor,
    gate: ConnectionGate,
    received: AtomicU64,
    discarded: AtomicU64,
    stop: AtomicBool,
}

/// Typed reader bound to one topic.
pub struct Subscriber<T: Message + Clone> {
    spec: ChannelSpec,
    shared: Arc<Shared<T>>,
    worker: Option<JoinHandle<()>>,
}

impl<T: Message + Clone> Subscriber<T> {
    /// Subscriber keeping only the most recent sample.
    pub fn latest(transport: &dyn Transport, spec: ChannelSpec) -> Result<Self> {
        Self::open_with(
            transport,
            spec,
            SinkPolicy::LatestValue,
            SubscriberOptions::default(),
        )
    }

    /// Subscriber with a single-slot queue that evicts the oldest sample.
    pub fn queue(transport: &dyn Transport, spec: ChannelSpec) -> Result<Self> {
        Self::open_with(
            transport,
            spec,
            SinkPolicy::single_slot_queue(),
            SubscriberOptions::default(),
        )
    }

    /// Bind a reader and start its drain thread.
    pub fn open_with(
        transport: &dyn Transport,
        spec: ChannelSpec,
        policy: SinkPolicy,
        options: SubscriberOptions,
    ) -> Result<Self> {
        let reader = transport.open_reader(&spec.endpoint::<T>())?;

        let shared = Arc::new(Shared {
            sink: SampleSink::new(policy),
            liveliness: LivelinessMonitor::new(options.liveliness_timeout, options.clock.clone()),
            gate: ConnectionGate::new(options.connection_poll, options.connection_settle),
            received: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
            stop: AtomicBool::new(false),
        });

        let drain = Drain {
            topic: spec.topic.clone(),
            reader,
            shared: shared.clone(),
            format: options.format,
            hooks: options.hooks,
            pull_timeout: options.pull_timeout,
            yield_pause: options
                .yield_pause
                .unwrap_or_else(|| default_yield_pause(policy)),
        };

        let worker = std::thread::Builder::new()
            .name(format!("drain:{}", spec.topic))
            .spawn(move || drain.run())
            .map_err(|e| ChannelError::Spawn {
                topic: spec.topic.clone(),
                source: e,
            })?;

        tracing::info!(
            transport = transport.name(),
            domain_id = spec.domain_id,
            topic = %spec.topic,
            type_name = T::TYPE_NAME,
            shape = %T::SHAPE,
            policy = policy.as_str(),
            "Subscriber opened"
        );

        Ok(Self {
            spec,
            shared,
            worker: Some(worker),
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

    pub fn policy(&self) -> SinkPolicy {
        self.shared.sink.policy()
    }

    /// Next sample per the sink policy.
    ///
    /// Latest value: a copy of the newest sample, repeatable. Bounded queue:
    /// the oldest queued sample, removed.
    pub fn read(&self) -> Option<Sample<T>> {
        self.shared.sink.read()
    }

    /// [`read`](Self::read) as a pair, with timestamp 0 when empty.
    pub fn read_with_timestamp(&self) -> (Option<T>, i64) {
        match self.read() {
            Some(sample) => (Some(sample.payload), sample.source_timestamp),
            None => (None, 0),
        }
    }

    /// Source timestamp of the last valid sample, 0 if none.
    pub fn last_received(&self) -> i64 {
        self.shared.liveliness.last_received()
    }

    /// Whether more than the liveliness timeout passed since the last
    /// sample. True before the first sample.
    pub fn is_timed_out(&self) -> bool {
        self.shared.liveliness.is_timed_out()
    }

    pub fn state(&self) -> ChannelState {
        if !self.shared.gate.is_open() {
            ChannelState::Unconnected
        } else if self.is_timed_out() {
            ChannelState::TimedOut
        } else {
            ChannelState::Connected
        }
    }

    /// Block until the first valid sample has been stored.
    ///
    /// Never returns if no publisher ever writes; prefer
    /// [`wait_for_connection_timeout`](Self::wait_for_connection_timeout).
    pub fn wait_for_connection(&self) {
        tracing::info!(topic = %self.spec.topic, "Waiting for connection");
        self.shared.gate.wait();
        tracing::info!(topic = %self.spec.topic, "Connected");
    }

    /// Block until the first valid sample, or fail after `limit`.
    pub fn wait_for_connection_timeout(&self, limit: Duration) -> Result<()> {
        if self.shared.gate.wait_timeout(limit) {
            tracing::info!(topic = %self.spec.topic, "Connected");
            Ok(())
        } else {
            tracing::warn!(
                topic = %self.spec.topic,
                waited_ms = limit.as_millis() as u64,
                "No sample before connection deadline"
            );
            Err(ChannelError::ConnectionTimeout {
                topic: self.spec.topic.clone(),
                waited: limit,
            })
        }
    }

    /// Valid samples stored so far.
    pub fn received_count(&self) -> u64 {
        self.shared.received.load(Ordering::Relaxed)
    }

    /// Invalid or undecodable samples skipped so far.
    pub fn discarded_count(&self) -> u64 {
        self.shared.discarded.load(Ordering::Relaxed)
    }

    /// Stop the drain thread and wait for it to exit. Idempotent.
    ///
    /// Samples already stored stay readable.
    pub fn close(&mut self) {
        self.shared.stop.store(true, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!(topic = %self.spec.topic, "Drain thread panicked");
            }
            tracing::debug!(topic = %self.spec.topic, "Subscriber closed");
        }
    }
}

impl<T: Message + Clone> Drop for Subscriber<T> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<T: Message + Clone> std::fmt::Debug for Subscriber<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber")
            .field("spec", &self.spec)
            .field("type_name", &T::TYPE_NAME)
            .field("policy", &self.policy())
            .field("state", &self.state())
            .finish()
    }
}

/// Background loop moving samples from the transport into the sink.
struct Drain<T> {
    topic: String,
    reader: Box<dyn TransportReader>,
    shared: Arc<Shared<T>>,
    format: Format,
    hooks: Arc<dyn ChannelHooks>,
    pull_timeout: Duration,
    yield_pause: Duration,
}

impl<T: Message + Clone> Drain<T> {
    fn run(mut self) {
        tracing::debug!(topic = %self.topic, "Drain thread started");

        while !self.shared.stop.load(Ordering::Acquire) {
            match self.reader.take(self.pull_timeout) {
                Ok(Some(sample)) => self.handle(sample),
                Ok(None) => {}
                Err(TransportError::Closed) => {
                    tracing::debug!(topic = %self.topic, "Reader closed by transport");
                    break;
                }
                Err(e) => {
                    tracing::warn!(topic = %self.topic, error = %e, "Failed to take sample");
                    std::thread::sleep(self.pull_timeout);
                }
            }
        }

        self.reader.close();
        tracing::debug!(topic = %self.topic, "Drain thread stopped");
    }

    fn handle(&self, raw: RawSample) {
        if !raw.valid_data {
            tracing::trace!(topic = %self.topic, "Skipping invalid-data sample");
            self.shared.discarded.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let payload: T = match decode(&raw.payload, self.format) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(topic = %self.topic, error = %e, "Failed to decode sample");
                self.shared.discarded.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        let source_timestamp = raw.source_timestamp;
        self.shared.liveliness.record(source_timestamp);

        let event = TransferEvent {
            topic: &self.topic,
            source_timestamp,
        };
        self.hooks.before_transfer(&event);

        if let Some(evicted) = self.shared.sink.store(Sample {
            payload,
            source_timestamp,
        }) {
            tracing::trace!(
                topic = %self.topic,
                evicted = evicted.source_timestamp,
                "Replaced unread sample"
            );
        }

        self.hooks.after_transfer(&event);
        self.shared.gate.mark_observed();
        self.shared.received.fetch_add(1, Ordering::Relaxed);

        std::thread::sleep(self.yield_pause);
    }
}
