//! Publisher/subscriber behaviour over the in-process transport.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use shmbridge_channel::{
    ChannelError, ChannelFactory, ChannelHooks, ChannelSpec, ChannelState, LoopbackTransport,
    Publisher, PublisherOptions, RawSample, SinkPolicy, Subscriber, SubscriberOptions,
    TopicEndpoint, TransferEvent, Transport, TransportError, TransportReader, TransportWriter,
};
use shmbridge_common::{ByteArray, ChannelDefaults, FloatArray, Format, ManualClock};

const MS: i64 = 1_000_000;

fn spec(topic: &str) -> ChannelSpec {
    ChannelSpec::new(0, topic)
}

fn fast_options(clock: Arc<ManualClock>) -> SubscriberOptions {
    SubscriberOptions {
        connection_poll: Duration::from_millis(5),
        connection_settle: Duration::ZERO,
        pull_timeout: Duration::from_millis(5),
        yield_pause: Some(Duration::ZERO),
        clock,
        ..SubscriberOptions::default()
    }
}

fn publisher_on(
    transport: &LoopbackTransport,
    topic: &str,
    clock: Arc<ManualClock>,
) -> Publisher<FloatArray> {
    Publisher::open_with(
        transport,
        spec(topic),
        PublisherOptions {
            clock,
            ..PublisherOptions::default()
        },
    )
    .unwrap()
}

fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(1));
    }
}

fn frame(value: f64) -> FloatArray {
    FloatArray::new(vec![value], 0.0)
}

#[test]
fn test_latest_value_keeps_newest() {
    let transport = LoopbackTransport::new();
    let clock = Arc::new(ManualClock::new(1));
    let subscriber: Subscriber<FloatArray> = Subscriber::open_with(
        &transport,
        spec("rt/latest"),
        SinkPolicy::LatestValue,
        fast_options(clock.clone()),
    )
    .unwrap();
    let publisher = publisher_on(&transport, "rt/latest", clock.clone());

    assert_eq!(subscriber.read_with_timestamp(), (None, 0));

    publisher.write(&frame(1.0)).unwrap();
    wait_until("first sample", || subscriber.received_count() == 1);
    clock.set(2);
    publisher.write(&frame(2.0)).unwrap();
    wait_until("second sample", || subscriber.received_count() == 2);

    let (payload, ts) = subscriber.read_with_timestamp();
    assert_eq!(payload, Some(frame(2.0)));
    assert_eq!(ts, 2);

    // Latest value reads are repeatable.
    assert_eq!(subscriber.read_with_timestamp(), (Some(frame(2.0)), 2));
}

#[test]
fn test_queue_evicts_oldest_and_pops() {
    let transport = LoopbackTransport::new();
    let clock = Arc::new(ManualClock::new(1));
    let subscriber: Subscriber<FloatArray> = Subscriber::open_with(
        &transport,
        spec("rt/queue"),
        SinkPolicy::single_slot_queue(),
        fast_options(clock.clone()),
    )
    .unwrap();
    let publisher = publisher_on(&transport, "rt/queue", clock.clone());

    publisher.write(&frame(1.0)).unwrap();
    wait_until("first sample", || subscriber.received_count() == 1);
    clock.set(2);
    publisher.write(&frame(2.0)).unwrap();
    wait_until("second sample", || subscriber.received_count() == 2);

    let sample = subscriber.read().unwrap();
    assert_eq!(sample.payload, frame(2.0));
    assert_eq!(sample.source_timestamp, 2);
    assert_eq!(subscriber.read(), None);
    assert_eq!(subscriber.read_with_timestamp(), (None, 0));
}

fn policies() -> [SinkPolicy; 2] {
    [SinkPolicy::LatestValue, SinkPolicy::single_slot_queue()]
}

#[test]
fn test_liveliness_follows_source_timestamps() {
    for policy in policies() {
        let transport = LoopbackTransport::new();
        let clock = Arc::new(ManualClock::new(10_000 * MS));
        let subscriber: Subscriber<FloatArray> = Subscriber::open_with(
            &transport,
            spec("rt/alive"),
            policy,
            fast_options(clock.clone()),
        )
        .unwrap();
        let publisher = publisher_on(&transport, "rt/alive", clock.clone());

        assert!(subscriber.is_timed_out(), "{policy:?}");
        assert_eq!(subscriber.state(), ChannelState::Unconnected, "{policy:?}");

        publisher.write(&frame(1.0)).unwrap();
        wait_until("sample", || subscriber.received_count() == 1);

        assert_eq!(subscriber.last_received(), 10_000 * MS, "{policy:?}");
        assert!(!subscriber.is_timed_out(), "{policy:?}");
        assert_eq!(subscriber.state(), ChannelState::Connected, "{policy:?}");

        // Reading does not count as liveliness.
        subscriber.read();
        clock.advance(Duration::from_millis(1001));
        assert!(subscriber.is_timed_out(), "{policy:?}");
        assert_eq!(subscriber.state(), ChannelState::TimedOut, "{policy:?}");

        publisher.write(&frame(2.0)).unwrap();
        wait_until("second sample", || subscriber.received_count() == 2);
        assert!(!subscriber.is_timed_out(), "{policy:?}");
    }
}

#[test]
fn test_dispose_is_skipped() {
    for policy in policies() {
        let transport = LoopbackTransport::new();
        let clock = Arc::new(ManualClock::new(5 * MS));
        let subscriber: Subscriber<FloatArray> = Subscriber::open_with(
            &transport,
            spec("rt/dispose"),
            policy,
            fast_options(clock.clone()),
        )
        .unwrap();
        let publisher = publisher_on(&transport, "rt/dispose", clock.clone());

        publisher.dispose().unwrap();
        wait_until("discard", || subscriber.discarded_count() == 1);

        assert_eq!(subscriber.received_count(), 0, "{policy:?}");
        assert_eq!(subscriber.last_received(), 0, "{policy:?}");
        assert_eq!(subscriber.read(), None, "{policy:?}");
        assert_eq!(subscriber.read_with_timestamp(), (None, 0), "{policy:?}");
        assert_eq!(subscriber.state(), ChannelState::Unconnected, "{policy:?}");
    }
}

#[test]
fn test_undecodable_payload_is_discarded() {
    for policy in policies() {
        let transport = LoopbackTransport::new();
        let clock = Arc::new(ManualClock::new(7 * MS));
        let subscriber: Subscriber<FloatArray> = Subscriber::open_with(
            &transport,
            spec("rt/format"),
            policy,
            fast_options(clock.clone()),
        )
        .unwrap();
        let publisher: Publisher<FloatArray> = Publisher::open_with(
            &transport,
            spec("rt/format"),
            PublisherOptions {
                format: Format::Json,
                clock,
                ..PublisherOptions::default()
            },
        )
        .unwrap();

        publisher.write(&frame(1.0)).unwrap();
        wait_until("discard", || subscriber.discarded_count() == 1);

        assert_eq!(subscriber.received_count(), 0, "{policy:?}");
        assert_eq!(subscriber.last_received(), 0, "{policy:?}");
        assert_eq!(subscriber.read(), None, "{policy:?}");
    }
}

#[test]
fn test_wait_for_connection_returns_after_first_sample() {
    let transport = LoopbackTransport::new();
    let subscriber: Subscriber<FloatArray> = Subscriber::open_with(
        &transport,
        spec("rt/connect"),
        SinkPolicy::LatestValue,
        SubscriberOptions {
            connection_poll: Duration::from_millis(10),
            connection_settle: Duration::from_millis(20),
            pull_timeout: Duration::from_millis(5),
            ..SubscriberOptions::default()
        },
    )
    .unwrap();
    let publisher: Publisher<FloatArray> = Publisher::open(&transport, spec("rt/connect")).unwrap();

    let writer = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(30));
        publisher.write(&frame(1.0)).unwrap();
        publisher
    });

    let started = Instant::now();
    subscriber.wait_for_connection();
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_millis(50), "returned after {elapsed:?}");
    assert!(subscriber.read().is_some());
    writer.join().unwrap();
}

#[test]
fn test_wait_for_connection_timeout_fails_without_publisher() {
    let transport = LoopbackTransport::new();
    let subscriber: Subscriber<FloatArray> = Subscriber::open_with(
        &transport,
        spec("rt/silent"),
        SinkPolicy::LatestValue,
        fast_options(Arc::new(ManualClock::new(0))),
    )
    .unwrap();

    let err = subscriber
        .wait_for_connection_timeout(Duration::from_millis(30))
        .unwrap_err();
    assert!(matches!(err, ChannelError::ConnectionTimeout { .. }));
}

#[test]
fn test_type_conflict_is_a_bind_error() {
    let transport = LoopbackTransport::new();
    let _publisher: Publisher<FloatArray> = Publisher::open(&transport, spec("rt/typed")).unwrap();

    let err = Subscriber::<ByteArray>::latest(&transport, spec("rt/typed")).unwrap_err();
    assert!(matches!(
        err,
        ChannelError::Transport(TransportError::Bind { .. })
    ));
}

#[derive(Default)]
struct RecordingHooks {
    events: Mutex<Vec<(&'static str, i64)>>,
}

impl ChannelHooks for RecordingHooks {
    fn before_transfer(&self, event: &TransferEvent<'_>) {
        self.events.lock().push(("before", event.source_timestamp));
    }

    fn after_transfer(&self, event: &TransferEvent<'_>) {
        self.events.lock().push(("after", event.source_timestamp));
    }
}

#[test]
fn test_hooks_wrap_each_transfer() {
    let transport = LoopbackTransport::new();
    let clock = Arc::new(ManualClock::new(7));
    let sub_hooks = Arc::new(RecordingHooks::default());
    let pub_hooks = Arc::new(RecordingHooks::default());

    let subscriber: Subscriber<FloatArray> = Subscriber::open_with(
        &transport,
        spec("rt/hooks"),
        SinkPolicy::LatestValue,
        SubscriberOptions {
            hooks: sub_hooks.clone(),
            ..fast_options(clock.clone())
        },
    )
    .unwrap();
    let publisher: Publisher<FloatArray> = Publisher::open_with(
        &transport,
        spec("rt/hooks"),
        PublisherOptions {
            clock,
            hooks: pub_hooks.clone(),
            ..PublisherOptions::default()
        },
    )
    .unwrap();

    publisher.write(&frame(1.0)).unwrap();
    wait_until("sample", || subscriber.received_count() == 1);
    publisher.dispose().unwrap();
    wait_until("discard", || subscriber.discarded_count() == 1);

    assert_eq!(*pub_hooks.events.lock(), [("before", 7), ("after", 7)]);
    assert_eq!(*sub_hooks.events.lock(), [("before", 7), ("after", 7)]);
}

/// Transport whose writes always exceed the blocking time.
#[derive(Debug)]
struct CongestedTransport;

struct CongestedWriter(String);

impl TransportWriter for CongestedWriter {
    fn write(&self, _payload: Vec<u8>, _source_timestamp: i64) -> Result<(), TransportError> {
        Err(TransportError::BlockingTimeout {
            topic: self.0.clone(),
            max_blocking_time: Duration::from_millis(5),
        })
    }

    fn dispose(&self, _source_timestamp: i64) -> Result<(), TransportError> {
        Ok(())
    }
}

struct SilentReader;

impl TransportReader for SilentReader {
    fn take(&mut self, timeout: Duration) -> Result<Option<RawSample>, TransportError> {
        std::thread::sleep(timeout);
        Ok(None)
    }
}

impl Transport for CongestedTransport {
    fn name(&self) -> &'static str {
        "congested"
    }

    fn open_writer(
        &self,
        endpoint: &TopicEndpoint,
    ) -> Result<Box<dyn TransportWriter>, TransportError> {
        Ok(Box::new(CongestedWriter(endpoint.topic.clone())))
    }

    fn open_reader(
        &self,
        _endpoint: &TopicEndpoint,
    ) -> Result<Box<dyn TransportReader>, TransportError> {
        Ok(Box::new(SilentReader))
    }
}

#[test]
fn test_blocking_timeout_reaches_caller() {
    let hooks = Arc::new(RecordingHooks::default());
    let publisher: Publisher<FloatArray> = Publisher::open_with(
        &CongestedTransport,
        spec("rt/congested"),
        PublisherOptions {
            clock: Arc::new(ManualClock::new(9)),
            hooks: hooks.clone(),
            ..PublisherOptions::default()
        },
    )
    .unwrap();

    let err = publisher.write(&frame(1.0)).unwrap_err();
    assert!(err.is_blocking_timeout());
    assert!(matches!(
        err,
        ChannelError::Transport(TransportError::BlockingTimeout { ref topic, max_blocking_time })
            if topic == "rt/congested" && max_blocking_time == Duration::from_millis(5)
    ));
    // The transfer never completed.
    assert_eq!(*hooks.events.lock(), [("before", 9)]);

    let bind = Subscriber::<ByteArray>::latest(&LoopbackTransport::new(), spec("rt/*")).unwrap_err();
    assert!(!bind.is_blocking_timeout());
}

#[test]
fn test_close_stops_drain_and_keeps_data() {
    let transport = LoopbackTransport::new();
    let clock = Arc::new(ManualClock::new(3));
    let mut subscriber: Subscriber<FloatArray> = Subscriber::open_with(
        &transport,
        spec("rt/close"),
        SinkPolicy::LatestValue,
        fast_options(clock.clone()),
    )
    .unwrap();
    let publisher = publisher_on(&transport, "rt/close", clock);

    publisher.write(&frame(1.0)).unwrap();
    wait_until("sample", || subscriber.received_count() == 1);

    subscriber.close();
    subscriber.close();
    assert_eq!(transport.reader_count(0, "rt/close"), 0);

    publisher.write(&frame(2.0)).unwrap();
    assert_eq!(subscriber.received_count(), 1);
    assert_eq!(subscriber.read().map(|s| s.payload), Some(frame(1.0)));
}

#[test]
fn test_factory_applies_defaults() {
    let transport = Arc::new(LoopbackTransport::new());
    let defaults = ChannelDefaults {
        queue_depth: 3,
        ..ChannelDefaults::default()
    };
    let factory = ChannelFactory::with_defaults(transport.clone(), defaults, Format::Json);

    let subscriber = factory
        .queue_subscriber::<FloatArray>(spec("rt/factory"))
        .unwrap();
    assert_eq!(
        subscriber.policy(),
        SinkPolicy::BoundedQueue {
            depth: NonZeroUsize::new(3).unwrap()
        }
    );

    let publisher = factory.publisher::<FloatArray>(spec("rt/factory")).unwrap();
    for n in 1..=2 {
        publisher.write(&frame(n as f64)).unwrap();
        wait_until("sample", || subscriber.received_count() == n);
    }

    assert_eq!(subscriber.read().map(|s| s.payload), Some(frame(1.0)));
    assert_eq!(subscriber.read().map(|s| s.payload), Some(frame(2.0)));
    assert_eq!(subscriber.read(), None);
}
