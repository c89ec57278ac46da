//! End-to-end verification of every message type.
//!
//! For each type, a subscriber is opened on `rt/verify/<label>`, a publisher
//! writes freshly generated payloads at a fixed rate for a fixed duration,
//! and the subscriber drains its queue, checking that each payload carries
//! content and measuring latency from the payload's own timestamp.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use rand::Rng;
use rand::rngs::ThreadRng;
use serde::Serialize;
use shmbridge_channel::{ChannelFactory, ChannelSpec, SinkPolicy, Subscriber, SubscriberOptions};
use shmbridge_common::{
    ByteArray, CameraFrame, DualArmCommand, DualArmState, FloatArray, Message, QosPolicy,
    current_timestamp_nanos,
};

use crate::args::VerifyArgs;
use crate::error::{HostError, Result};

/// Average latency above which a type is flagged.
pub const LATENCY_WARNING_MS: f64 = 10.0;

const QUEUE_DEPTH: usize = 64;

/// Timing of a verification run.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifyOptions {
    pub domain_id: u32,
    pub rate_hz: f64,
    /// How long each type is published.
    pub duration: Duration,
    /// Pause between opening the subscriber and starting the publisher.
    pub warmup: Duration,
    /// Pause between two types.
    pub cooldown: Duration,
    /// Interval at which the subscriber queue is drained.
    pub read_interval: Duration,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            domain_id: 0,
            rate_hz: 60.0,
            duration: Duration::from_secs(2),
            warmup: Duration::from_millis(500),
            cooldown: Duration::from_millis(500),
            read_interval: Duration::from_millis(10),
        }
    }
}

impl VerifyOptions {
    pub fn from_args(args: &VerifyArgs) -> Result<Self> {
        if !(args.rate_hz.is_finite() && args.rate_hz > 0.0) {
            return Err(HostError::validation(format!(
                "rate must be a positive number of Hz, got {}",
                args.rate_hz
            )));
        }
        let duration = Duration::try_from_secs_f64(args.duration_secs).map_err(|e| {
            HostError::validation(format!("invalid duration {}: {}", args.duration_secs, e))
        })?;

        Ok(Self {
            domain_id: args.domain,
            rate_hz: args.rate_hz,
            duration,
            ..Self::default()
        })
    }

    fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.rate_hz)
    }
}

/// Result for one message type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerifyReport {
    pub label: &'static str,
    pub type_name: &'static str,
    pub shape: &'static str,
    pub topic: String,
    pub published: u64,
    pub publish_errors: u64,
    pub received: u64,
    /// Received payloads whose primary field was non-empty.
    pub valid: u64,
    /// Average over payloads carrying a timestamp, 0 when none did.
    pub avg_latency_ms: f64,
}

impl VerifyReport {
    pub fn high_latency(&self) -> bool {
        self.avg_latency_ms > LATENCY_WARNING_MS
    }

    /// Something arrived and everything that arrived was valid.
    pub fn passed(&self) -> bool {
        self.received > 0 && self.valid == self.received
    }
}

type Generator<T> = fn(&mut ThreadRng, f64) -> T;

/// A message type under test.
#[derive(Clone, Copy)]
pub struct VerifyCase {
    pub label: &'static str,
    run: fn(&Verifier, &'static str) -> Result<VerifyReport>,
}

impl std::fmt::Debug for VerifyCase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerifyCase")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

macro_rules! case {
    ($label:literal, $ty:ty, $generate:expr) => {
        VerifyCase {
            label: $label,
            run: |verifier, label| verifier.run_case::<$ty>(label, $generate),
        }
    };
}

/// All verified types, lightest first.
pub fn cases() -> Vec<VerifyCase> {
    vec![
        case!("float_7d", FloatArray, |rng, ts| float_array(rng, 7, ts)),
        case!("float_1d", FloatArray, |rng, ts| float_array(rng, 1, ts)),
        case!("uint_1d", ByteArray, |_, _| ByteArray::new(vec![1])),
        case!("uint_100d", ByteArray, |rng, _| ByteArray::new(random_bytes(rng, 100))),
        case!("dual_arm_command", DualArmCommand, |_, ts| dual_arm_command(ts)),
        case!("dual_arm_state", DualArmState, |_, ts| dual_arm_state(ts)),
        case!("camera_224", CameraFrame, |rng, ts| {
            CameraFrame::new(random_bytes(rng, 224 * 224 * 3), ts)
        }),
        case!("camera_640480", CameraFrame, |rng, ts| {
            CameraFrame::new(random_bytes(rng, 640 * 480 * 3), ts)
        }),
    ]
}

fn float_array(rng: &mut ThreadRng, len: usize, timestamp: f64) -> FloatArray {
    FloatArray::new((0..len).map(|_| rng.random::<f64>()).collect(), timestamp)
}

fn random_bytes(rng: &mut ThreadRng, len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    rng.fill(&mut bytes[..]);
    bytes
}

fn filled(len: usize, value: f64, timestamp: f64) -> FloatArray {
    FloatArray::new(vec![value; len], timestamp)
}

fn dual_arm_command(timestamp: f64) -> DualArmCommand {
    DualArmCommand {
        left_arm_joint_delta: filled(7, 0.1, timestamp),
        right_arm_joint_delta: filled(7, 0.2, timestamp),
        left_gripper_action: ByteArray::new(vec![1]),
        right_gripper_action: ByteArray::new(vec![0]),
        timestamp,
    }
}

fn dual_arm_state(timestamp: f64) -> DualArmState {
    DualArmState {
        left_arm_q: filled(7, 0.1, timestamp),
        right_arm_q: filled(7, 0.2, timestamp),
        left_gripper: filled(1, 1.0, timestamp),
        right_gripper: filled(1, 0.0, timestamp),
        timestamp,
    }
}

fn now_secs() -> f64 {
    current_timestamp_nanos() as f64 / 1e9
}

/// Runs verification cases on one channel factory.
pub struct Verifier {
    factory: ChannelFactory,
    options: VerifyOptions,
    stop: Arc<AtomicBool>,
}

impl Verifier {
    pub fn new(factory: ChannelFactory, options: VerifyOptions) -> Self {
        Self {
            factory,
            options,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that aborts the run when set.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Run every case, or only those named in `only`.
    pub fn run(&self, only: &[String]) -> Result<Vec<VerifyReport>> {
        let all = cases();
        if let Some(unknown) = only.iter().find(|l| !all.iter().any(|c| c.label == l.as_str())) {
            let known: Vec<_> = all.iter().map(|c| c.label).collect();
            return Err(HostError::validation(format!(
                "unknown message type '{}', expected one of {}",
                unknown,
                known.join(", ")
            )));
        }

        tracing::info!(
            rate_hz = self.options.rate_hz,
            duration_ms = self.options.duration.as_millis() as u64,
            "Starting verification"
        );

        let mut reports = Vec::new();
        for case in all
            .iter()
            .filter(|c| only.is_empty() || only.iter().any(|l| l.as_str() == c.label))
        {
            if self.stopped() {
                tracing::warn!("Verification interrupted");
                break;
            }
            if !reports.is_empty() {
                std::thread::sleep(self.options.cooldown);
            }
            reports.push((case.run)(self, case.label)?);
        }

        Ok(reports)
    }

    fn run_case<T: Message + Clone>(
        &self,
        label: &'static str,
        generate: Generator<T>,
    ) -> Result<VerifyReport> {
        let topic = format!("rt/verify/{label}");
        let depth = NonZeroUsize::new(QUEUE_DEPTH).unwrap_or(NonZeroUsize::MIN);
        let spec = ChannelSpec::new(self.options.domain_id, topic.clone())
            .with_qos(QosPolicy::best_effort().with_history_depth(depth));

        let subscriber: Subscriber<T> = Subscriber::open_with(
            self.factory.transport().as_ref(),
            spec.clone(),
            SinkPolicy::BoundedQueue { depth },
            SubscriberOptions {
                yield_pause: Some(Duration::ZERO),
                ..self.factory.subscriber_options()
            },
        )?;
        tracing::info!(label, topic = %topic, "Listening");
        std::thread::sleep(self.options.warmup);

        let publisher = self.factory.publisher::<T>(spec)?;
        let period = self.options.period();
        let duration = self.options.duration;
        let stop = self.stop.clone();

        let writer = std::thread::Builder::new()
            .name(format!("verify:{label}"))
            .spawn(move || {
                let mut rng = rand::rng();
                let deadline = Instant::now() + duration;
                let (mut published, mut errors) = (0u64, 0u64);

                while Instant::now() < deadline && !stop.load(Ordering::Acquire) {
                    let started = Instant::now();
                    match publisher.write(&generate(&mut rng, now_secs())) {
                        Ok(()) => published += 1,
                        Err(e) => {
                            errors += 1;
                            tracing::warn!(label, error = %e, "Verification write failed");
                        }
                    }
                    std::thread::sleep(period.saturating_sub(started.elapsed()));
                }

                (published, errors)
            })
            .map_err(|e| shmbridge_channel::ChannelError::Spawn {
                topic: topic.clone(),
                source: e,
            })?;

        let mut tally = Tally::default();
        while !writer.is_finished() {
            tally.drain(&subscriber);
            std::thread::sleep(self.options.read_interval);
        }
        // Samples still in flight when the writer stopped.
        std::thread::sleep(self.options.read_interval);
        tally.drain(&subscriber);

        let (published, publish_errors) = match writer.join() {
            Ok(counts) => counts,
            Err(_) => {
                tracing::error!(label, "Verification writer panicked");
                (0, 0)
            }
        };

        let report = VerifyReport {
            label,
            type_name: T::TYPE_NAME,
            shape: T::SHAPE.as_str(),
            topic,
            published,
            publish_errors,
            received: tally.received,
            valid: tally.valid,
            avg_latency_ms: tally.avg_latency_ms(),
        };

        tracing::info!(
            label,
            published = report.published,
            received = report.received,
            valid = report.valid,
            avg_latency_ms = report.avg_latency_ms,
            "Verification result"
        );
        if report.high_latency() {
            tracing::warn!(
                label,
                avg_latency_ms = report.avg_latency_ms,
                threshold_ms = LATENCY_WARNING_MS,
                "High latency detected"
            );
        }

        Ok(report)
    }
}

#[derive(Debug, Default)]
struct Tally {
    received: u64,
    valid: u64,
    timestamped: u64,
    total_latency_ms: f64,
}

impl Tally {
    fn drain<T: Message + Clone>(&mut self, subscriber: &Subscriber<T>) {
        while let Some(sample) = subscriber.read() {
            self.record(&sample.payload, now_secs());
        }
    }

    fn record<T: Message>(&mut self, payload: &T, now: f64) {
        self.received += 1;
        if payload.content_len() > 0 {
            self.valid += 1;
        }
        if let Some(sent) = payload.timestamp() {
            self.timestamped += 1;
            self.total_latency_ms += (now - sent) * 1000.0;
        }
    }

    fn avg_latency_ms(&self) -> f64 {
        if self.timestamped == 0 {
            0.0
        } else {
            self.total_latency_ms / self.timestamped as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_labels_are_unique() {
        let labels: Vec<_> = cases().iter().map(|c| c.label).collect();
        let mut deduped = labels.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(deduped.len(), labels.len());
    }

    #[test]
    fn test_generated_payloads_are_valid() {
        let mut rng = rand::rng();
        assert_eq!(float_array(&mut rng, 7, 1.0).content_len(), 7);
        assert_eq!(random_bytes(&mut rng, 100).len(), 100);
        assert_eq!(dual_arm_command(1.0).content_len(), 4);
        assert_eq!(dual_arm_state(1.0).content_len(), 4);
    }

    #[test]
    fn test_tally_latency_ignores_untimestamped() {
        let mut tally = Tally::default();
        tally.record(&FloatArray::new(vec![1.0], 10.0), 10.004);
        tally.record(&FloatArray::new(vec![], 10.0), 10.006);
        tally.record(&ByteArray::new(vec![1]), 99.0);

        assert_eq!(tally.received, 3);
        assert_eq!(tally.valid, 2);
        assert!((tally.avg_latency_ms() - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_options_reject_bad_rate() {
        let args = VerifyArgs {
            domain: 0,
            rate_hz: 0.0,
            duration_secs: 1.0,
            types: Vec::new(),
            json: false,
        };
        assert!(VerifyOptions::from_args(&args).is_err());

        let args = VerifyArgs {
            rate_hz: 30.0,
            duration_secs: -1.0,
            ..args
        };
        assert!(VerifyOptions::from_args(&args).is_err());
    }

    #[test]
    fn test_report_flags() {
        let report = VerifyReport {
            label: "float_7d",
            type_name: FloatArray::TYPE_NAME,
            shape: "data",
            topic: "rt/verify/float_7d".to_string(),
            published: 10,
            publish_errors: 0,
            received: 10,
            valid: 10,
            avg_latency_ms: 12.0,
        };
        assert!(report.passed());
        assert!(report.high_latency());
    }
}
