//! Where a subscriber's drain thread stores samples.
//!
//! Two policies, chosen when the subscriber is opened:
//!
//! - **Latest value**: one slot, overwritten by every sample. `read` returns
//!   a copy and leaves the slot in place, so repeated reads see the same
//!   sample until a newer one arrives.
//! - **Bounded queue**: FIFO of at most `depth` samples. When full, the
//!   oldest sample is evicted to make room, so a slow reader always sees the
//!   freshest data. `read` pops the oldest remaining sample.

use std::collections::VecDeque;
use std::num::NonZeroUsize;

use parking_lot::Mutex;

use crate::channel::Sample;

/// Storage policy of a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SinkPolicy {
    LatestValue,
    BoundedQueue { depth: NonZeroUsize },
}

impl SinkPolicy {
    /// Queue holding a single sample.
    pub fn single_slot_queue() -> Self {
        SinkPolicy::BoundedQueue {
            depth: NonZeroUsize::MIN,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SinkPolicy::LatestValue => "latest_value",
            SinkPolicy::BoundedQueue { .. } => "bounded_queue",
        }
    }
}

/// Sample storage, one lock per sink.
#[derive(Debug)]
pub enum SampleSink<T> {
    LatestValue(Mutex<Option<Sample<T>>>),
    BoundedQueue {
        samples: Mutex<VecDeque<Sample<T>>>,
        depth: NonZeroUsize,
    },
}

impl<T: Clone> SampleSink<T> {
    pub fn new(policy: SinkPolicy) -> Self {
        match policy {
            SinkPolicy::LatestValue => SampleSink::LatestValue(Mutex::new(None)),
            SinkPolicy::BoundedQueue { depth } => SampleSink::BoundedQueue {
                samples: Mutex::new(VecDeque::with_capacity(depth.get())),
                depth,
            },
        }
    }

    pub fn policy(&self) -> SinkPolicy {
        match self {
            SampleSink::LatestValue(_) => SinkPolicy::LatestValue,
            SampleSink::BoundedQueue { depth, .. } => SinkPolicy::BoundedQueue { depth: *depth },
        }
    }

    /// Store a sample, returning the one it displaced, if any.
    pub fn store(&self, sample: Sample<T>) -> Option<Sample<T>> {
        match self {
            SampleSink::LatestValue(slot) => slot.lock().replace(sample),
            SampleSink::BoundedQueue { samples, depth } => {
                let mut samples = samples.lock();
                let evicted = if samples.len() >= depth.get() {
                    samples.pop_front()
                } else {
                    None
                };
                samples.push_back(sample);
                evicted
            }
        }
    }

    /// Next sample for the reader, per the policy.
    pub fn read(&self) -> Option<Sample<T>> {
        match self {
            SampleSink::LatestValue(slot) => slot.lock().clone(),
            SampleSink::BoundedQueue { samples, .. } => samples.lock().pop_front(),
        }
    }

    /// Number of samples `read` could currently return.
    pub fn len(&self) -> usize {
        match self {
            SampleSink::LatestValue(slot) => usize::from(slot.lock().is_some()),
            SampleSink::BoundedQueue { samples, .. } => samples.lock().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(n: i64) -> Sample<String> {
        Sample {
            payload: format!("S{n}"),
            source_timestamp: n,
        }
    }

    fn policies() -> Vec<SinkPolicy> {
        vec![
            SinkPolicy::LatestValue,
            SinkPolicy::single_slot_queue(),
            SinkPolicy::BoundedQueue {
                depth: NonZeroUsize::new(3).unwrap(),
            },
        ]
    }

    #[test]
    fn test_empty_sink_reads_nothing() {
        for policy in policies() {
            let sink = SampleSink::<String>::new(policy);
            assert!(sink.is_empty(), "{}", policy.as_str());
            assert_eq!(sink.read(), None, "{}", policy.as_str());
            assert_eq!(sink.policy(), policy);
        }
    }

    #[test]
    fn test_every_policy_yields_newest_after_burst_of_one() {
        for policy in policies() {
            let sink = SampleSink::new(policy);
            sink.store(sample(1));
            assert_eq!(sink.read(), Some(sample(1)), "{}", policy.as_str());
        }
    }

    #[test]
    fn test_latest_value_overwrites_and_keeps() {
        let sink = SampleSink::new(SinkPolicy::LatestValue);
        assert_eq!(sink.store(sample(1)), None);
        assert_eq!(sink.store(sample(2)), Some(sample(1)));

        assert_eq!(sink.read(), Some(sample(2)));
        assert_eq!(sink.read(), Some(sample(2)));
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_single_slot_queue_evicts_oldest() {
        let sink = SampleSink::new(SinkPolicy::single_slot_queue());
        assert_eq!(sink.store(sample(1)), None);
        assert_eq!(sink.store(sample(2)), Some(sample(1)));

        assert_eq!(sink.read(), Some(sample(2)));
        assert_eq!(sink.read(), None);
    }

    #[test]
    fn test_deeper_queue_is_fifo() {
        let sink = SampleSink::new(SinkPolicy::BoundedQueue {
            depth: NonZeroUsize::new(3).unwrap(),
        });
        for n in 1..=4 {
            sink.store(sample(n));
        }
        assert_eq!(sink.len(), 3);
        assert_eq!(sink.read(), Some(sample(2)));
        assert_eq!(sink.read(), Some(sample(3)));
        assert_eq!(sink.read(), Some(sample(4)));
        assert!(sink.is_empty());
    }
}
