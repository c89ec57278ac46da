//! Sample-arrival liveliness.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use shmbridge_common::Clock;

/// Tracks the source timestamp of the last valid sample.
///
/// Shared between the drain thread, which records, and readers of the
/// channel, which ask whether the publisher has gone quiet.
#[derive(Debug, Clone)]
pub struct LivelinessMonitor {
    last: Arc<AtomicI64>,
    timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl LivelinessMonitor {
    pub fn new(timeout: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            last: Arc::new(AtomicI64::new(0)),
            timeout,
            clock,
        }
    }

    pub fn record(&self, source_timestamp: i64) {
        self.last.store(source_timestamp, Ordering::Release);
    }

    /// Source timestamp of the last valid sample, 0 if none yet.
    pub fn last_received(&self) -> i64 {
        self.last.load(Ordering::Acquire)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// True when more than the timeout has passed since the last sample.
    ///
    /// With no sample yet the last timestamp is 0, so this is true.
    pub fn is_timed_out(&self) -> bool {
        let elapsed = self.clock.now_nanos().saturating_sub(self.last_received());
        elapsed > self.timeout.as_nanos().min(i64::MAX as u128) as i64
    }
}
