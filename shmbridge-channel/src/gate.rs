//! First-sample connection gate.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Opens once the first valid sample has been stored, and stays open.
#[derive(Debug, Clone)]
pub struct ConnectionGate {
    observed: Arc<AtomicBool>,
    poll: Duration,
    settle: Duration,
}

impl ConnectionGate {
    pub fn new(poll: Duration, settle: Duration) -> Self {
        Self {
            observed: Arc::new(AtomicBool::new(false)),
            poll,
            settle,
        }
    }

    pub fn mark_observed(&self) {
        self.observed.store(true, Ordering::Release);
    }

    pub fn is_open(&self) -> bool {
        self.observed.load(Ordering::Acquire)
    }

    /// Block until the gate opens, polling, then pause for the settle delay.
    ///
    /// Never returns while no sample arrives.
    pub fn wait(&self) {
        while !self.is_open() {
            std::thread::sleep(self.poll);
        }
        std::thread::sleep(self.settle);
    }

    /// Like [`wait`](Self::wait) but gives up after `limit`.
    ///
    /// Returns whether the gate opened. The settle pause only applies on
    /// success.
    pub fn wait_timeout(&self, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        loop {
            if self.is_open() {
                std::thread::sleep(self.settle);
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            std::thread::sleep(self.poll.min(deadline - now));
        }
    }
}
