//! Quality-of-service policy attached to every channel.
//!
//! The default mirrors what publishers and subscribers of the shared-memory
//! transport are usually configured with: reliable delivery that never
//! blocks the writer, volatile durability, a history of one sample and a
//! one-day deadline.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Delivery guarantee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Reliability {
    /// Retransmit until acknowledged. A write may block for at most
    /// `max_blocking_time` when the reader side is congested.
    Reliable {
        #[serde(with = "duration_millis", default)]
        max_blocking_time: Duration,
    },
    /// Fire and forget.
    BestEffort,
}

impl Default for Reliability {
    fn default() -> Self {
        Reliability::Reliable {
            max_blocking_time: Duration::ZERO,
        }
    }
}

impl Reliability {
    /// Maximum time a write may block, zero for best-effort.
    pub fn max_blocking_time(&self) -> Duration {
        match self {
            Reliability::Reliable { max_blocking_time } => *max_blocking_time,
            Reliability::BestEffort => Duration::ZERO,
        }
    }

    /// Whether a writer is allowed to block at all.
    pub fn may_block(&self) -> bool {
        !self.max_blocking_time().is_zero()
    }
}

/// Sample durability. Only volatile samples are supported: late joiners
/// never see data written before they matched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Durability {
    #[default]
    Volatile,
}

/// QoS policy set of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QosPolicy {
    #[serde(default)]
    pub reliability: Reliability,

    #[serde(default)]
    pub durability: Durability,

    /// KeepLast depth of the reader-side history.
    #[serde(default = "default_history_depth")]
    pub history_depth: NonZeroUsize,

    /// Expected maximum period between samples.
    #[serde(with = "duration_millis", default = "default_deadline")]
    pub deadline: Duration,
}

fn default_history_depth() -> NonZeroUsize {
    NonZeroUsize::MIN
}

fn default_deadline() -> Duration {
    Duration::from_secs(24 * 3600)
}

impl Default for QosPolicy {
    fn default() -> Self {
        Self {
            reliability: Reliability::default(),
            durability: Durability::default(),
            history_depth: default_history_depth(),
            deadline: default_deadline(),
        }
    }
}

impl QosPolicy {
    /// Best-effort variant of the default policy, used for high-rate streams.
    pub fn best_effort() -> Self {
        Self {
            reliability: Reliability::BestEffort,
            ..Self::default()
        }
    }

    pub fn with_reliability(mut self, reliability: Reliability) -> Self {
        self.reliability = reliability;
        self
    }

    pub fn with_history_depth(mut self, depth: NonZeroUsize) -> Self {
        self.history_depth = depth;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
