//! Pre/post transfer hooks.
//!
//! A publisher calls the hooks around every write; a subscriber calls them
//! on its drain thread around storing each sample. Hooks must be cheap and
//! must not block: they run inline on the data path.

/// What a hook sees of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferEvent<'a> {
    pub topic: &'a str,
    /// Nanoseconds since the Unix epoch.
    pub source_timestamp: i64,
}

/// Callbacks around each transfer. Both default to no-ops.
pub trait ChannelHooks: Send + Sync {
    fn before_transfer(&self, _event: &TransferEvent<'_>) {}

    fn after_transfer(&self, _event: &TransferEvent<'_>) {}
}

/// Hooks that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl ChannelHooks for NoHooks {}
