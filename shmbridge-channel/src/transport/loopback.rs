//! In-process transport.
//!
//! Every reader owns a KeepLast cache sized by its QoS history depth; a
//! write appends to the cache of every live reader of the same domain and
//! topic, evicting the oldest entry when the cache is full. Writes never
//! block.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use shmbridge_common::validate_topic;

use super::{RawSample, TopicEndpoint, Transport, TransportReader, TransportWriter};
use crate::error::TransportError;

type TopicKey = (u32, String);

#[derive(Debug)]
struct TopicEntry {
    type_name: &'static str,
    readers: Vec<Weak<ReaderCache>>,
}

#[derive(Debug)]
struct ReaderCache {
    samples: Mutex<VecDeque<RawSample>>,
    ready: Condvar,
    depth: usize,
    closed: AtomicBool,
}

impl ReaderCache {
    fn push(&self, sample: RawSample) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let mut samples = self.samples.lock();
        while samples.len() >= self.depth {
            samples.pop_front();
        }
        samples.push_back(sample);
        drop(samples);
        self.ready.notify_one();
    }
}

/// Transport delivering within the current process.
#[derive(Debug, Clone, Default)]
pub struct LoopbackTransport {
    topics: Arc<Mutex<HashMap<TopicKey, TopicEntry>>>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of open readers on a topic.
    pub fn reader_count(&self, domain_id: u32, topic: &str) -> usize {
        self.topics
            .lock()
            .get(&(domain_id, topic.to_string()))
            .map(|entry| {
                entry
                    .readers
                    .iter()
                    .filter(|r| r.upgrade().is_some_and(|r| !r.closed.load(Ordering::Acquire)))
                    .count()
            })
            .unwrap_or(0)
    }

    /// Register the endpoint's type for its topic, rejecting a conflicting one.
    fn register(&self, endpoint: &TopicEndpoint) -> Result<TopicKey, TransportError> {
        validate_topic(&endpoint.topic)
            .map_err(|e| TransportError::bind(endpoint.domain_id, &endpoint.topic, e))?;

        let key = (endpoint.domain_id, endpoint.topic.clone());
        let mut topics = self.topics.lock();
        let entry = topics.entry(key.clone()).or_insert_with(|| TopicEntry {
            type_name: endpoint.struct_type.name,
            readers: Vec::new(),
        });

        if entry.type_name != endpoint.struct_type.name {
            return Err(TransportError::bind(
                endpoint.domain_id,
                &endpoint.topic,
                format!(
                    "topic already registered with type {} (requested {})",
                    entry.type_name, endpoint.struct_type.name
                ),
            ));
        }

        Ok(key)
    }

    fn deliver(&self, key: &TopicKey, sample: RawSample) {
        let mut topics = self.topics.lock();
        if let Some(entry) = topics.get_mut(key) {
            entry.readers.retain(|r| r.strong_count() > 0);
            for reader in entry.readers.iter().filter_map(Weak::upgrade) {
                reader.push(sample.clone());
            }
        }
    }
}

impl Transport for LoopbackTransport {
    fn name(&self) -> &'static str {
        "loopback"
    }

    fn open_writer(
        &self,
        endpoint: &TopicEndpoint,
    ) -> Result<Box<dyn TransportWriter>, TransportError> {
        let key = self.register(endpoint)?;
        Ok(Box::new(LoopbackWriter {
            transport: self.clone(),
            key,
        }))
    }

    fn open_reader(
        &self,
        endpoint: &TopicEndpoint,
    ) -> Result<Box<dyn TransportReader>, TransportError> {
        let key = self.register(endpoint)?;
        let cache = Arc::new(ReaderCache {
            samples: Mutex::new(VecDeque::new()),
            ready: Condvar::new(),
            depth: endpoint.qos.history_depth.get(),
            closed: AtomicBool::new(false),
        });

        if let Some(entry) = self.topics.lock().get_mut(&key) {
            entry.readers.push(Arc::downgrade(&cache));
        }

        Ok(Box::new(LoopbackReader { cache }))
    }
}

struct LoopbackWriter {
    transport: LoopbackTransport,
    key: TopicKey,
}

impl TransportWriter for LoopbackWriter {
    fn write(&self, payload: Vec<u8>, source_timestamp: i64) -> Result<(), TransportError> {
        self.transport
            .deliver(&self.key, RawSample::data(payload, source_timestamp));
        Ok(())
    }

    fn dispose(&self, source_timestamp: i64) -> Result<(), TransportError> {
        self.transport
            .deliver(&self.key, RawSample::disposed(source_timestamp));
        Ok(())
    }
}

struct LoopbackReader {
    cache: Arc<ReaderCache>,
}

impl TransportReader for LoopbackReader {
    fn take(&mut self, timeout: Duration) -> Result<Option<RawSample>, TransportError> {
        let mut samples = self.cache.samples.lock();
        if samples.is_empty() && !self.cache.closed.load(Ordering::Acquire) {
            self.cache.ready.wait_for(&mut samples, timeout);
        }

        match samples.pop_front() {
            Some(sample) => Ok(Some(sample)),
            None if self.cache.closed.load(Ordering::Acquire) => Err(TransportError::Closed),
            None => Ok(None),
        }
    }

    fn close(&mut self) {
        self.cache.closed.store(true, Ordering::Release);
        self.cache.ready.notify_all();
    }
}

impl Drop for LoopbackReader {
    fn drop(&mut self) {
        self.close();
    }
}
