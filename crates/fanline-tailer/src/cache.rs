//! Bounded cache of recent records, per log.
//!
//! New subscriptions are fast-forwarded from here before a reader position
//! is chosen, which turns many would-be rewinds into cache hits. Capacity
//! is accounted in payload bytes and eviction follows insertion order, so
//! the cache always holds the freshest suffix of what flowed through the
//! room.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use crate::config::{DataCacheConfig, LogId};
use crate::message::MessageData;
use crate::SequenceNumber;

pub struct DataCache {
    capacity_bytes: usize,
    usage_bytes: usize,
    cache_system_namespace: bool,
    logs: HashMap<LogId, BTreeMap<SequenceNumber, Arc<MessageData>>>,
    eviction: VecDeque<(LogId, SequenceNumber)>,
}

impl DataCache {
    pub fn new(config: DataCacheConfig) -> Self {
        Self {
            capacity_bytes: config.capacity_bytes,
            usage_bytes: 0,
            cache_system_namespace: config.cache_system_namespace,
            logs: HashMap::new(),
            eviction: VecDeque::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity_bytes
    }

    pub fn usage(&self) -> usize {
        self.usage_bytes
    }

    pub fn is_enabled(&self) -> bool {
        self.capacity_bytes > 0
    }

    /// Stores a record. No-op when disabled or when the record belongs to a
    /// system namespace that is excluded from caching.
    pub fn store(&mut self, log: LogId, record: Arc<MessageData>) {
        if !self.is_enabled() {
            return;
        }
        if record.topic().is_system() && !self.cache_system_namespace {
            return;
        }
        let seqno = record.seqno();
        let bytes = record.payload_len();
        let slot = self.logs.entry(log).or_default();
        match slot.insert(seqno, record) {
            Some(old) => {
                // Same position re-read after a rewind; keep the original
                // eviction order.
                self.usage_bytes = self.usage_bytes - old.payload_len() + bytes;
            }
            None => {
                self.usage_bytes += bytes;
                self.eviction.push_back((log, seqno));
            }
        }
        self.evict_to_fit();
    }

    /// Visits every cached record on `log` with seqno at or above `from`,
    /// in seqno order. Returns one past the last visited seqno, or `from`
    /// when nothing was visited.
    pub fn visit<F>(&self, log: LogId, from: SequenceNumber, mut visit: F) -> SequenceNumber
    where
        F: FnMut(&Arc<MessageData>),
    {
        if !self.is_enabled() {
            return from;
        }
        let Some(records) = self.logs.get(&log) else {
            return from;
        };
        let mut next = from;
        for (&seqno, record) in records.range(from..) {
            visit(record);
            next = seqno + 1;
        }
        next
    }

    pub fn clear(&mut self) {
        self.logs.clear();
        self.eviction.clear();
        self.usage_bytes = 0;
    }

    /// Changes the capacity, evicting as needed. Setting zero disables the
    /// cache and drops its contents.
    pub fn set_capacity(&mut self, capacity_bytes: usize) {
        self.capacity_bytes = capacity_bytes;
        if capacity_bytes == 0 {
            self.clear();
        } else {
            self.evict_to_fit();
        }
    }

    fn evict_to_fit(&mut self) {
        while self.usage_bytes > self.capacity_bytes {
            let Some((log, seqno)) = self.eviction.pop_front() else {
                break;
            };
            let Some(records) = self.logs.get_mut(&log) else {
                continue;
            };
            if let Some(record) = records.remove(&seqno) {
                self.usage_bytes -= record.payload_len();
            }
            if records.is_empty() {
                self.logs.remove(&log);
            }
        }
    }
}
