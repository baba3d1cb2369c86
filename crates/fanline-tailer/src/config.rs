use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// Per-log append position. Seqnos increase monotonically per log, starting
/// at 1; per-topic seqnos are a subsequence of the log's.
pub type SequenceNumber = u64;

/// Opaque identifier of one storage log. Every topic maps to exactly one
/// log via the router.
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct LogId(pub u64);

impl LogId {
    #[inline]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl From<u64> for LogId {
    #[inline]
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl Display for LogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Identifier of one reader position registered with log storage.
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ReaderId(pub u64);

impl ReaderId {
    #[inline]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl Display for ReaderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Identifier of one client connection.
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct StreamId(pub u64);

impl StreamId {
    #[inline]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Identifier of one subscription within a stream.
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SubscriptionId(pub u64);

impl SubscriptionId {
    #[inline]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Tenant carried on outbound messages.
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TenantId(pub u16);

impl TenantId {
    /// Tenant used for messages this layer synthesizes itself (gap and bump
    /// notifications).
    pub const GUEST: TenantId = TenantId(1);

    #[inline]
    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn as_u16(self) -> u16 {
        self.0
    }
}

impl Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

const DEFAULT_FORWARD_QUEUE_CAPACITY: usize = 1024;
const DEFAULT_ROOM_IDLE_PARK_MS: u64 = 50;

/// Bounded cache of recent records per log, used to serve the prefix of new
/// subscriptions without rewinding a storage reader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataCacheConfig {
    /// Total payload bytes the cache may hold; 0 disables the cache.
    pub capacity_bytes: usize,
    /// Whether records in system namespaces (leading underscore) are cached.
    pub cache_system_namespace: bool,
}

impl Default for DataCacheConfig {
    fn default() -> Self {
        Self {
            capacity_bytes: 0,
            cache_system_namespace: false,
        }
    }
}

/// Options for constructing a [`crate::TopicTailer`] and its room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicTailerConfig {
    /// Capacity of each storage-thread forward queue, in commands.
    pub forward_queue_capacity: usize,
    /// How long the room thread parks when idle before re-scanning.
    pub room_idle_park_ms: u64,
    /// Data cache settings.
    pub cache: DataCacheConfig,
    /// Fraction of `send_log_record` calls forced to fail with `NoBuffer`.
    /// Test-only; reachable through [`TopicTailerConfig::for_tests`].
    #[serde(skip)]
    pub(crate) fault_send_log_record_failure_rate: f64,
}

impl Default for TopicTailerConfig {
    fn default() -> Self {
        Self {
            forward_queue_capacity: DEFAULT_FORWARD_QUEUE_CAPACITY,
            room_idle_park_ms: DEFAULT_ROOM_IDLE_PARK_MS,
            cache: DataCacheConfig::default(),
            fault_send_log_record_failure_rate: 0.0,
        }
    }
}

impl TopicTailerConfig {
    /// Configuration for tests: tiny queues so back-pressure is reachable,
    /// cache disabled unless a test opts in.
    pub fn for_tests() -> Self {
        Self {
            forward_queue_capacity: 16,
            room_idle_park_ms: 1,
            cache: DataCacheConfig::default(),
            fault_send_log_record_failure_rate: 0.0,
        }
    }

    /// Force a fraction of `send_log_record` calls to fail as if the queue
    /// were full. Only meaningful on a test configuration.
    pub fn with_send_log_record_failure_rate(mut self, rate: f64) -> Self {
        self.fault_send_log_record_failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    pub fn with_cache_capacity(mut self, capacity_bytes: usize) -> Self {
        self.cache.capacity_bytes = capacity_bytes;
        self
    }
}
