//! Interfaces consumed from the storage tier.
//!
//! The tailer drives log storage through [`LogStorage`] and resolves
//! topic-to-log placement through [`LogRouter`]. Both are trait objects so
//! the surrounding service can plug in its storage client; tests plug in
//! the mock from `test_support`.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::config::{LogId, ReaderId};
use crate::error::{TailerError, TailerResult};
use crate::message::TopicId;
use crate::SequenceNumber;

/// Completion callback for [`LogStorage::find_latest_seqno`]. Invoked on a
/// storage thread with the next seqno to be written to the log.
pub type FindLatestSeqno = Box<dyn FnOnce(TailerResult<SequenceNumber>) + Send>;

/// Log storage operations the tailer depends on.
///
/// `start_reading` and `stop_reading` complete synchronously against a
/// local proxy; records and gaps flow back through the room's forward
/// queues, tagged with the `ReaderId` that requested them.
pub trait LogStorage: Send + Sync {
    /// Positions `reader` at `seqno` on `log`. `first_open` distinguishes
    /// opening a log from rewinding an already-open one.
    fn start_reading(
        &self,
        log: LogId,
        seqno: SequenceNumber,
        reader: ReaderId,
        first_open: bool,
    ) -> TailerResult<()>;

    /// Releases `reader`'s position on `log`.
    fn stop_reading(&self, log: LogId, reader: ReaderId) -> TailerResult<()>;

    /// Asynchronously resolves the next seqno to be written to `log`.
    fn find_latest_seqno(&self, log: LogId, callback: FindLatestSeqno) -> TailerResult<()>;

    /// Whether `start_reading` accepts a position one past the last written
    /// seqno.
    fn can_subscribe_past_end(&self) -> bool;
}

/// Topic-to-log placement.
pub trait LogRouter: Send + Sync {
    fn log_id(&self, topic: &TopicId) -> TailerResult<LogId>;
}

/// Routes topics onto a fixed number of logs by hash.
pub struct HashLogRouter {
    num_logs: u64,
}

impl HashLogRouter {
    pub fn new(num_logs: u64) -> TailerResult<Self> {
        if num_logs == 0 {
            return Err(TailerError::routing("router needs at least one log"));
        }
        Ok(Self { num_logs })
    }
}

impl LogRouter for HashLogRouter {
    fn log_id(&self, topic: &TopicId) -> TailerResult<LogId> {
        let mut hasher = DefaultHasher::new();
        topic.hash(&mut hasher);
        Ok(LogId::new(hasher.finish() % self.num_logs))
    }
}
