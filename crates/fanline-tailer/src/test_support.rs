//! Test doubles for the storage seam and the delivery sink.
//!
//! `MockLogStorage` records every storage call and parks
//! `find_latest_seqno` callbacks until a test completes them, so the
//! subscribe-at-tail slow path can be driven deterministically.
//! `CollectingSink` captures outbound messages with their recipients.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::{LogId, ReaderId, TenantId};
use crate::error::{TailerError, TailerResult};
use crate::message::{CopilotSub, GapMessage, Message, MessageData, TopicId};
use crate::storage::{FindLatestSeqno, LogStorage};
use crate::SequenceNumber;

/// In-memory [`LogStorage`] that records calls instead of reading logs.
pub struct MockLogStorage {
    start_calls: Mutex<Vec<(LogId, SequenceNumber, ReaderId, bool)>>,
    stop_calls: Mutex<Vec<(LogId, ReaderId)>>,
    pending_finds: Mutex<Vec<(LogId, FindLatestSeqno)>>,
    can_subscribe_past_end: bool,
    fail_start_reading: Mutex<bool>,
    fail_stop_reading: Mutex<bool>,
    fail_find_latest: Mutex<bool>,
}

impl MockLogStorage {
    pub fn new() -> Self {
        Self {
            start_calls: Mutex::new(Vec::new()),
            stop_calls: Mutex::new(Vec::new()),
            pending_finds: Mutex::new(Vec::new()),
            can_subscribe_past_end: true,
            fail_start_reading: Mutex::new(false),
            fail_stop_reading: Mutex::new(false),
            fail_find_latest: Mutex::new(false),
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// A storage that only accepts positions at or below the written tail.
    pub fn without_past_end() -> Arc<Self> {
        let mut storage = Self::new();
        storage.can_subscribe_past_end = false;
        Arc::new(storage)
    }

    /// Every `(log, seqno, reader, first_open)` passed to `start_reading`.
    pub fn start_calls(&self) -> Vec<(LogId, SequenceNumber, ReaderId, bool)> {
        self.start_calls.lock().clone()
    }

    /// Every `(log, reader)` passed to `stop_reading`.
    pub fn stop_calls(&self) -> Vec<(LogId, ReaderId)> {
        self.stop_calls.lock().clone()
    }

    pub fn pending_find_count(&self) -> usize {
        self.pending_finds.lock().len()
    }

    /// Completes the oldest parked `find_latest_seqno` callback.
    ///
    /// Panics when none is parked; tests should know what they issued.
    pub fn complete_find(&self, result: TailerResult<SequenceNumber>) -> LogId {
        let (log, callback) = {
            let mut pending = self.pending_finds.lock();
            assert!(!pending.is_empty(), "no find_latest_seqno in flight");
            pending.remove(0)
        };
        callback(result);
        log
    }

    /// Makes subsequent `start_reading` calls fail.
    pub fn set_fail_start_reading(&self, fail: bool) {
        *self.fail_start_reading.lock() = fail;
    }

    /// Makes subsequent `stop_reading` calls fail.
    pub fn set_fail_stop_reading(&self, fail: bool) {
        *self.fail_stop_reading.lock() = fail;
    }

    /// Makes subsequent `find_latest_seqno` calls fail synchronously.
    pub fn set_fail_find_latest(&self, fail: bool) {
        *self.fail_find_latest.lock() = fail;
    }
}

impl Default for MockLogStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl LogStorage for MockLogStorage {
    fn start_reading(
        &self,
        log: LogId,
        seqno: SequenceNumber,
        reader: ReaderId,
        first_open: bool,
    ) -> TailerResult<()> {
        if *self.fail_start_reading.lock() {
            return Err(TailerError::storage("injected start_reading failure"));
        }
        self.start_calls.lock().push((log, seqno, reader, first_open));
        Ok(())
    }

    fn stop_reading(&self, log: LogId, reader: ReaderId) -> TailerResult<()> {
        if *self.fail_stop_reading.lock() {
            return Err(TailerError::storage("injected stop_reading failure"));
        }
        self.stop_calls.lock().push((log, reader));
        Ok(())
    }

    fn find_latest_seqno(&self, log: LogId, callback: FindLatestSeqno) -> TailerResult<()> {
        if *self.fail_find_latest.lock() {
            return Err(TailerError::storage("injected find_latest_seqno failure"));
        }
        self.pending_finds.lock().push((log, callback));
        Ok(())
    }

    fn can_subscribe_past_end(&self) -> bool {
        self.can_subscribe_past_end
    }
}

/// Delivery sink that collects `(message, recipients)` pairs.
#[derive(Clone, Default)]
pub struct CollectingSink {
    messages: Arc<Mutex<Vec<(Message, Vec<CopilotSub>)>>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// The callback to hand to `TopicTailer::new`.
    pub fn callback(&self) -> Box<dyn FnMut(Message, Vec<CopilotSub>) + Send> {
        let messages = Arc::clone(&self.messages);
        Box::new(move |message, recipients| {
            messages.lock().push((message, recipients));
        })
    }

    pub fn messages(&self) -> Vec<(Message, Vec<CopilotSub>)> {
        self.messages.lock().clone()
    }

    /// Drains and returns everything collected so far.
    pub fn take(&self) -> Vec<(Message, Vec<CopilotSub>)> {
        std::mem::take(&mut *self.messages.lock())
    }

    pub fn data_messages(&self) -> Vec<(MessageData, Vec<CopilotSub>)> {
        self.messages
            .lock()
            .iter()
            .filter_map(|(message, recipients)| match message {
                Message::Data(data) => Some((data.clone(), recipients.clone())),
                Message::Gap(_) => None,
            })
            .collect()
    }

    pub fn gap_messages(&self) -> Vec<(GapMessage, Vec<CopilotSub>)> {
        self.messages
            .lock()
            .iter()
            .filter_map(|(message, recipients)| match message {
                Message::Gap(gap) => Some((gap.clone(), recipients.clone())),
                Message::Data(_) => None,
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }
}

/// Builds a record as the storage layer would deliver it.
pub fn make_record(
    namespace: &str,
    name: &str,
    seqno: SequenceNumber,
    payload: &[u8],
) -> MessageData {
    MessageData::new(
        TenantId::GUEST,
        TopicId::new(namespace, name),
        seqno,
        payload,
    )
}
