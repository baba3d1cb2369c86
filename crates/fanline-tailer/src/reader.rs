//! One reader position into storage logs.
//!
//! A `LogReader` tracks, for every log it has open, the window it has read
//! (`start_seqno ..= last_read`) and the last seqno seen per topic. That
//! per-topic memory is what lets the coordinator stamp a previous-seqno on
//! every delivery. Readers are either physical (backed by a storage reader
//! registered under `reader_id`) or virtual (no storage cursor): virtual
//! readers park subscriptions whose positions lie before every physical
//! reader, until a merge frees a physical reader to adopt them.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::config::{LogId, ReaderId};
use crate::error::{TailerError, TailerResult};
use crate::linked_map::LinkedMap;
use crate::message::TopicId;
use crate::metrics::{incr, TailerMetrics};
use crate::storage::LogStorage;
use crate::SequenceNumber;

/// The cost of rewinding is infinite; a reader never rewinds while another
/// option exists.
pub const SUBSCRIPTION_COST_REWIND: u64 = u64::MAX;

/// Heuristic cost of opening a log on a reader that is not on it. A reader
/// at seqno 100 should accept a subscription at 101 rather than have an
/// idle reader open the log; the break-even point is a reader this many
/// seqnos behind.
pub const SUBSCRIPTION_COST_START: u64 = 1000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct TopicState {
    /// The last seqno seen on this topic, plus one.
    next_seqno: SequenceNumber,
}

struct LogState {
    /// Seqno this reader started from on the log.
    start_seqno: SequenceNumber,
    /// Largest seqno for which a record or gap has been processed.
    last_read: SequenceNumber,
    /// Per-topic positions, least-recently-seen first.
    topics: LinkedMap<TopicId, TopicState>,
}

pub struct LogReader {
    reader_id: ReaderId,
    /// `None` marks a virtual reader: state management without a storage
    /// cursor.
    storage: Option<Arc<dyn LogStorage>>,
    logs: HashMap<LogId, LogState>,
    max_subscription_lag: u64,
    metrics: Arc<TailerMetrics>,
}

impl LogReader {
    pub fn new(
        storage: Option<Arc<dyn LogStorage>>,
        reader_id: ReaderId,
        max_subscription_lag: u64,
        metrics: Arc<TailerMetrics>,
    ) -> Self {
        Self {
            reader_id,
            storage,
            logs: HashMap::new(),
            max_subscription_lag,
            metrics,
        }
    }

    pub fn reader_id(&self) -> ReaderId {
        self.reader_id
    }

    pub fn is_virtual(&self) -> bool {
        self.storage.is_none()
    }

    pub fn is_log_open(&self, log: LogId) -> bool {
        self.logs.contains_key(&log)
    }

    /// Updates state for a delivered record.
    ///
    /// Returns the previous seqno known for the record's topic, or `None`
    /// when this reader has no state for the topic. The record must be the
    /// next seqno on the log or it is rejected.
    pub fn process_record(
        &mut self,
        log: LogId,
        seqno: SequenceNumber,
        topic: &TopicId,
    ) -> TailerResult<Option<SequenceNumber>> {
        let Some(state) = self.logs.get_mut(&log) else {
            debug!(reader = %self.reader_id, %log, %topic, "record for unopened log");
            return Err(TailerError::not_found(format!("log {log} not open")));
        };
        if seqno != state.last_read + 1 {
            debug!(
                reader = %self.reader_id,
                %log,
                %topic,
                expected = state.last_read + 1,
                received = seqno,
                "record out of order"
            );
            return Err(TailerError::OutOfOrder {
                log,
                expected: state.last_read + 1,
                received: seqno,
            });
        }
        state.last_read = seqno;

        match state.topics.get_mut(topic) {
            Some(topic_state) => {
                let prev = topic_state.next_seqno;
                topic_state.next_seqno = seqno + 1;
                state.topics.move_to_back(topic);
                Ok(Some(prev))
            }
            None => Ok(None),
        }
    }

    /// Checks that a gap starting at `from` lines up with the reader
    /// position.
    pub fn validate_gap(&self, log: LogId, from: SequenceNumber) -> TailerResult<()> {
        let Some(state) = self.logs.get(&log) else {
            debug!(reader = %self.reader_id, %log, "gap on unopened log");
            return Err(TailerError::not_found(format!("log {log} not open")));
        };
        if from != state.last_read + 1 {
            debug!(
                reader = %self.reader_id,
                %log,
                expected = state.last_read + 1,
                received = from,
                "gap out of order"
            );
            return Err(TailerError::OutOfOrder {
                log,
                expected: state.last_read + 1,
                received: from,
            });
        }
        Ok(())
    }

    /// Updates per-topic state for a gap over `[from, to]`.
    ///
    /// Pre-condition: `validate_gap(log, from)` succeeded. Returns the
    /// previous seqno known for the topic, like [`Self::process_record`].
    /// The log window itself is advanced separately (`process_benign_gap`
    /// or `flush_history`), after every affected topic was visited.
    pub fn process_gap(
        &mut self,
        log: LogId,
        topic: &TopicId,
        from: SequenceNumber,
        to: SequenceNumber,
    ) -> Option<SequenceNumber> {
        let state = self.logs.get_mut(&log)?;
        debug_assert_eq!(from, state.last_read + 1);
        match state.topics.get_mut(topic) {
            Some(topic_state) => {
                let prev = topic_state.next_seqno;
                topic_state.next_seqno = to + 1;
                state.topics.move_to_back(topic);
                Some(prev)
            }
            None => None,
        }
    }

    /// Advances the read window past a benign gap. Per-topic state is
    /// untouched: nothing was lost.
    pub fn process_benign_gap(&mut self, log: LogId, _from: SequenceNumber, to: SequenceNumber) {
        if let Some(state) = self.logs.get_mut(&log) {
            state.last_read = to;
        }
    }

    /// Resets the read window after a malignant gap so the reader claims no
    /// knowledge below `seqno`. Topic entries have already been advanced to
    /// `seqno` by the per-topic gap pass, so they carry no pre-gap history.
    pub fn flush_history(&mut self, log: LogId, seqno: SequenceNumber) {
        if let Some(state) = self.logs.get_mut(&log) {
            state.start_seqno = seqno;
            state.last_read = seqno - 1;
        }
    }

    /// Bumps topics whose position lags more than `max_subscription_lag`
    /// behind `seqno`. `on_bump` is invoked with each bumped topic and its
    /// last known seqno; the topic is then advanced past `seqno` and moved
    /// to the recently-seen end.
    pub fn bump_lagging_subscriptions<F>(&mut self, log: LogId, seqno: SequenceNumber, mut on_bump: F)
    where
        F: FnMut(&TopicId, SequenceNumber),
    {
        let Some(state) = self.logs.get_mut(&log) else {
            return;
        };
        loop {
            // Front of the LRU is the least-recently-seen topic.
            let Some((topic, topic_state)) = state.topics.front() else {
                break;
            };
            let topic_seqno = topic_state.next_seqno;
            if topic_seqno.saturating_add(self.max_subscription_lag) >= seqno {
                break;
            }
            let topic = topic.clone();
            debug!(
                reader = %self.reader_id,
                %log,
                %topic,
                from = topic_seqno,
                to = seqno,
                "bumping lagging topic"
            );
            on_bump(&topic, topic_seqno);
            if let Some(topic_state) = state.topics.get_mut(&topic) {
                topic_state.next_seqno = seqno + 1;
            }
            state.topics.move_to_back(&topic);
        }
    }

    /// Ensures the log is open at or before `seqno` for a new subscription
    /// on `topic`.
    ///
    /// Opens the log when unopened; rewinds when the log has already read
    /// past `seqno`; otherwise just records the topic and lets the reader
    /// catch up naturally.
    pub fn start_reading(
        &mut self,
        topic: &TopicId,
        log: LogId,
        seqno: SequenceNumber,
    ) -> TailerResult<()> {
        let first_open = !self.logs.contains_key(&log);
        let virtual_reader = self.is_virtual();
        let state = self.logs.entry(log).or_insert_with(|| LogState {
            start_seqno: seqno,
            last_read: seqno.saturating_sub(1),
            topics: LinkedMap::new(),
        });

        let mut reseek = match state.topics.get_mut(topic) {
            None => {
                // New subscriptions start least-recently-seen.
                state
                    .topics
                    .insert_front(topic.clone(), TopicState { next_seqno: seqno });
                true
            }
            Some(topic_state) => {
                let rewinds = seqno < topic_state.next_seqno;
                topic_state.next_seqno = topic_state.next_seqno.min(seqno);
                state.topics.move_to_front(topic);
                rewinds
            }
        };

        if !first_open && reseek {
            // No need to reseek if the reader has not reached seqno yet.
            reseek = seqno <= state.last_read;
        }

        if reseek {
            if first_open {
                info!(
                    reader = %self.reader_id,
                    virtual_reader,
                    %log,
                    seqno,
                    %topic,
                    "reader now reading log"
                );
            } else {
                info!(
                    reader = %self.reader_id,
                    virtual_reader,
                    %log,
                    from = state.last_read + 1,
                    to = seqno,
                    %topic,
                    "reader rewinding log"
                );
            }
            if let Some(storage) = &self.storage {
                if let Err(err) = storage.start_reading(log, seqno, self.reader_id, first_open) {
                    incr(&self.metrics.storage_start_failures);
                    error!(
                        reader = %self.reader_id,
                        %log,
                        seqno,
                        %err,
                        "failed to start reading log"
                    );
                    return Err(err);
                }
            }
            state.start_seqno = state.start_seqno.min(seqno);
            state.last_read = seqno.saturating_sub(1);
        }
        Ok(())
    }

    /// Forgets `topic` on `log` after its last subscriber went away. When
    /// that was the last topic, the log is closed (and the storage reader
    /// released for physical readers).
    pub fn stop_reading(&mut self, topic: &TopicId, log: LogId) -> TailerResult<()> {
        let virtual_reader = self.is_virtual();
        let Some(state) = self.logs.get_mut(&log) else {
            return Ok(());
        };
        if state.topics.remove(topic).is_none() {
            return Ok(());
        }
        info!(
            reader = %self.reader_id,
            virtual_reader,
            %log,
            %topic,
            "no more subscribers on topic"
        );
        if !state.topics.is_empty() {
            return Ok(());
        }
        if let Some(storage) = &self.storage {
            if let Err(err) = storage.stop_reading(log, self.reader_id) {
                incr(&self.metrics.storage_stop_failures);
                error!(reader = %self.reader_id, %log, %err, "failed to stop reading log");
                return Err(err);
            }
        }
        info!(
            reader = %self.reader_id,
            virtual_reader,
            %log,
            "no more subscribers on log"
        );
        self.logs.remove(&log);
        Ok(())
    }

    /// Cost of accepting a new subscription at `seqno` (lower is better).
    pub fn subscription_cost(&self, topic: &TopicId, log: LogId, seqno: SequenceNumber) -> u64 {
        let Some(state) = self.logs.get(&log) else {
            // Not reading this log; opening it means a round trip to
            // storage, so an almost-caught-up reader should win instead.
            return SUBSCRIPTION_COST_START;
        };
        if state.last_read < seqno {
            // Catch up naturally; cost is the distance.
            return seqno - state.last_read;
        }
        match state.topics.get(topic) {
            // Already past seqno with no memory of the topic: rewind.
            None => SUBSCRIPTION_COST_REWIND,
            Some(topic_state) => {
                if seqno < topic_state.next_seqno {
                    SUBSCRIPTION_COST_REWIND
                } else {
                    0
                }
            }
        }
    }

    /// Whether `other` can subsume this reader's subscriptions on `log`:
    /// both physical, both on the log, identical positions.
    pub fn can_merge_into(&self, other: &LogReader, log: LogId) -> bool {
        debug_assert!(!self.is_virtual());
        debug_assert!(!other.is_virtual());
        let (Some(src), Some(dest)) = (self.logs.get(&log), other.logs.get(&log)) else {
            return false;
        };
        src.last_read == dest.last_read
    }

    /// Folds this reader's topic state on `log` into `other` and stops
    /// reading the log.
    ///
    /// Pre-condition: `can_merge_into(other, log)`.
    pub fn merge_into(&mut self, other: &mut LogReader, log: LogId) {
        debug_assert!(self.can_merge_into(other, log));
        let Some(src) = self.logs.remove(&log) else {
            return;
        };
        let Some(dest) = other.logs.get_mut(&log) else {
            return;
        };
        debug_assert_eq!(src.last_read, dest.last_read);
        info!(
            src = %self.reader_id,
            dest = %other.reader_id,
            %log,
            at = src.last_read,
            "merging readers"
        );

        for (topic, topic_state) in src.topics.iter() {
            match dest.topics.get_mut(topic) {
                Some(dest_state) => {
                    dest_state.next_seqno = dest_state.next_seqno.min(topic_state.next_seqno);
                }
                None => {
                    dest.topics.insert_back(topic.clone(), *topic_state);
                }
            }
        }
        dest.start_seqno = dest.start_seqno.min(src.start_seqno);

        if let Some(storage) = &self.storage {
            match storage.stop_reading(log, self.reader_id) {
                Ok(()) => {
                    info!(reader = %self.reader_id, %log, "reader stopped on log due to merge");
                }
                Err(err) => {
                    incr(&self.metrics.storage_stop_failures);
                    error!(reader = %self.reader_id, %log, %err, "failed to stop merged reader");
                }
            }
        }
    }

    /// Adopts the parked subscriptions a virtual reader holds on `log` and
    /// starts reading from their earliest position.
    pub fn steal_log_subscriptions(&mut self, from: &mut LogReader, log: LogId) {
        debug_assert!(from.is_virtual());
        debug_assert!(!self.is_virtual());
        debug_assert!(from.is_log_open(log));
        debug_assert!(!self.is_log_open(log));

        let Some(start_seqno) = from.logs.get(&log).map(|state| state.start_seqno) else {
            return;
        };
        let Some(storage) = &self.storage else {
            return;
        };
        match storage.start_reading(log, start_seqno, self.reader_id, true) {
            Ok(()) => {
                if let Some(state) = from.logs.remove(&log) {
                    debug_assert!(!state.topics.is_empty());
                    info!(
                        reader = %self.reader_id,
                        %log,
                        seqno = start_seqno,
                        topics = state.topics.len(),
                        "adopted parked subscriptions"
                    );
                    self.logs.insert(log, state);
                }
            }
            Err(err) => {
                incr(&self.metrics.storage_start_failures);
                error!(
                    reader = %self.reader_id,
                    %log,
                    seqno = start_seqno,
                    %err,
                    "failed to start reading for adopted subscriptions"
                );
            }
        }
    }

    /// Human-readable state of one log on this reader.
    pub fn log_info(&self, log: LogId) -> String {
        match self.logs.get(&log) {
            Some(state) => format!(
                "Log({log}).reader[{id}].start_seqno: {start}\n\
                 Log({log}).reader[{id}].last_read: {last}\n\
                 Log({log}).reader[{id}].num_topics_subscribed: {topics}\n",
                id = self.reader_id,
                start = state.start_seqno,
                last = state.last_read,
                topics = state.topics.len(),
            ),
            None => format!(
                "Log({log}).reader[{id}] not currently reading\n",
                id = self.reader_id
            ),
        }
    }

    /// Human-readable state of every open log on this reader.
    pub fn all_logs_info(&self) -> String {
        let mut logs: Vec<LogId> = self.logs.keys().copied().collect();
        logs.sort_unstable();
        logs.into_iter().map(|log| self.log_info(log)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockLogStorage;

    fn topic(name: &str) -> TopicId {
        TopicId::new("ns", name)
    }

    fn physical(storage: &Arc<MockLogStorage>, id: u64) -> LogReader {
        physical_with_metrics(storage, id, Arc::new(TailerMetrics::default()))
    }

    fn physical_with_metrics(
        storage: &Arc<MockLogStorage>,
        id: u64,
        metrics: Arc<TailerMetrics>,
    ) -> LogReader {
        LogReader::new(
            Some(Arc::clone(storage) as Arc<dyn LogStorage>),
            ReaderId::new(id),
            100,
            metrics,
        )
    }

    fn virtual_reader() -> LogReader {
        LogReader::new(None, ReaderId::new(0), 100, Arc::new(TailerMetrics::default()))
    }

    #[test]
    fn first_open_positions_storage_reader() {
        let storage = MockLogStorage::shared();
        let mut reader = physical(&storage, 1);
        reader.start_reading(&topic("a"), LogId::new(1), 10).unwrap();
        assert!(reader.is_log_open(LogId::new(1)));
        assert_eq!(
            storage.start_calls(),
            vec![(LogId::new(1), 10, ReaderId::new(1), true)]
        );
    }

    #[test]
    fn records_must_arrive_in_order() {
        let storage = MockLogStorage::shared();
        let mut reader = physical(&storage, 1);
        reader.start_reading(&topic("a"), LogId::new(1), 1).unwrap();

        assert!(matches!(
            reader.process_record(LogId::new(1), 5, &topic("a")),
            Err(TailerError::OutOfOrder {
                expected: 1,
                received: 5,
                ..
            })
        ));
        assert_eq!(
            reader.process_record(LogId::new(1), 1, &topic("a")).unwrap(),
            Some(1)
        );
        assert_eq!(
            reader.process_record(LogId::new(1), 2, &topic("a")).unwrap(),
            Some(2)
        );
    }

    #[test]
    fn unknown_topic_has_no_previous_seqno() {
        let storage = MockLogStorage::shared();
        let mut reader = physical(&storage, 1);
        reader.start_reading(&topic("a"), LogId::new(1), 1).unwrap();
        assert_eq!(
            reader.process_record(LogId::new(1), 1, &topic("b")).unwrap(),
            None
        );
        // The window still advanced.
        assert_eq!(
            reader.process_record(LogId::new(1), 2, &topic("a")).unwrap(),
            Some(1)
        );
    }

    #[test]
    fn unopened_log_rejects_records() {
        let storage = MockLogStorage::shared();
        let mut reader = physical(&storage, 1);
        assert!(matches!(
            reader.process_record(LogId::new(7), 1, &topic("a")),
            Err(TailerError::NotFound(_))
        ));
    }

    #[test]
    fn lower_seqno_rewinds_storage_reader() {
        let storage = MockLogStorage::shared();
        let mut reader = physical(&storage, 1);
        reader.start_reading(&topic("a"), LogId::new(1), 1).unwrap();
        for seqno in 1..=10 {
            reader.process_record(LogId::new(1), seqno, &topic("a")).unwrap();
        }

        reader.start_reading(&topic("b"), LogId::new(1), 5).unwrap();
        assert_eq!(
            storage.start_calls().last().copied().unwrap(),
            (LogId::new(1), 5, ReaderId::new(1), false)
        );
        // Window rewound: the next acceptable seqno is 5.
        assert_eq!(
            reader.process_record(LogId::new(1), 5, &topic("b")).unwrap(),
            Some(5)
        );
    }

    #[test]
    fn future_subscription_waits_for_catch_up() {
        let storage = MockLogStorage::shared();
        let mut reader = physical(&storage, 1);
        reader.start_reading(&topic("a"), LogId::new(1), 1).unwrap();
        reader.process_record(LogId::new(1), 1, &topic("a")).unwrap();

        reader.start_reading(&topic("b"), LogId::new(1), 50).unwrap();
        // No rewind issued for a position the reader has not reached.
        assert_eq!(storage.start_calls().len(), 1);
        assert_eq!(reader.subscription_cost(&topic("b"), LogId::new(1), 50), 49);
    }

    #[test]
    fn stop_reading_last_topic_closes_log() {
        let storage = MockLogStorage::shared();
        let mut reader = physical(&storage, 1);
        reader.start_reading(&topic("a"), LogId::new(1), 1).unwrap();
        reader.start_reading(&topic("b"), LogId::new(1), 1).unwrap();

        reader.stop_reading(&topic("a"), LogId::new(1)).unwrap();
        assert!(reader.is_log_open(LogId::new(1)));
        assert!(storage.stop_calls().is_empty());

        reader.stop_reading(&topic("b"), LogId::new(1)).unwrap();
        assert!(!reader.is_log_open(LogId::new(1)));
        assert_eq!(storage.stop_calls(), vec![(LogId::new(1), ReaderId::new(1))]);
    }

    #[test]
    fn subscription_cost_branches() {
        let storage = MockLogStorage::shared();
        let mut reader = physical(&storage, 1);

        // Unopened log: flat start cost.
        assert_eq!(
            reader.subscription_cost(&topic("a"), LogId::new(1), 10),
            SUBSCRIPTION_COST_START
        );

        reader.start_reading(&topic("a"), LogId::new(1), 1).unwrap();
        for seqno in 1..=10 {
            reader.process_record(LogId::new(1), seqno, &topic("a")).unwrap();
        }

        // Ahead of the reader: distance.
        assert_eq!(reader.subscription_cost(&topic("a"), LogId::new(1), 15), 5);
        // Behind, but the topic is known and at or past its position: free.
        assert_eq!(reader.subscription_cost(&topic("a"), LogId::new(1), 11), 0);
        // Behind the topic's known position: rewind.
        assert_eq!(
            reader.subscription_cost(&topic("a"), LogId::new(1), 3),
            SUBSCRIPTION_COST_REWIND
        );
        // Unknown topic on a log already read past the seqno: rewind.
        assert_eq!(
            reader.subscription_cost(&topic("zzz"), LogId::new(1), 3),
            SUBSCRIPTION_COST_REWIND
        );
    }

    #[test]
    fn merge_folds_topic_state_by_min() {
        let storage = MockLogStorage::shared();
        let log = LogId::new(1);
        let mut src = physical(&storage, 1);
        let mut dest = physical(&storage, 2);

        src.start_reading(&topic("a"), log, 1).unwrap();
        dest.start_reading(&topic("b"), log, 1).unwrap();
        for seqno in 1..=5 {
            src.process_record(log, seqno, &topic("a")).unwrap();
            dest.process_record(log, seqno, &topic("b")).unwrap();
        }
        assert!(src.can_merge_into(&dest, log));

        src.merge_into(&mut dest, log);
        assert!(!src.is_log_open(log));
        assert_eq!(storage.stop_calls(), vec![(log, ReaderId::new(1))]);
        // Both topics known to dest now; a's position carried over.
        assert_eq!(dest.subscription_cost(&topic("a"), log, 6), 0);
        assert_eq!(dest.subscription_cost(&topic("b"), log, 6), 0);
    }

    #[test]
    fn merge_requires_identical_positions() {
        let storage = MockLogStorage::shared();
        let log = LogId::new(1);
        let mut src = physical(&storage, 1);
        let mut dest = physical(&storage, 2);
        src.start_reading(&topic("a"), log, 1).unwrap();
        dest.start_reading(&topic("b"), log, 1).unwrap();
        src.process_record(log, 1, &topic("a")).unwrap();
        assert!(!src.can_merge_into(&dest, log));
        // Not reading the log at all.
        assert!(!src.can_merge_into(&dest, LogId::new(9)));
    }

    #[test]
    fn steal_moves_parked_state_onto_storage() {
        let storage = MockLogStorage::shared();
        let log = LogId::new(1);
        let mut parked = virtual_reader();
        parked.start_reading(&topic("a"), log, 3).unwrap();
        // Virtual readers never touch storage.
        assert!(storage.start_calls().is_empty());

        let mut reader = physical(&storage, 1);
        reader.steal_log_subscriptions(&mut parked, log);
        assert!(!parked.is_log_open(log));
        assert!(reader.is_log_open(log));
        assert_eq!(
            storage.start_calls(),
            vec![(log, 3, ReaderId::new(1), true)]
        );
        assert_eq!(reader.subscription_cost(&topic("a"), log, 3), 1);
    }

    #[test]
    fn bump_peels_lagging_topics_in_lru_order() {
        let storage = MockLogStorage::shared();
        let log = LogId::new(1);
        let mut reader = physical(&storage, 1);
        reader.start_reading(&topic("old"), log, 1).unwrap();
        reader.start_reading(&topic("hot"), log, 1).unwrap();
        reader.process_record(log, 1, &topic("old")).unwrap();
        for seqno in 2..=50 {
            reader.process_record(log, seqno, &topic("hot")).unwrap();
        }

        // Lag is 100: nothing to bump at seqno 50.
        let mut bumped = Vec::new();
        reader.bump_lagging_subscriptions(log, 50, |t, s| bumped.push((t.clone(), s)));
        assert!(bumped.is_empty());

        // Push the window far enough that "old" (at 2) lags out.
        for seqno in 51..=150 {
            reader.process_record(log, seqno, &topic("hot")).unwrap();
        }
        let mut bumped = Vec::new();
        reader.bump_lagging_subscriptions(log, 150, |t, s| bumped.push((t.clone(), s)));
        assert_eq!(bumped, vec![(topic("old"), 2)]);

        // Bumped topic is now recent; a second pass bumps nothing.
        let mut bumped = Vec::new();
        reader.bump_lagging_subscriptions(log, 150, |t, s| bumped.push((t.clone(), s)));
        assert!(bumped.is_empty());
    }

    #[test]
    fn flush_history_resets_window() {
        let storage = MockLogStorage::shared();
        let log = LogId::new(1);
        let mut reader = physical(&storage, 1);
        reader.start_reading(&topic("a"), log, 1).unwrap();
        for seqno in 1..=10 {
            reader.process_record(log, seqno, &topic("a")).unwrap();
        }

        // Gap pass then flush, as the coordinator drives it.
        reader.validate_gap(log, 11).unwrap();
        assert_eq!(reader.process_gap(log, &topic("a"), 11, 200), Some(11));
        reader.flush_history(log, 201);

        // Only seqno 201 lines up now.
        assert!(reader.process_record(log, 11, &topic("a")).is_err());
        assert_eq!(reader.process_record(log, 201, &topic("a")).unwrap(), Some(201));
    }

    #[test]
    fn benign_gap_advances_window_only() {
        let storage = MockLogStorage::shared();
        let log = LogId::new(1);
        let mut reader = physical(&storage, 1);
        reader.start_reading(&topic("a"), log, 1).unwrap();
        reader.process_record(log, 1, &topic("a")).unwrap();

        reader.validate_gap(log, 2).unwrap();
        reader.process_benign_gap(log, 2, 9);
        // Topic memory survives a benign gap untouched.
        assert_eq!(reader.process_record(log, 10, &topic("a")).unwrap(), Some(2));
    }

    #[test]
    fn storage_start_failure_is_counted() {
        let storage = MockLogStorage::shared();
        let metrics = Arc::new(TailerMetrics::default());
        let mut reader = physical_with_metrics(&storage, 1, Arc::clone(&metrics));

        storage.set_fail_start_reading(true);
        assert!(reader.start_reading(&topic("a"), LogId::new(1), 1).is_err());
        assert_eq!(metrics.snapshot().storage_start_failures, 1);
        // The reader keeps its intended logical state for an implicit retry.
        assert!(reader.is_log_open(LogId::new(1)));
    }

    #[test]
    fn storage_stop_failure_is_counted() {
        let storage = MockLogStorage::shared();
        let metrics = Arc::new(TailerMetrics::default());
        let mut reader = physical_with_metrics(&storage, 1, Arc::clone(&metrics));
        reader.start_reading(&topic("a"), LogId::new(1), 1).unwrap();

        storage.set_fail_stop_reading(true);
        assert!(reader.stop_reading(&topic("a"), LogId::new(1)).is_err());
        assert_eq!(metrics.snapshot().storage_stop_failures, 1);
    }

    #[test]
    fn info_strings_name_reader_state() {
        let storage = MockLogStorage::shared();
        let mut reader = physical(&storage, 3);
        assert!(reader.log_info(LogId::new(1)).contains("not currently reading"));
        reader.start_reading(&topic("a"), LogId::new(1), 5).unwrap();
        let info = reader.log_info(LogId::new(1));
        assert!(info.contains("start_seqno: 5"));
        assert!(info.contains("last_read: 4"));
        assert!(info.contains("num_topics_subscribed: 1"));
        assert_eq!(reader.all_logs_info(), info);
    }
}
