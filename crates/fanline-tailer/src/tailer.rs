//! The subscription-aware fan-out coordinator.
//!
//! One `TopicTailer` runs per worker and owns everything the worker knows:
//! a pool of physical [`LogReader`]s plus one virtual pending reader, the
//! per-log subscription lists, the tail-seqno estimates, the data cache,
//! and the stream index. All methods here are room-thread-only; the struct
//! is owned by the room loop and storage threads reach it exclusively
//! through the forward queues (see `room`).
//!
//! The reader-assignment policy: a new subscription goes to the physical
//! reader with the lowest cost. When every physical reader would have to
//! rewind, the subscription parks on the virtual reader instead; readers
//! merge whenever their positions converge on a log, and the reader freed
//! by a merge adopts the parked subscriptions.

use std::collections::HashMap;
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, TryRecvError, unbounded};
use fanline_queue::Signal;
use tracing::{debug, info, warn};

use crate::cache::DataCache;
use crate::config::{LogId, ReaderId, StreamId, TenantId, TopicTailerConfig};
use crate::error::{TailerError, TailerResult};
use crate::message::{CopilotSub, GapKind, GapMessage, Message, MessageData, TopicId};
use crate::metrics::{add, incr, TailerMetrics};
use crate::reader::LogReader;
use crate::room::RoomCommand;
use crate::storage::{LogRouter, LogStorage};
use crate::subscriptions::StreamSubscriptions;
use crate::topics::TopicManager;
use crate::SequenceNumber;

/// Outbound delivery callback, invoked on the room thread.
pub type OnMessage = Box<dyn FnMut(Message, Vec<CopilotSub>) + Send>;

pub struct TopicTailer {
    storage: Arc<dyn LogStorage>,
    router: Arc<dyn LogRouter>,
    on_message: OnMessage,
    config: TopicTailerConfig,
    readers: Vec<LogReader>,
    pending_reader: Option<LogReader>,
    /// Subscription lists, per log.
    topic_map: HashMap<LogId, TopicManager>,
    /// Best-effort lower bound on each log's tail.
    tail_seqno_cache: HashMap<LogId, SequenceNumber>,
    stream_subscriptions: StreamSubscriptions,
    /// Subscribe-at-tail requests whose find is still in flight. Removal of
    /// the subscription cancels the entry, so a late completion is dropped
    /// instead of installing dead state.
    pending_tail_finds: HashMap<CopilotSub, TopicId>,
    cache: DataCache,
    metrics: Arc<TailerMetrics>,
    control_tx: Sender<RoomCommand>,
    control_rx: Receiver<RoomCommand>,
    doorbell: Signal,
}

impl TopicTailer {
    pub fn new(
        storage: Arc<dyn LogStorage>,
        router: Arc<dyn LogRouter>,
        config: TopicTailerConfig,
        on_message: OnMessage,
    ) -> Self {
        let (control_tx, control_rx) = unbounded();
        let cache = DataCache::new(config.cache.clone());
        Self {
            storage,
            router,
            on_message,
            config,
            readers: Vec::new(),
            pending_reader: None,
            topic_map: HashMap::new(),
            tail_seqno_cache: HashMap::new(),
            stream_subscriptions: StreamSubscriptions::new(),
            pending_tail_finds: HashMap::new(),
            cache,
            metrics: Arc::new(TailerMetrics::default()),
            control_tx,
            control_rx,
            doorbell: Signal::new(),
        }
    }

    /// Creates one physical reader per id plus the virtual pending reader.
    /// Must be called once before any subscribe or record processing.
    pub fn initialize(
        &mut self,
        reader_ids: &[ReaderId],
        max_subscription_lag: u64,
    ) -> TailerResult<()> {
        if self.is_initialized() {
            return Err(TailerError::internal("tailer already initialized"));
        }
        if reader_ids.is_empty() {
            return Err(TailerError::internal("at least one reader id required"));
        }
        for &reader_id in reader_ids {
            self.readers.push(LogReader::new(
                Some(Arc::clone(&self.storage)),
                reader_id,
                max_subscription_lag,
                Arc::clone(&self.metrics),
            ));
        }
        self.pending_reader = Some(LogReader::new(
            None, // no storage cursor: virtual
            ReaderId::new(0),
            max_subscription_lag,
            Arc::clone(&self.metrics),
        ));
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.pending_reader.is_some()
    }

    pub fn config(&self) -> &TopicTailerConfig {
        &self.config
    }

    pub fn metrics(&self) -> Arc<TailerMetrics> {
        Arc::clone(&self.metrics)
    }

    pub(crate) fn control_sender(&self) -> Sender<RoomCommand> {
        self.control_tx.clone()
    }

    pub(crate) fn doorbell(&self) -> Signal {
        self.doorbell.clone()
    }

    /// Subscribes `id` to `topic` starting at `start`. A zero start means
    /// "from the tail": served from the cached tail estimate when one
    /// exists, otherwise resolved through an asynchronous find whose
    /// completion re-enters through the control channel.
    pub fn add_subscriber(
        &mut self,
        topic: &TopicId,
        start: SequenceNumber,
        id: CopilotSub,
    ) -> TailerResult<()> {
        self.ensure_initialized()?;
        incr(&self.metrics.add_subscriber_requests);

        let log = self.router.log_id(topic)?;

        if start != 0 {
            self.add_subscriber_internal(topic, id, log, start);
            return Ok(());
        }

        incr(&self.metrics.add_subscriber_requests_at_0);
        let tail_seqno = self.tail_seqno_estimate(log);
        if tail_seqno != 0 {
            incr(&self.metrics.add_subscriber_requests_at_0_fast);
            self.add_tail_subscriber(topic, id, log, tail_seqno);
            return Ok(());
        }

        incr(&self.metrics.add_subscriber_requests_at_0_slow);
        self.pending_tail_finds.insert(id, topic.clone());

        let control = self.control_tx.clone();
        let doorbell = self.doorbell.clone();
        let callback_topic = topic.clone();
        let callback = Box::new(move |result: TailerResult<SequenceNumber>| match result {
            Err(err) => {
                warn!(topic = %callback_topic, %err, "failed to find latest seqno");
                // The room owns the in-flight entry; ask it to clear it so
                // the failed request leaves nothing behind.
                if control.send(RoomCommand::TailFindFailed { id }).is_ok() {
                    doorbell.notify();
                }
            }
            Ok(seqno) => {
                // Invoked on a storage thread; hand the result to the room.
                let sent = control.send(RoomCommand::TailSubscribe {
                    topic: callback_topic.clone(),
                    id,
                    log,
                    seqno,
                });
                match sent {
                    Ok(()) => doorbell.notify(),
                    Err(_) => warn!(
                        topic = %callback_topic,
                        %id,
                        "room gone; dropping tail subscription"
                    ),
                }
            }
        });

        match self.storage.find_latest_seqno(log, callback) {
            Ok(()) => {
                info!(%topic, %id, %log, "sent find-latest-seqno request");
            }
            Err(err) => {
                // The client retries; nothing was installed.
                warn!(%topic, %id, %err, "failed to issue find-latest-seqno");
                self.pending_tail_finds.remove(&id);
            }
        }
        Ok(())
    }

    /// Removes one subscription by id.
    pub fn remove_subscriber(&mut self, id: CopilotSub) -> TailerResult<()> {
        self.ensure_initialized()?;
        incr(&self.metrics.remove_subscriber_requests);

        let had_pending_find = self.pending_tail_finds.remove(&id).is_some();
        if had_pending_find {
            debug!(%id, "cancelled in-flight tail find");
        }

        let Some(topic) = self.stream_subscriptions.move_out(id.stream, id.sub) else {
            if had_pending_find {
                // Unsubscribed before the find completed; nothing installed.
                return Ok(());
            }
            warn!(%id, "cannot remove unknown subscription");
            return Err(TailerError::not_found(format!("subscription {id}")));
        };

        let log = self.router.log_id(&topic)?;
        debug!(%id, %topic, "unsubscribed");
        self.remove_subscriber_internal(&topic, id, log);
        Ok(())
    }

    /// Removes every subscription on a stream (client connection went away).
    pub fn remove_stream(&mut self, stream: StreamId) -> TailerResult<()> {
        self.ensure_initialized()?;
        debug!(%stream, "stream unsubscribed from all topics");

        self.pending_tail_finds.retain(|sub, _| sub.stream != stream);

        for (sub_id, topic) in self.stream_subscriptions.stream_snapshot(stream) {
            match self.router.log_id(&topic) {
                Ok(log) => {
                    self.remove_subscriber_internal(&topic, CopilotSub::new(stream, sub_id), log);
                }
                Err(err) => {
                    warn!(%topic, %err, "cannot route topic during stream teardown");
                }
            }
        }
        self.stream_subscriptions.remove_stream(stream);
        Ok(())
    }

    /// Processes one record delivered by storage reader `reader_id`. Room
    /// thread only; records reach here through the forward queues.
    pub fn on_log_record(&mut self, record: MessageData, log: LogId, reader_id: ReaderId) {
        if !self.is_initialized() {
            warn!(%log, %reader_id, "record before initialize; dropped");
            return;
        }
        let Some(idx) = self.reader_index(reader_id) else {
            warn!(%log, %reader_id, "record from unknown reader; dropped");
            return;
        };

        incr(&self.metrics.records_received);
        add(
            &self.metrics.records_received_payload_bytes,
            record.payload_len() as u64,
        );

        let topic = record.topic().clone();
        let seqno = record.seqno();
        let processed = self.readers[idx].process_record(log, seqno, &topic);

        let record = Arc::new(record);
        if self.cache.is_enabled() {
            // Cached before delivery stamping, so cache hits re-stamp their
            // own continuity pair.
            self.cache.store(log, Arc::clone(&record));
        }

        let mut is_tail = false;
        if let Some(estimate) = self.tail_seqno_cache.get_mut(&log) {
            if *estimate <= seqno {
                is_tail = true;
                *estimate = seqno + 1;
            }
        }
        if is_tail {
            incr(&self.metrics.tail_records_received);
        } else {
            incr(&self.metrics.backlog_records_received);
        }

        match processed {
            Ok(Some(prev_seqno)) => {
                let mut recipients = Vec::new();
                if let Some(manager) = self.topic_map.get_mut(&log) {
                    manager.visit_subscribers(&topic, prev_seqno, seqno, |sub| {
                        recipients.push(sub.id());
                        sub.set_expected_seqno(seqno + 1);
                        debug!(id = %sub.id(), %topic, advanced_to = seqno + 1, %log, "subscriber advanced");
                    });
                }
                if recipients.is_empty() {
                    incr(&self.metrics.records_without_subscriptions);
                    debug!(
                        reader = %reader_id,
                        %topic,
                        from = prev_seqno,
                        to = seqno,
                        is_tail,
                        "no recipients for record"
                    );
                } else {
                    let mut data = (*record).clone();
                    data.set_sequence_numbers(prev_seqno, seqno);
                    incr(&self.metrics.records_with_subscriptions);
                    self.emit(Message::Data(data), recipients);
                }
                self.bump_lagging(idx, log, seqno);
            }
            Ok(None) => {
                // Processed, but this reader holds no state for the topic:
                // nobody subscribed it here, so nothing to deliver.
                incr(&self.metrics.records_without_subscriptions);
                debug!(reader = %reader_id, %topic, seqno, %log, "record on untracked topic");
            }
            Err(err) => {
                incr(&self.metrics.records_out_of_order);
                debug!(reader = %reader_id, %log, seqno, %err, "failed to process record");
            }
        }

        self.attempt_reader_merges(idx, log);
    }

    /// Processes one gap delivered by storage reader `reader_id`.
    pub fn on_gap_record(
        &mut self,
        log: LogId,
        kind: GapKind,
        from: SequenceNumber,
        to: SequenceNumber,
        reader_id: ReaderId,
    ) {
        if !self.is_initialized() {
            warn!(%log, %reader_id, "gap before initialize; dropped");
            return;
        }
        let Some(idx) = self.reader_index(reader_id) else {
            warn!(%log, %reader_id, "gap from unknown reader; dropped");
            return;
        };

        incr(&self.metrics.gap_records_received);
        if self.readers[idx].validate_gap(log, from).is_err() {
            incr(&self.metrics.gap_records_out_of_order);
            return;
        }

        if let Some(estimate) = self.tail_seqno_cache.get_mut(&log) {
            if *estimate <= to {
                *estimate = to + 1;
            }
        }

        // Per-topic pass: advance reader state and notify subscribers for
        // every topic subscribed on this log.
        let topics = self
            .topic_map
            .get(&log)
            .map(TopicManager::topic_ids)
            .unwrap_or_default();
        for topic in topics {
            // A reader with no state for the topic must not advance that
            // topic's subscribers: they are served by another reader,
            // possibly positioned behind this one.
            let Some(visit_from) = self.readers[idx].process_gap(log, &topic, from, to) else {
                incr(&self.metrics.gaps_without_subscriptions);
                continue;
            };

            let mut recipients = Vec::new();
            if let Some(manager) = self.topic_map.get_mut(&log) {
                manager.visit_subscribers(&topic, visit_from, to, |sub| {
                    recipients.push(sub.id());
                    sub.set_expected_seqno(to + 1);
                    debug!(id = %sub.id(), %topic, advanced_to = to + 1, %log, "subscriber advanced past gap");
                });
            }
            if recipients.is_empty() {
                incr(&self.metrics.gaps_without_subscriptions);
            } else {
                incr(&self.metrics.gaps_with_subscriptions);
                self.emit(
                    Message::Gap(GapMessage {
                        tenant: TenantId::GUEST,
                        topic,
                        kind,
                        from: visit_from,
                        to,
                    }),
                    recipients,
                );
            }
        }

        if kind.is_malignant() {
            // History below the gap is gone; the reader must not claim it.
            incr(&self.metrics.malignant_gaps_received);
            self.readers[idx].flush_history(log, to + 1);
        } else {
            incr(&self.metrics.benign_gaps_received);
            self.readers[idx].process_benign_gap(log, from, to);
        }

        self.attempt_reader_merges(idx, log);
    }

    /// Completion of a subscribe-at-tail find, re-entered from the control
    /// channel. Dropped when the subscription was removed in the meantime.
    pub fn on_tail_subscribe(
        &mut self,
        topic: TopicId,
        id: CopilotSub,
        log: LogId,
        seqno: SequenceNumber,
    ) {
        if self.pending_tail_finds.remove(&id).is_none() {
            incr(&self.metrics.stale_tail_subscriptions);
            debug!(%id, %topic, "dropping stale tail subscription");
            return;
        }

        self.add_tail_subscriber(&topic, id, log, seqno);

        info!(%log, seqno, "suggesting tail for log");
        self.tail_seqno_cache
            .entry(log)
            .and_modify(|estimate| *estimate = (*estimate).max(seqno))
            .or_insert(seqno);
    }

    /// A subscribe-at-tail find failed on the storage side; forget the
    /// in-flight entry so nothing lingers until the client unsubscribes.
    pub fn on_tail_find_failed(&mut self, id: CopilotSub) {
        if self.pending_tail_finds.remove(&id).is_some() {
            debug!(%id, "cleared tail find after storage failure");
        }
    }

    /// Applies one room command. Returns false when the command asks the
    /// room to shut down.
    pub fn apply(&mut self, command: RoomCommand) -> bool {
        match command {
            RoomCommand::Record {
                record,
                log,
                reader,
            } => {
                self.on_log_record(record, log, reader);
                true
            }
            RoomCommand::Gap {
                log,
                kind,
                from,
                to,
                reader,
            } => {
                self.on_gap_record(log, kind, from, to, reader);
                true
            }
            RoomCommand::TailSubscribe {
                topic,
                id,
                log,
                seqno,
            } => {
                self.on_tail_subscribe(topic, id, log, seqno);
                true
            }
            RoomCommand::TailFindFailed { id } => {
                self.on_tail_find_failed(id);
                true
            }
            RoomCommand::Shutdown => false,
        }
    }

    /// Drains the control channel. Returns the number of commands applied
    /// and whether a shutdown was requested.
    pub fn poll_control(&mut self) -> (usize, bool) {
        let mut applied = 0;
        loop {
            match self.control_rx.try_recv() {
                Ok(command) => {
                    applied += 1;
                    if !self.apply(command) {
                        return (applied, true);
                    }
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {
                    return (applied, false);
                }
            }
        }
    }

    /// Lower-bound estimate of the log's tail seqno, or 0 when unknown.
    pub fn tail_seqno_estimate(&self, log: LogId) -> SequenceNumber {
        self.tail_seqno_cache.get(&log).copied().unwrap_or(0)
    }

    /// Human-readable information about one log.
    pub fn log_info(&self, log: LogId) -> String {
        let mut out = format!(
            "Log({log}).tail_seqno_cached: {}\n",
            self.tail_seqno_estimate(log)
        );
        for reader in &self.readers {
            out.push_str(&reader.log_info(log));
        }
        out
    }

    /// Human-readable information about every log with state.
    pub fn all_logs_info(&self) -> String {
        let mut out = String::new();
        let mut logs: Vec<(LogId, SequenceNumber)> = self
            .tail_seqno_cache
            .iter()
            .map(|(&log, &seqno)| (log, seqno))
            .collect();
        logs.sort_unstable();
        for (log, seqno) in logs {
            out.push_str(&format!("Log({log}).tail_seqno_cached: {seqno}\n"));
        }
        for reader in &self.readers {
            out.push_str(&reader.all_logs_info());
        }
        out
    }

    pub fn clear_cache(&mut self) {
        info!("clearing data cache");
        self.cache.clear();
    }

    pub fn set_cache_capacity(&mut self, capacity_bytes: usize) {
        info!(capacity_bytes, "setting data cache capacity");
        self.cache.set_capacity(capacity_bytes);
    }

    pub fn cache_usage(&self) -> usize {
        self.cache.usage()
    }

    pub fn cache_capacity(&self) -> usize {
        self.cache.capacity()
    }

    fn ensure_initialized(&self) -> TailerResult<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(TailerError::NotInitialized)
        }
    }

    fn emit(&mut self, message: Message, recipients: Vec<CopilotSub>) {
        (self.on_message)(message, recipients);
    }

    fn reader_index(&self, reader_id: ReaderId) -> Option<usize> {
        // Reader pools are small; a scan beats a map here.
        self.readers
            .iter()
            .position(|reader| reader.reader_id() == reader_id)
    }

    /// Informs a tail subscriber of the starting point with a synthetic
    /// benign gap, then installs the subscription at the tail.
    fn add_tail_subscriber(
        &mut self,
        topic: &TopicId,
        id: CopilotSub,
        log: LogId,
        seqno: SequenceNumber,
    ) {
        debug!(%topic, to = seqno.saturating_sub(1), %log, "sending tail gap message");
        if seqno > 0 {
            self.emit(
                Message::Gap(GapMessage {
                    tenant: TenantId::GUEST,
                    topic: topic.clone(),
                    kind: GapKind::Benign,
                    from: 0,
                    to: seqno - 1,
                }),
                vec![id],
            );
        }
        self.add_subscriber_internal(topic, id, log, seqno.max(1));
    }

    fn add_subscriber_internal(
        &mut self,
        topic: &TopicId,
        id: CopilotSub,
        log: LogId,
        seqno: SequenceNumber,
    ) {
        debug_assert_ne!(seqno, 0);

        // Serve as much prefix as possible from the cache first.
        let seqno = self.deliver_from_cache(topic, id, log, seqno);

        let was_added = self
            .topic_map
            .entry(log)
            .or_default()
            .add_subscriber(topic, seqno, id);
        if !was_added {
            incr(&self.metrics.updated_subscriptions);
        }

        // The subscription seqno is the next one to deliver; without
        // past-end support the reader must be positioned on a seqno that
        // exists.
        let from = if self.storage.can_subscribe_past_end() {
            seqno
        } else {
            seqno.saturating_sub(1)
        };

        let choice = self.reader_for_new_subscription(topic, log, from);
        match choice {
            Some(idx) => {
                let _ = self.readers[idx].start_reading(topic, log, from);
                debug!(
                    %id,
                    %topic,
                    seqno,
                    reader = %self.readers[idx].reader_id(),
                    update = !was_added,
                    "subscribed on reader"
                );
            }
            None => {
                if let Some(pending) = self.pending_reader.as_mut() {
                    let _ = pending.start_reading(topic, log, from);
                    debug!(%id, %topic, seqno, update = !was_added, "subscribed on virtual reader");
                }
            }
        }

        self.stream_subscriptions.insert(id.stream, id.sub, topic.clone());
    }

    /// Picks the cheapest physical reader for a new subscription, or `None`
    /// for the virtual pending reader when every physical reader would have
    /// to rewind.
    ///
    /// With a single reader there is nowhere to park subscriptions waiting
    /// for a merge, so rewinds are taken as they come.
    fn reader_for_new_subscription(
        &self,
        topic: &TopicId,
        log: LogId,
        seqno: SequenceNumber,
    ) -> Option<usize> {
        if self.readers.len() == 1 {
            return Some(0);
        }
        let mut best = None;
        let mut best_cost = crate::reader::SUBSCRIPTION_COST_REWIND;
        for (idx, reader) in self.readers.iter().enumerate() {
            let cost = reader.subscription_cost(topic, log, seqno);
            if cost < best_cost {
                best = Some(idx);
                best_cost = cost;
            }
        }
        best
    }

    /// Serves the cached prefix of a new subscription: every cached record
    /// on the topic is delivered with a stamped continuity pair, and the
    /// distance to the end of the cached range is bridged with one benign
    /// gap. Returns the seqno the subscription should be installed at.
    fn deliver_from_cache(
        &mut self,
        topic: &TopicId,
        id: CopilotSub,
        log: LogId,
        seqno: SequenceNumber,
    ) -> SequenceNumber {
        if !self.cache.is_enabled() {
            return seqno;
        }
        debug_assert_ne!(seqno, 0);

        let mut matches = Vec::new();
        let next = self.cache.visit(log, seqno, |record| {
            if record.topic() == topic {
                matches.push(Arc::clone(record));
            }
        });

        let mut delivered = seqno;
        for record in matches {
            let mut data = (*record).clone();
            let cached_seqno = data.seqno();
            data.set_sequence_numbers(delivered, cached_seqno);
            delivered = cached_seqno + 1;
            incr(&self.metrics.records_served_from_cache);
            self.emit(Message::Data(data), vec![id]);
        }

        // Bridge from the last delivered record to the end of the cached
        // range, so the subscription resumes where the cache ends.
        if next > delivered {
            self.emit(
                Message::Gap(GapMessage {
                    tenant: TenantId::GUEST,
                    topic: topic.clone(),
                    kind: GapKind::Benign,
                    from: delivered,
                    to: next - 1,
                }),
                vec![id],
            );
        }
        if next != seqno {
            debug!(%id, %topic, from = seqno, to = next, "subscription fast-forwarded from cache");
        }
        next
    }

    fn remove_subscriber_internal(&mut self, topic: &TopicId, id: CopilotSub, log: LogId) {
        let Some(manager) = self.topic_map.get_mut(&log) else {
            return;
        };
        let all_removed = manager.remove_subscriber(topic, id);
        if manager.is_empty() {
            self.topic_map.remove(&log);
        }
        if !all_removed {
            return;
        }

        // Last subscriber on the topic: every reader forgets it, and the
        // tail estimate dies with the log's last open reader.
        let mut log_closed = true;
        for reader in &mut self.readers {
            let _ = reader.stop_reading(topic, log);
            log_closed = log_closed && !reader.is_log_open(log);
        }
        if let Some(pending) = self.pending_reader.as_mut() {
            let _ = pending.stop_reading(topic, log);
            log_closed = log_closed && !pending.is_log_open(log);
        }
        if log_closed {
            self.tail_seqno_cache.remove(&log);
        }
    }

    /// Bumps lagging topics on the reader and sends each bumped topic's
    /// subscribers a benign gap up to `seqno`.
    fn bump_lagging(&mut self, idx: usize, log: LogId, seqno: SequenceNumber) {
        let mut bumped = Vec::new();
        self.readers[idx].bump_lagging_subscriptions(log, seqno, |topic, last_known| {
            bumped.push((topic.clone(), last_known));
        });

        for (topic, last_known) in bumped {
            let mut recipients = Vec::new();
            if let Some(manager) = self.topic_map.get_mut(&log) {
                manager.visit_subscribers(&topic, last_known, seqno, |sub| {
                    recipients.push(sub.id());
                    sub.set_expected_seqno(seqno + 1);
                    debug!(id = %sub.id(), %topic, bumped_to = seqno + 1, %log, "subscriber bumped");
                });
            }
            if !recipients.is_empty() {
                add(&self.metrics.bumped_subscriptions, recipients.len() as u64);
                self.emit(
                    Message::Gap(GapMessage {
                        tenant: TenantId::GUEST,
                        topic,
                        kind: GapKind::Benign,
                        from: last_known,
                        to: seqno,
                    }),
                    recipients,
                );
            }
        }
    }

    /// Merges `src` into the first other reader at the same position on
    /// `log`, then hands the freed reader any subscriptions parked on the
    /// virtual reader for that log.
    fn attempt_reader_merges(&mut self, src_idx: usize, log: LogId) {
        for dest_idx in 0..self.readers.len() {
            if dest_idx == src_idx {
                continue;
            }
            let (src, dest) = pair_mut(&mut self.readers, src_idx, dest_idx);
            if !src.can_merge_into(dest, log) {
                continue;
            }
            src.merge_into(dest, log);

            if let Some(pending) = self.pending_reader.as_mut() {
                if pending.is_log_open(log) {
                    self.readers[src_idx].steal_log_subscriptions(pending, log);
                }
            }
            break;
        }
    }
}

/// Two distinct mutable elements of a slice.
fn pair_mut<T>(slice: &mut [T], a: usize, b: usize) -> (&mut T, &mut T) {
    debug_assert_ne!(a, b);
    if a < b {
        let (left, right) = slice.split_at_mut(b);
        (&mut left[a], &mut right[0])
    } else {
        let (left, right) = slice.split_at_mut(a);
        (&mut right[0], &mut left[b])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SubscriptionId;
    use crate::storage::HashLogRouter;
    use crate::test_support::{CollectingSink, MockLogStorage};

    fn sub(stream: u64, id: u64) -> CopilotSub {
        CopilotSub::new(StreamId::new(stream), SubscriptionId::new(id))
    }

    fn make_tailer(storage: Arc<MockLogStorage>, sink: &CollectingSink) -> TopicTailer {
        TopicTailer::new(
            storage,
            Arc::new(HashLogRouter::new(4).unwrap()),
            TopicTailerConfig::for_tests(),
            sink.callback(),
        )
    }

    #[test]
    fn operations_require_initialize() {
        let sink = CollectingSink::new();
        let mut tailer = make_tailer(MockLogStorage::shared(), &sink);
        let topic = TopicId::new("ns", "t");
        assert_eq!(
            tailer.add_subscriber(&topic, 1, sub(1, 1)),
            Err(TailerError::NotInitialized)
        );
        assert_eq!(
            tailer.remove_subscriber(sub(1, 1)),
            Err(TailerError::NotInitialized)
        );
        tailer.initialize(&[ReaderId::new(1)], 100).unwrap();
        assert!(tailer.add_subscriber(&topic, 1, sub(1, 1)).is_ok());
    }

    #[test]
    fn initialize_twice_is_rejected() {
        let sink = CollectingSink::new();
        let mut tailer = make_tailer(MockLogStorage::shared(), &sink);
        tailer.initialize(&[ReaderId::new(1)], 100).unwrap();
        assert!(tailer.initialize(&[ReaderId::new(2)], 100).is_err());
    }

    #[test]
    fn initialize_needs_readers() {
        let sink = CollectingSink::new();
        let mut tailer = make_tailer(MockLogStorage::shared(), &sink);
        assert!(tailer.initialize(&[], 100).is_err());
    }

    #[test]
    fn removing_unknown_subscription_is_not_found() {
        let sink = CollectingSink::new();
        let mut tailer = make_tailer(MockLogStorage::shared(), &sink);
        tailer.initialize(&[ReaderId::new(1)], 100).unwrap();
        assert!(matches!(
            tailer.remove_subscriber(sub(5, 5)),
            Err(TailerError::NotFound(_))
        ));
    }

    #[test]
    fn pair_mut_returns_distinct_elements() {
        let mut values = [1, 2, 3, 4];
        let (a, b) = pair_mut(&mut values, 0, 3);
        std::mem::swap(a, b);
        assert_eq!(values, [4, 2, 3, 1]);
        let (a, b) = pair_mut(&mut values, 2, 1);
        std::mem::swap(a, b);
        assert_eq!(values, [4, 3, 2, 1]);
    }
}
