//! The room thread: sole mutator of tailer state.
//!
//! Storage threads never touch the `TopicTailer` directly. Each storage
//! thread gets a [`TailerHandle`] owning the producer side of a bounded
//! SPSC queue; records and gaps ride those queues as owned
//! [`RoomCommand`]s and are applied by the room loop, which also owns the
//! outbound delivery callback. Low-rate commands that originate on
//! arbitrary threads (tail-subscribe completions, shutdown) ride an
//! unbounded control channel instead, since they own no ring and losing
//! one would strand a client.
//!
//! Back-pressure: a full ring hands the record back to the storage caller
//! (`NoBuffer`), which retries later with the same message.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::Sender;
use fanline_queue::{spsc, Consumer, Producer, PushError, Signal};
use rand::rngs::SmallRng;
use rand::{Rng, RngCore, SeedableRng};
use tracing::{debug, info};

use crate::config::{LogId, ReaderId};
use crate::error::{TailerError, TailerResult};
use crate::message::{CopilotSub, GapKind, MessageData, TopicId};
use crate::metrics::{incr, TailerMetrics};
use crate::tailer::TopicTailer;
use crate::SequenceNumber;

/// Work posted to the room thread. Owned data only; nothing borrows the
/// posting thread.
#[derive(Debug)]
pub enum RoomCommand {
    /// A record delivered by a storage reader.
    Record {
        record: MessageData,
        log: LogId,
        reader: ReaderId,
    },
    /// A gap delivered by a storage reader.
    Gap {
        log: LogId,
        kind: GapKind,
        from: SequenceNumber,
        to: SequenceNumber,
        reader: ReaderId,
    },
    /// Completion of a subscribe-at-tail find.
    TailSubscribe {
        topic: TopicId,
        id: CopilotSub,
        log: LogId,
        seqno: SequenceNumber,
    },
    /// A subscribe-at-tail find failed; the room drops its in-flight entry.
    TailFindFailed { id: CopilotSub },
    /// Stop the room loop.
    Shutdown,
}

/// The forward queue rejected a record; ownership returns to the caller,
/// which must retry with the same record.
#[derive(Debug, thiserror::Error)]
#[error("no buffer space in forward queue")]
pub struct SendRecordError {
    pub record: MessageData,
}

impl SendRecordError {
    pub fn into_record(self) -> MessageData {
        self.record
    }
}

impl From<SendRecordError> for TailerError {
    fn from(_: SendRecordError) -> Self {
        TailerError::NoBuffer
    }
}

/// Per-storage-thread sender into the room. `Send` but not `Clone`: one
/// handle per storage thread keeps each queue single-producer.
pub struct TailerHandle {
    queue: Producer<RoomCommand>,
    doorbell: Signal,
    metrics: Arc<TailerMetrics>,
    fault_rate: f64,
    rng: SmallRng,
}

impl TailerHandle {
    /// Posts a record for room-thread processing. On back-pressure the
    /// record comes back inside the error.
    pub fn send_log_record(
        &mut self,
        record: MessageData,
        log: LogId,
        reader: ReaderId,
    ) -> Result<(), SendRecordError> {
        if self.fault_rate > 0.0 && self.rng.random::<f64>() < self.fault_rate {
            incr(&self.metrics.forward_queue_rejections);
            debug!(%log, %reader, "forcing send_log_record failure");
            return Err(SendRecordError { record });
        }
        match self.queue.push(RoomCommand::Record {
            record,
            log,
            reader,
        }) {
            Ok(()) => {
                self.doorbell.notify();
                Ok(())
            }
            Err(err) => {
                incr(&self.metrics.forward_queue_rejections);
                let RoomCommand::Record { record, .. } = err.into_inner() else {
                    unreachable!("pushed a record command");
                };
                Err(SendRecordError { record })
            }
        }
    }

    /// Posts a gap for room-thread processing. Gaps are cheap for the
    /// storage layer to rebuild, so the error carries no payload.
    pub fn send_gap_record(
        &mut self,
        log: LogId,
        kind: GapKind,
        from: SequenceNumber,
        to: SequenceNumber,
        reader: ReaderId,
    ) -> TailerResult<()> {
        match self.queue.push(RoomCommand::Gap {
            log,
            kind,
            from,
            to,
            reader,
        }) {
            Ok(()) => {
                self.doorbell.notify();
                Ok(())
            }
            Err(PushError::Full(_)) | Err(PushError::Closed(_)) => {
                incr(&self.metrics.forward_queue_rejections);
                Err(TailerError::NoBuffer)
            }
        }
    }
}

/// Clonable shutdown handle for a room.
#[derive(Clone)]
pub struct RoomController {
    control: Sender<RoomCommand>,
    doorbell: Signal,
}

impl RoomController {
    /// Asks the room loop to stop after draining what it already accepted.
    pub fn shutdown(&self) {
        let _ = self.control.send(RoomCommand::Shutdown);
        self.doorbell.notify();
    }
}

/// Owns a [`TopicTailer`] and executes commands against it.
pub struct Room {
    tailer: TopicTailer,
    consumers: Vec<Consumer<RoomCommand>>,
    doorbell: Signal,
    idle_park: Duration,
}

impl Room {
    pub fn new(tailer: TopicTailer) -> Self {
        let doorbell = tailer.doorbell();
        let idle_park = Duration::from_millis(tailer.config().room_idle_park_ms);
        Self {
            tailer,
            consumers: Vec::new(),
            doorbell,
            idle_park,
        }
    }

    /// Mints a handle for one storage thread, backed by its own bounded
    /// queue.
    pub fn handle(&mut self) -> TailerHandle {
        let config = self.tailer.config();
        let capacity = config.forward_queue_capacity;
        let fault_rate = config.fault_send_log_record_failure_rate;
        let (producer, consumer) = spsc(capacity);
        self.consumers.push(consumer);
        TailerHandle {
            queue: producer,
            doorbell: self.doorbell.clone(),
            metrics: self.tailer.metrics(),
            fault_rate,
            rng: SmallRng::seed_from_u64(rand::rng().next_u64()),
        }
    }

    pub fn controller(&self) -> RoomController {
        RoomController {
            control: self.tailer.control_sender(),
            doorbell: self.doorbell.clone(),
        }
    }

    pub fn tailer(&self) -> &TopicTailer {
        &self.tailer
    }

    pub fn tailer_mut(&mut self) -> &mut TopicTailer {
        &mut self.tailer
    }

    /// One non-blocking drain pass over the control channel and every
    /// forward queue. Returns the number of commands applied.
    pub fn poll(&mut self) -> usize {
        self.drain().0
    }

    /// Runs until shutdown, parking on the doorbell when idle. Returns the
    /// tailer for post-shutdown inspection.
    pub fn run(mut self) -> TopicTailer {
        info!("room loop started");
        loop {
            let (processed, shutdown) = self.drain();
            if shutdown {
                break;
            }
            if processed == 0 {
                self.doorbell.wait(self.idle_park);
            }
        }
        info!("room loop stopped");
        self.tailer
    }

    /// Moves the room onto its own thread.
    pub fn spawn(self) -> RoomThread {
        RoomThread {
            handle: thread::spawn(move || self.run()),
        }
    }

    fn drain(&mut self) -> (usize, bool) {
        let (mut processed, shutdown) = self.tailer.poll_control();
        if shutdown {
            return (processed, true);
        }
        for consumer in &mut self.consumers {
            while let Ok(command) = consumer.pop() {
                processed += 1;
                if !self.tailer.apply(command) {
                    return (processed, true);
                }
            }
        }
        (processed, false)
    }
}

/// Join handle for a spawned room.
pub struct RoomThread {
    handle: JoinHandle<TopicTailer>,
}

impl RoomThread {
    /// Waits for the room loop to stop and returns the tailer.
    pub fn join(self) -> thread::Result<TopicTailer> {
        self.handle.join()
    }
}
