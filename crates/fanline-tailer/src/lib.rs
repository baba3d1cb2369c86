//! Subscription-aware fan-out over a shared pool of log readers.
//!
//! Fanline sits between an append-only log storage tier and many
//! subscribing clients. Each worker owns one [`TopicTailer`] serving a
//! disjoint slice of the log-id space; within a worker, a small pool of
//! physical storage readers is multiplexed across every per-topic
//! subscription the worker carries.
//!
//! The interesting decisions all concern reader placement:
//!
//! - A new subscription goes to the reader that can serve it cheapest:
//!   in place when the reader already tracks the topic, by natural
//!   catch-up when the position is ahead, by opening the log on an idle
//!   reader otherwise.
//! - Readers never rewind while an alternative exists. Subscriptions that
//!   would force a rewind park on a virtual reader until two physical
//!   readers converge on the same position and merge, freeing one to adopt
//!   the parked work.
//! - Per-topic continuity is preserved across all of this: every delivery
//!   carries the previous seqno known for its topic, lagging topics are
//!   bumped forward with synthetic benign gaps to bound staleness, and
//!   malignant gaps flush history so the reader never claims knowledge
//!   storage has lost.
//!
//! ## Threading
//!
//! A dedicated room thread owns all state (see [`room::Room`]); storage
//! threads post owned commands through bounded SPSC queues and get
//! back-pressure (`NoBuffer`) instead of blocking. The outbound delivery
//! callback runs on the room thread.

pub mod cache;
pub mod config;
pub mod error;
pub mod linked_map;
pub mod message;
pub mod metrics;
pub mod reader;
pub mod room;
pub mod storage;
pub mod subscriptions;
pub mod test_support;
pub mod topics;

mod tailer;

pub use config::{
    DataCacheConfig, LogId, ReaderId, SequenceNumber, StreamId, SubscriptionId, TenantId,
    TopicTailerConfig,
};
pub use error::{TailerError, TailerResult};
pub use message::{CopilotSub, GapKind, GapMessage, Message, MessageData, TopicId};
pub use metrics::{TailerMetrics, TailerMetricsSnapshot};
pub use room::{Room, RoomCommand, RoomController, RoomThread, SendRecordError, TailerHandle};
pub use storage::{FindLatestSeqno, HashLogRouter, LogRouter, LogStorage};
pub use tailer::{OnMessage, TopicTailer};
